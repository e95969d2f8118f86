//! DAG and task run history.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{DagRunRecord, NewDagRun, NewTaskRun, TaskRunRecord};
use super::pool::{DbError, SqlitePool};
use crate::models::{DagRun, RunStatus, TaskRun};
use crate::schema::{dag_runs, task_runs};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn parse_status(s: &str) -> RunStatus {
    RunStatus::from_str(s).unwrap_or(RunStatus::Failed)
}

impl From<DagRunRecord> for DagRun {
    fn from(record: DagRunRecord) -> Self {
        DagRun {
            id: record.id,
            dag_id: record.dag_id,
            logical_date: NaiveDate::parse_from_str(&record.logical_date, DATE_FORMAT)
                .unwrap_or_default(),
            status: parse_status(&record.status),
            started_at: parse_datetime(&record.started_at),
            finished_at: record.finished_at.as_deref().map(parse_datetime),
            error: record.error,
        }
    }
}

impl From<TaskRunRecord> for TaskRun {
    fn from(record: TaskRunRecord) -> Self {
        TaskRun {
            id: record.id,
            dag_run_id: record.dag_run_id,
            task_id: record.task_id,
            attempt: record.attempt,
            status: parse_status(&record.status),
            started_at: parse_datetime(&record.started_at),
            finished_at: record.finished_at.as_deref().map(parse_datetime),
            response: record
                .response
                .as_deref()
                .and_then(|r| serde_json::from_str(r).ok()),
            error: record.error,
        }
    }
}

/// Run ledger repository.
#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Mark a DAG run as running, creating it on first start.
    ///
    /// Restarting an existing (dag, date) pair resets its outcome; earlier
    /// task attempts stay in the history.
    pub async fn start_dag_run(
        &self,
        dag_id: &str,
        logical_date: NaiveDate,
    ) -> Result<DagRun, DbError> {
        let mut conn = self.pool.get().await?;
        let date = logical_date.format(DATE_FORMAT).to_string();
        let now = Utc::now().to_rfc3339();

        let existing = dag_runs::table
            .filter(dag_runs::dag_id.eq(dag_id))
            .filter(dag_runs::logical_date.eq(&date))
            .select(dag_runs::id)
            .first::<i32>(&mut conn)
            .await
            .optional()?;

        match existing {
            Some(id) => {
                diesel::update(dag_runs::table.find(id))
                    .set((
                        dag_runs::status.eq(RunStatus::Running.as_str()),
                        dag_runs::started_at.eq(&now),
                        dag_runs::finished_at.eq(None::<String>),
                        dag_runs::error.eq(None::<String>),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            None => {
                diesel::insert_into(dag_runs::table)
                    .values(NewDagRun {
                        dag_id,
                        logical_date: &date,
                        status: RunStatus::Running.as_str(),
                        started_at: &now,
                    })
                    .execute(&mut conn)
                    .await?;
            }
        }

        dag_runs::table
            .filter(dag_runs::dag_id.eq(dag_id))
            .filter(dag_runs::logical_date.eq(&date))
            .select(DagRunRecord::as_select())
            .first(&mut conn)
            .await
            .map(DagRun::from)
    }

    pub async fn finish_dag_run(
        &self,
        id: i32,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::update(dag_runs::table.find(id))
            .set((
                dag_runs::status.eq(status.as_str()),
                dag_runs::finished_at.eq(Some(Utc::now().to_rfc3339())),
                dag_runs::error.eq(error),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get_dag_run(
        &self,
        dag_id: &str,
        logical_date: NaiveDate,
    ) -> Result<Option<DagRun>, DbError> {
        let mut conn = self.pool.get().await?;
        dag_runs::table
            .filter(dag_runs::dag_id.eq(dag_id))
            .filter(dag_runs::logical_date.eq(logical_date.format(DATE_FORMAT).to_string()))
            .select(DagRunRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(DagRun::from))
    }

    /// Most recently started DAG runs first.
    pub async fn recent_dag_runs(&self, limit: i64) -> Result<Vec<DagRun>, DbError> {
        let mut conn = self.pool.get().await?;
        dag_runs::table
            .order((dag_runs::started_at.desc(), dag_runs::id.desc()))
            .limit(limit)
            .select(DagRunRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(DagRun::from).collect())
    }

    /// Record the start of a task attempt and return its id.
    pub async fn start_task(
        &self,
        dag_run_id: i32,
        task_id: &str,
        attempt: i32,
    ) -> Result<i32, DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(task_runs::table)
            .values(NewTaskRun {
                dag_run_id,
                task_id,
                attempt,
                status: RunStatus::Running.as_str(),
                started_at: &Utc::now().to_rfc3339(),
            })
            .execute(&mut conn)
            .await?;

        task_runs::table
            .filter(task_runs::dag_run_id.eq(dag_run_id))
            .filter(task_runs::task_id.eq(task_id))
            .order(task_runs::id.desc())
            .select(task_runs::id)
            .first(&mut conn)
            .await
    }

    pub async fn finish_task(
        &self,
        task_run_id: i32,
        status: RunStatus,
        response: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let response = response.map(|r| r.to_string());
        diesel::update(task_runs::table.find(task_run_id))
            .set((
                task_runs::status.eq(status.as_str()),
                task_runs::finished_at.eq(Some(Utc::now().to_rfc3339())),
                task_runs::response.eq(response),
                task_runs::error.eq(error),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Task attempts of a DAG run in execution order.
    pub async fn task_runs(&self, dag_run_id: i32) -> Result<Vec<TaskRun>, DbError> {
        let mut conn = self.pool.get().await?;
        task_runs::table
            .filter(task_runs::dag_run_id.eq(dag_run_id))
            .order(task_runs::id.asc())
            .select(TaskRunRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(TaskRun::from).collect())
    }
}
