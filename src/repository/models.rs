//! Diesel records for the run ledger tables.

use diesel::prelude::*;

use crate::schema;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::dag_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DagRunRecord {
    pub id: i32,
    pub dag_id: String,
    pub logical_date: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::dag_runs)]
pub struct NewDagRun<'a> {
    pub dag_id: &'a str,
    pub logical_date: &'a str,
    pub status: &'a str,
    pub started_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = schema::task_runs)]
#[diesel(belongs_to(DagRunRecord, foreign_key = dag_run_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRunRecord {
    pub id: i32,
    pub dag_run_id: i32,
    pub task_id: String,
    pub attempt: i32,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub response: Option<String>,
    pub error: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::task_runs)]
pub struct NewTaskRun<'a> {
    pub dag_run_id: i32,
    pub task_id: &'a str,
    pub attempt: i32,
    pub status: &'a str,
    pub started_at: &'a str,
}
