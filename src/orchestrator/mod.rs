//! Sequential DAG runner for the function endpoints.
//!
//! The ETL DAG calls schema, extract, load and transform in order, passing
//! each response to the next task. The golden DAG waits until the ETL DAG
//! succeeded for the same logical date, then calls the golden endpoint.
//! Every DAG run and task attempt is recorded in the run ledger.

mod dag;
mod invoker;

pub use dag::{endpoint_url, DagContext, Task, ETL_DAG_ID, GOLDEN_DAG_ID, SENSOR_TASK_ID};
pub use invoker::{HttpInvoker, Invoker};

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{OrchestratorSettings, Settings};
use crate::error::{PipelineError, Result};
use crate::models::{DagRun, RunStatus, TaskRun};
use crate::repository::RunRepository;

/// Upper bound for a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60 * 60);

/// Task retry budget with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        Self {
            retries: settings.retries,
            base_delay: Duration::from_secs(settings.retry_delay_secs),
        }
    }

    /// Wait before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// How the golden DAG polls the ledger for a finished ETL run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPolicy {
    pub poke_interval: Duration,
    pub timeout: Duration,
}

impl SensorPolicy {
    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        Self {
            poke_interval: Duration::from_secs(settings.poke_interval_secs),
            timeout: Duration::from_secs(settings.sensor_timeout_secs),
        }
    }
}

/// Final ledger state of one DAG run.
#[derive(Debug, Clone, Serialize)]
pub struct DagOutcome {
    pub dag_run: DagRun,
    pub tasks: Vec<TaskRun>,
}

impl DagOutcome {
    pub fn succeeded(&self) -> bool {
        self.dag_run.status == RunStatus::Success
    }
}

enum TaskResult {
    Succeeded(Value),
    Failed(String),
}

/// Runs the ETL and golden DAGs against the function endpoints.
pub struct Orchestrator {
    functions_url: String,
    golden_url: Option<String>,
    invoker: Arc<dyn Invoker>,
    ledger: RunRepository,
    policy: RetryPolicy,
    sensor: SensorPolicy,
}

impl Orchestrator {
    pub fn new(settings: &Settings, ledger: RunRepository) -> Result<Self> {
        let config = &settings.orchestrator;
        validate_url("orchestrator.functions_url", &config.functions_url)?;
        if let Some(golden) = &config.golden_url {
            validate_url("orchestrator.golden_url", golden)?;
        }
        let invoker = HttpInvoker::new(
            Duration::from_secs(config.request_timeout),
            &settings.user_agent,
        )?;
        Ok(Self {
            functions_url: config.functions_url.clone(),
            golden_url: config.golden_url.clone(),
            invoker: Arc::new(invoker),
            ledger,
            policy: RetryPolicy::from_settings(config),
            sensor: SensorPolicy::from_settings(config),
        })
    }

    pub fn with_invoker(mut self, invoker: Arc<dyn Invoker>) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sensor(mut self, sensor: SensorPolicy) -> Self {
        self.sensor = sensor;
        self
    }

    fn task_url(&self, task: Task) -> Option<String> {
        match task.endpoint() {
            Some(endpoint) => Some(endpoint_url(&self.functions_url, endpoint)),
            None => self.golden_url.clone(),
        }
    }

    /// Run one task with retries, recording every attempt.
    async fn run_task(&self, dag_run_id: i32, task: Task, payload: &Value) -> Result<TaskResult> {
        let Some(url) = self.task_url(task) else {
            return Ok(TaskResult::Failed(format!(
                "no endpoint configured for task {}",
                task.id()
            )));
        };

        let attempts = self.policy.max_attempts();
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            let task_run = self
                .ledger
                .start_task(dag_run_id, task.id(), attempt as i32)
                .await?;

            match self.invoker.invoke(&url, payload).await {
                Ok(response) => {
                    self.ledger
                        .finish_task(task_run, RunStatus::Success, Some(&response), None)
                        .await?;
                    info!("Task {} succeeded (attempt {})", task.id(), attempt);
                    return Ok(TaskResult::Succeeded(response));
                }
                Err(e) => {
                    last_error = e.to_string();
                    self.ledger
                        .finish_task(task_run, RunStatus::Failed, None, Some(&last_error))
                        .await?;
                    if attempt < attempts {
                        let wait = self.policy.delay(attempt);
                        warn!(
                            "Task {} failed (attempt {}/{}): {}; retrying in {:?}",
                            task.id(),
                            attempt,
                            attempts,
                            last_error,
                            wait
                        );
                        sleep(wait).await;
                    }
                }
            }
        }

        warn!("Task {} failed after {} attempts", task.id(), attempts);
        Ok(TaskResult::Failed(last_error))
    }

    async fn outcome(&self, dag_id: &str, date: NaiveDate, dag_run_id: i32) -> Result<DagOutcome> {
        let dag_run = self
            .ledger
            .get_dag_run(dag_id, date)
            .await?
            .ok_or(diesel::result::Error::NotFound)?;
        let tasks = self.ledger.task_runs(dag_run_id).await?;
        Ok(DagOutcome { dag_run, tasks })
    }

    /// Run schema → extract → load → transform for one logical date.
    ///
    /// Stops at the first task that exhausts its retries.
    pub async fn run_etl(&self, ctx: &DagContext) -> Result<DagOutcome> {
        let run = self.start_etl(ctx).await?;
        self.execute_etl(run.id, ctx).await
    }

    async fn start_etl(&self, ctx: &DagContext) -> Result<DagRun> {
        info!("Starting {} for {} ({})", ETL_DAG_ID, ctx.logical_date, ctx.run_id);
        Ok(self.ledger.start_dag_run(ETL_DAG_ID, ctx.logical_date).await?)
    }

    async fn execute_etl(&self, dag_run_id: i32, ctx: &DagContext) -> Result<DagOutcome> {
        let mut upstream: Option<Value> = None;
        let mut failure = None;
        for task in Task::ETL {
            let payload = task.payload(upstream.as_ref(), ctx);
            match self.run_task(dag_run_id, task, &payload).await? {
                TaskResult::Succeeded(response) => upstream = Some(response),
                TaskResult::Failed(error) => {
                    failure = Some(format!("task {} failed: {}", task.id(), error));
                    break;
                }
            }
        }

        let status = match failure {
            Some(_) => RunStatus::Failed,
            None => RunStatus::Success,
        };
        self.ledger
            .finish_dag_run(dag_run_id, status, failure.as_deref())
            .await?;
        info!("{} for {} finished: {}", ETL_DAG_ID, ctx.logical_date, status.as_str());

        self.outcome(ETL_DAG_ID, ctx.logical_date, dag_run_id).await
    }

    /// Poll the ledger until the ETL DAG succeeded for `date`.
    ///
    /// Returns false when the sensor times out.
    async fn wait_for_etl(&self, date: NaiveDate) -> Result<bool> {
        let deadline = Instant::now() + self.sensor.timeout;
        loop {
            if let Some(run) = self.ledger.get_dag_run(ETL_DAG_ID, date).await? {
                if run.status == RunStatus::Success {
                    return Ok(true);
                }
                debug!("{} for {} is {}", ETL_DAG_ID, date, run.status.as_str());
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(self.sensor.poke_interval.min(deadline - now)).await;
        }
    }

    /// Wait for the ETL DAG of the same date, then call the golden endpoint.
    ///
    /// Recorded as skipped when no golden endpoint is configured.
    pub async fn run_golden(&self, ctx: &DagContext) -> Result<DagOutcome> {
        let date = ctx.logical_date;
        let run = self.ledger.start_dag_run(GOLDEN_DAG_ID, date).await?;

        if self.golden_url.is_none() {
            info!("No golden endpoint configured, skipping {}", GOLDEN_DAG_ID);
            self.ledger
                .finish_dag_run(run.id, RunStatus::Skipped, None)
                .await?;
            return self.outcome(GOLDEN_DAG_ID, date, run.id).await;
        }

        info!("{} waiting for {} on {}", GOLDEN_DAG_ID, ETL_DAG_ID, date);
        let sensor = self.ledger.start_task(run.id, SENSOR_TASK_ID, 1).await?;
        if !self.wait_for_etl(date).await? {
            let error = format!(
                "{} did not succeed for {} within {:?}",
                ETL_DAG_ID, date, self.sensor.timeout
            );
            warn!("{}", error);
            self.ledger
                .finish_task(sensor, RunStatus::Failed, None, Some(&error))
                .await?;
            self.ledger
                .finish_dag_run(run.id, RunStatus::Failed, Some(&error))
                .await?;
            return self.outcome(GOLDEN_DAG_ID, date, run.id).await;
        }
        self.ledger
            .finish_task(sensor, RunStatus::Success, None, None)
            .await?;

        let payload = Task::Golden.payload(None, ctx);
        let (status, error) = match self.run_task(run.id, Task::Golden, &payload).await? {
            TaskResult::Succeeded(_) => (RunStatus::Success, None),
            TaskResult::Failed(e) => (RunStatus::Failed, Some(format!("task golden failed: {}", e))),
        };
        self.ledger
            .finish_dag_run(run.id, status, error.as_deref())
            .await?;
        info!("{} for {} finished: {}", GOLDEN_DAG_ID, date, status.as_str());

        self.outcome(GOLDEN_DAG_ID, date, run.id).await
    }

    /// Run both DAGs for one date side by side.
    ///
    /// The ETL run is marked running before the sensor starts, so a success
    /// left by an earlier run of the same date cannot release the golden DAG.
    pub async fn run_day(&self, ctx: &DagContext) -> Result<(DagOutcome, DagOutcome)> {
        let run = self.start_etl(ctx).await?;
        let (etl, golden) = tokio::join!(self.execute_etl(run.id, ctx), self.run_golden(ctx));
        Ok((etl?, golden?))
    }

    /// Fire both DAGs at every UTC midnight for the day that just ended.
    ///
    /// Runs until the task is cancelled; a failed DAG run does not stop the loop.
    pub async fn daily(&self) -> Result<()> {
        loop {
            let now = Utc::now();
            let wait = until_next_midnight(now);
            info!("Next scheduled run in {:?}", wait);
            sleep(wait).await;

            let logical_date = Utc::now().date_naive().pred_opt().unwrap_or(now.date_naive());
            let ctx = DagContext::scheduled(logical_date);
            match self.run_day(&ctx).await {
                Ok((etl, golden)) => info!(
                    "Scheduled run for {}: {} {}, {} {}",
                    logical_date,
                    ETL_DAG_ID,
                    etl.dag_run.status.as_str(),
                    GOLDEN_DAG_ID,
                    golden.dag_run.status.as_str()
                ),
                Err(e) => warn!("Scheduled run for {} aborted: {}", logical_date, e),
            }
        }
    }
}

fn validate_url(key: &str, raw: &str) -> Result<()> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| PipelineError::Config(format!("invalid {} '{}': {}", key, raw, e)))
}

/// Time left until the next UTC midnight.
pub fn until_next_midnight(now: chrono::DateTime<Utc>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
        None => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::LedgerContext;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            base_delay: Duration::from_millis(1),
        }
    }

    async fn setup(
        server: &MockServer,
        golden: bool,
    ) -> (Orchestrator, RunRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = LedgerContext::from_path(&dir.path().join("ledger.db"));
        ctx.init_schema().await.unwrap();

        let mut settings = Settings::with_data_dir(dir.path().to_path_buf());
        settings.orchestrator.functions_url = server.uri();
        if golden {
            settings.orchestrator.golden_url = Some(format!("{}/raw-golden", server.uri()));
        }
        let orchestrator = Orchestrator::new(&settings, ctx.runs())
            .unwrap()
            .with_policy(fast_policy(2))
            .with_sensor(SensorPolicy {
                poke_interval: Duration::from_millis(10),
                timeout: Duration::from_millis(200),
            });
        (orchestrator, ctx.runs(), dir)
    }

    fn ctx() -> DagContext {
        DagContext::scheduled(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }

    async fn mount_ok(server: &MockServer, endpoint: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            retries: 3,
            base_delay: Duration::from_secs(300),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(300));
        assert_eq!(policy.delay(2), Duration::from_secs(600));
        assert_eq!(policy.delay(3), Duration::from_secs(1200));
        assert_eq!(policy.delay(30), MAX_RETRY_DELAY);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[tokio::test]
    async fn test_invalid_functions_url_rejected() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::with_data_dir(dir.path().to_path_buf());
        settings.orchestrator.functions_url = "not a url".into();
        let ledger = LedgerContext::from_path(&dir.path().join("ledger.db")).runs();
        let err = Orchestrator::new(&settings, ledger).err().unwrap();
        assert!(err.to_string().contains("orchestrator.functions_url"));
    }

    #[test]
    fn test_until_next_midnight() {
        let now = chrono::DateTime::parse_from_rfc3339("2025-01-01T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(until_next_midnight(now), Duration::from_secs(30 * 60));
    }

    #[tokio::test]
    async fn test_etl_chains_responses() {
        let server = MockServer::start().await;
        mount_ok(&server, "/raw-schema", json!({"status": "success"})).await;
        Mock::given(method("POST"))
            .and(path("/raw-extract"))
            .and(body_partial_json(json!({
                "run_id": "scheduled__2025-01-01T00:00:00+00:00",
                "date": "20250101"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "run_id": "scheduled__2025-01-01T00:00:00+00:00",
                "blob_name": "raw/youtube/x.json"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/raw-parse"))
            .and(body_partial_json(json!({"blob_name": "raw/youtube/x.json"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;
        mount_ok(&server, "/raw-transform", json!({"status": "success"})).await;

        let (orchestrator, _, _dir) = setup(&server, false).await;
        let outcome = orchestrator.run_etl(&ctx()).await.unwrap();

        assert!(outcome.succeeded());
        let ids: Vec<_> = outcome.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, ["schema", "extract", "load", "transform"]);
    }

    #[tokio::test]
    async fn test_task_retried_then_recorded() {
        let server = MockServer::start().await;
        mount_ok(&server, "/raw-schema", json!({"status": "success"})).await;
        Mock::given(method("POST"))
            .and(path("/raw-extract"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"status": "error"})))
            .expect(3)
            .mount(&server)
            .await;

        let (orchestrator, ledger, _dir) = setup(&server, false).await;
        let outcome = orchestrator.run_etl(&ctx()).await.unwrap();

        assert_eq!(outcome.dag_run.status, RunStatus::Failed);
        assert!(outcome.dag_run.error.as_deref().unwrap().starts_with("task extract failed"));
        let extract: Vec<_> = outcome
            .tasks
            .iter()
            .filter(|t| t.task_id == "extract")
            .collect();
        assert_eq!(extract.len(), 3);
        assert_eq!(extract[2].attempt, 3);
        assert!(extract.iter().all(|t| t.status == RunStatus::Failed));
        assert!(!outcome.tasks.iter().any(|t| t.task_id == "load"));

        let stored = ledger
            .get_dag_run(ETL_DAG_ID, ctx().logical_date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_golden_waits_for_etl() {
        let server = MockServer::start().await;
        for endpoint in ["/raw-schema", "/raw-extract", "/raw-parse", "/raw-transform"] {
            mount_ok(&server, endpoint, json!({"status": "success"})).await;
        }
        Mock::given(method("POST"))
            .and(path("/raw-golden"))
            .and(body_partial_json(json!({"date": "20250101"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        let (orchestrator, _, _dir) = setup(&server, true).await;
        let (etl, golden) = orchestrator.run_day(&ctx()).await.unwrap();

        assert!(etl.succeeded());
        assert!(golden.succeeded());
        let ids: Vec<_> = golden.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, [SENSOR_TASK_ID, "golden"]);
        assert!(golden.tasks[1].started_at >= etl.dag_run.finished_at.unwrap());
    }

    #[tokio::test]
    async fn test_rerun_golden_waits_for_new_etl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/raw-schema"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "success"}))
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;
        for endpoint in ["/raw-extract", "/raw-parse", "/raw-transform", "/raw-golden"] {
            mount_ok(&server, endpoint, json!({"status": "success"})).await;
        }

        let (orchestrator, ledger, _dir) = setup(&server, true).await;
        let orchestrator = orchestrator.with_sensor(SensorPolicy {
            poke_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        });
        let earlier = ledger
            .start_dag_run(ETL_DAG_ID, ctx().logical_date)
            .await
            .unwrap();
        ledger
            .finish_dag_run(earlier.id, RunStatus::Success, None)
            .await
            .unwrap();

        let (etl, golden) = orchestrator.run_day(&ctx()).await.unwrap();

        assert!(etl.succeeded());
        assert!(golden.succeeded());
        assert_eq!(golden.tasks[1].task_id, "golden");
        assert!(golden.tasks[1].started_at >= etl.dag_run.finished_at.unwrap());
    }

    #[tokio::test]
    async fn test_golden_times_out_without_etl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/raw-golden"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (orchestrator, _, _dir) = setup(&server, true).await;
        let golden = orchestrator.run_golden(&ctx()).await.unwrap();

        assert_eq!(golden.dag_run.status, RunStatus::Failed);
        assert_eq!(golden.tasks.len(), 1);
        assert_eq!(golden.tasks[0].task_id, SENSOR_TASK_ID);
    }

    #[tokio::test]
    async fn test_golden_skipped_without_endpoint() {
        let server = MockServer::start().await;
        let (orchestrator, _, _dir) = setup(&server, false).await;
        let golden = orchestrator.run_golden(&ctx()).await.unwrap();
        assert_eq!(golden.dag_run.status, RunStatus::Skipped);
        assert!(golden.tasks.is_empty());
    }
}
