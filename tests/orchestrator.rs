//! Orchestrated DAG runs against the in-process function endpoints.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::tempdir;

use ytpipe::models::RunStatus;
use ytpipe::orchestrator::{
    DagContext, Invoker, Orchestrator, RetryPolicy, SensorPolicy, ETL_DAG_ID, GOLDEN_DAG_ID,
};
use ytpipe::repository::LedgerContext;
use ytpipe::server::{create_router, AppState};
use ytpipe::PipelineError;

fn fast() -> (RetryPolicy, SensorPolicy) {
    (
        RetryPolicy {
            retries: 2,
            base_delay: Duration::from_millis(1),
        },
        SensorPolicy {
            poke_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        },
    )
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

#[tokio::test]
async fn test_etl_dag_against_live_endpoints() {
    let youtube = common::mock_youtube().await;
    let dir = tempdir().unwrap();

    let state = AppState::from_pipeline(common::pipeline(dir.path(), &youtube.uri()));
    let pipeline = state.pipeline.clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    let ledger = LedgerContext::from_path(&dir.path().join("ledger.db"));
    ledger.init_schema().await.unwrap();
    let mut settings = common::settings(dir.path());
    settings.orchestrator.functions_url = format!("http://{}", addr);
    let (policy, sensor) = fast();
    let orchestrator = Orchestrator::new(&settings, ledger.runs())
        .unwrap()
        .with_policy(policy)
        .with_sensor(sensor);

    let ctx = DagContext::scheduled(date());
    let outcome = orchestrator.run_etl(&ctx).await.unwrap();
    assert!(outcome.succeeded(), "{:?}", outcome.dag_run.error);

    let extract = outcome
        .tasks
        .iter()
        .find(|t| t.task_id == "extract")
        .unwrap();
    let response = extract.response.as_ref().unwrap();
    assert_eq!(response["run_id"], ctx.run_id.as_str());
    assert!(response["blob_name"]
        .as_str()
        .unwrap()
        .contains("/date=20250101/"));

    let warehouse = pipeline.warehouse().await.unwrap();
    assert_eq!(
        warehouse.count_rows("youtube_staging", "dim_videos").await.unwrap(),
        3
    );

    let stored = ledger.runs().get_dag_run(ETL_DAG_ID, date()).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Success);
}

/// Fails the first `failures` calls, then echoes the payload.
struct FlakyInvoker {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Invoker for FlakyInvoker {
    async fn invoke(&self, url: &str, payload: &Value) -> ytpipe::Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(PipelineError::Connection(format!("{} returned HTTP 503", url)));
        }
        Ok(json!({"status": "success", "echo": payload}))
    }
}

async fn flaky_orchestrator(
    dir: &std::path::Path,
    failures: usize,
    golden: bool,
) -> (Orchestrator, LedgerContext) {
    let ledger = LedgerContext::from_path(&dir.join("ledger.db"));
    ledger.init_schema().await.unwrap();
    let mut settings = common::settings(dir);
    if golden {
        settings.orchestrator.golden_url = Some("http://golden.invalid/raw-golden".into());
    }
    let (policy, sensor) = fast();
    let orchestrator = Orchestrator::new(&settings, ledger.runs())
        .unwrap()
        .with_policy(policy)
        .with_sensor(sensor)
        .with_invoker(Arc::new(FlakyInvoker {
            failures,
            calls: AtomicUsize::new(0),
        }));
    (orchestrator, ledger)
}

#[tokio::test]
async fn test_retry_recovers_within_budget() {
    let dir = tempdir().unwrap();
    let (orchestrator, _ledger) = flaky_orchestrator(dir.path(), 2, false).await;

    let outcome = orchestrator
        .run_etl(&DagContext::scheduled(date()))
        .await
        .unwrap();

    assert!(outcome.succeeded());
    let schema: Vec<_> = outcome.tasks.iter().filter(|t| t.task_id == "schema").collect();
    assert_eq!(schema.len(), 3);
    assert_eq!(schema[0].status, RunStatus::Failed);
    assert_eq!(schema[2].status, RunStatus::Success);
    assert_eq!(outcome.tasks.len(), 6);
}

#[tokio::test]
async fn test_retry_budget_exhausted_blocks_golden() {
    let dir = tempdir().unwrap();
    let (orchestrator, ledger) = flaky_orchestrator(dir.path(), 100, true).await;
    let orchestrator = orchestrator.with_sensor(SensorPolicy {
        poke_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(300),
    });

    let (etl, golden) = orchestrator
        .run_day(&DagContext::scheduled(date()))
        .await
        .unwrap();

    assert_eq!(etl.dag_run.status, RunStatus::Failed);
    assert_eq!(etl.tasks.len(), 3);
    assert_eq!(golden.dag_run.status, RunStatus::Failed);
    assert!(!golden.tasks.iter().any(|t| t.task_id == "golden"));

    let runs = ledger.runs().recent_dag_runs(10).await.unwrap();
    let dags: Vec<_> = runs.iter().map(|r| r.dag_id.as_str()).collect();
    assert!(dags.contains(&ETL_DAG_ID));
    assert!(dags.contains(&GOLDEN_DAG_ID));
}
