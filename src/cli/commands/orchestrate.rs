//! DAG orchestration command.

use chrono::Utc;
use console::style;

use super::helpers::{self, styled_status};
use super::DagChoice;
use crate::config::Settings;
use crate::models::RunStatus;
use crate::orchestrator::{DagContext, DagOutcome, Orchestrator};

fn print_outcome(outcome: &DagOutcome) {
    let run = &outcome.dag_run;
    println!(
        "{} {} {} [{}]",
        style("→").cyan(),
        run.dag_id,
        run.logical_date,
        styled_status(run.status)
    );
    for task in &outcome.tasks {
        match &task.error {
            Some(error) => println!(
                "  {:<14} #{} {} {}",
                task.task_id,
                task.attempt,
                styled_status(task.status),
                style(error).dim()
            ),
            None => println!(
                "  {:<14} #{} {}",
                task.task_id,
                task.attempt,
                styled_status(task.status)
            ),
        }
    }
}

fn check(outcome: &DagOutcome) -> anyhow::Result<()> {
    let run = &outcome.dag_run;
    if run.status == RunStatus::Failed {
        anyhow::bail!(
            "{} failed: {}",
            run.dag_id,
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Run the ETL DAG, the golden DAG, or both.
///
/// `daily` without a date keeps running and fires at every UTC midnight.
pub async fn cmd_orchestrate(
    settings: &Settings,
    dag: DagChoice,
    date: Option<&str>,
) -> anyhow::Result<()> {
    let ledger = helpers::ledger(settings).await?;
    let orchestrator = Orchestrator::new(settings, ledger.runs())?;
    let date = helpers::parse_date(date)?;
    let today = Utc::now().date_naive();

    println!(
        "{} Function endpoints at {}",
        style("→").cyan(),
        settings.orchestrator.functions_url
    );

    match dag {
        DagChoice::Etl => {
            let ctx = DagContext::manual(date.unwrap_or(today), Utc::now());
            let outcome = orchestrator.run_etl(&ctx).await?;
            print_outcome(&outcome);
            check(&outcome)
        }
        DagChoice::Golden => {
            let ctx = DagContext::manual(date.unwrap_or(today), Utc::now());
            let outcome = orchestrator.run_golden(&ctx).await?;
            print_outcome(&outcome);
            check(&outcome)
        }
        DagChoice::Daily => match date {
            Some(date) => {
                let (etl, golden) = orchestrator.run_day(&DagContext::scheduled(date)).await?;
                print_outcome(&etl);
                print_outcome(&golden);
                check(&etl)?;
                check(&golden)
            }
            None => {
                println!("  Scheduling daily runs at 00:00 UTC, press Ctrl+C to stop");
                Ok(orchestrator.daily().await?)
            }
        },
    }
}
