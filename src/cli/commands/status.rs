//! Run ledger status command.

use console::style;

use super::helpers::{self, styled_status};
use crate::config::Settings;
use crate::models::RunStatus;

/// Show the most recent DAG runs with their task attempts.
pub async fn cmd_status(settings: &Settings, limit: i64) -> anyhow::Result<()> {
    let ctx = helpers::ledger(settings).await?;
    let runs = ctx.runs();
    let dag_runs = runs.recent_dag_runs(limit).await?;

    if dag_runs.is_empty() {
        println!("{} No DAG runs recorded yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<26} {:<12} {:<9} {:<26} {}",
        style("DAG").bold(),
        style("Date").bold(),
        style("Status").bold(),
        style("Started").bold(),
        style("Tasks").bold()
    );
    for run in dag_runs {
        let tasks = runs.task_runs(run.id).await?;
        let attempts = tasks.len();
        let failed = tasks.iter().filter(|t| t.status == RunStatus::Failed).count();
        println!(
            "{:<26} {:<12} {:<9} {:<26} {} attempts, {} failed",
            run.dag_id,
            run.logical_date,
            styled_status(run.status),
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            attempts,
            failed
        );
        if let Some(error) = &run.error {
            println!("  {}", style(error).red());
        }
    }

    Ok(())
}
