//! Initialize command.

use console::style;

use super::helpers;
use crate::config::Settings;

/// Create the data directory and the run ledger.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    helpers::ledger(settings).await?;

    println!(
        "{} Initialized ytpipe in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Run ledger:  {}", settings.database_url());
    println!(
        "  Warehouse:   {}",
        settings.warehouse.backend.as_str()
    );
    println!("  Storage:     {}", settings.storage.backend.as_str());
    if settings.storage.bucket.is_none() {
        println!(
            "{} No bucket configured; set RAW_BUCKET or storage.bucket",
            style("!").yellow()
        );
    }

    Ok(())
}
