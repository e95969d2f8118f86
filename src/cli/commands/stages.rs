//! Pipeline stage commands: schema, extract, load, transform and run.

use chrono::Utc;
use console::style;

use super::helpers;
use crate::config::Settings;
use crate::models::{ExtractTable, RunId};
use crate::pipeline::extract::{split_ids, BatchRequest, TableRequest};
use crate::pipeline::schema::TableStatus;
use crate::pipeline::{BatchExtract, BatchLoad, SchemaReport};

/// Extraction flags shared by both extraction modes.
#[derive(Debug, Default)]
pub struct ExtractArgs {
    pub query: Option<String>,
    pub max_results: Option<usize>,
    pub region_code: Option<String>,
    pub order: Option<String>,
    pub video_ids: Option<String>,
    pub channel_id: Option<String>,
    pub run_id: Option<String>,
    pub date: Option<String>,
}

fn print_schema(report: &SchemaReport) {
    println!(
        "{} Raw dataset {} ready on {}",
        style("✓").green(),
        report.dataset,
        report.engine
    );
    for status in &report.tables {
        match status {
            TableStatus::Ready { table, row_count } => {
                println!("  {} {:<20} {} rows", style("✓").green(), table, row_count)
            }
            TableStatus::Failed { table, error } => {
                println!("  {} {:<20} {}", style("✗").red(), table, error)
            }
        }
    }
}

fn print_extract(extract: &BatchExtract) {
    println!(
        "{} Staged '{}' as {}",
        style("✓").green(),
        extract.query,
        extract.uri
    );
    for (key, count) in &extract.counts {
        println!("  {:<20} {}", key, count);
    }
    println!("  Run id: {}", extract.run_id);
}

fn print_load(load: &BatchLoad) {
    println!(
        "{} Loaded {} into {}",
        style("✓").green(),
        load.source_path,
        load.dataset
    );
    for table in &load.tables {
        println!("  {:<20} {} rows", table.table, table.rows);
    }
}

pub async fn cmd_schema(settings: &Settings, drop_existing: bool) -> anyhow::Result<()> {
    let pipeline = helpers::pipeline(settings)?;
    if drop_existing {
        println!("{} Dropping and recreating raw tables", style("!").yellow());
    }
    let report = pipeline.raw_schema(drop_existing).await?;
    print_schema(&report);

    if report.tables.iter().any(|t| !t.is_ready()) {
        anyhow::bail!("some raw tables could not be created");
    }
    Ok(())
}

pub async fn cmd_extract(settings: &Settings, args: ExtractArgs) -> anyhow::Result<()> {
    let pipeline = helpers::pipeline(settings)?;

    let mut request = BatchRequest::from_settings(&settings.youtube);
    if let Some(query) = args.query {
        request.query = query;
    }
    if let Some(max_results) = args.max_results {
        request.max_results = max_results;
    }
    if let Some(region) = args.region_code {
        request.region_code = region;
    }
    if let Some(order) = args.order {
        request.order = order;
    }
    let run_id = RunId::parse_or_generate(args.run_id.as_deref())?;
    let date = helpers::parse_date(args.date.as_deref())?.unwrap_or_else(|| Utc::now().date_naive());

    println!(
        "{} Extracting '{}' (up to {} videos)",
        style("→").cyan(),
        request.query,
        request.max_results
    );
    let extract = pipeline.raw_extract(request, run_id, date).await?;
    print_extract(&extract);
    println!(
        "  Next: ytpipe load --run-id {} --blob {}",
        extract.run_id, extract.blob_name
    );
    Ok(())
}

pub async fn cmd_extract_table(settings: &Settings, table: &str, args: ExtractArgs) -> anyhow::Result<()> {
    let pipeline = helpers::pipeline(settings)?;

    let table = ExtractTable::parse(&table.to_ascii_lowercase())?;
    let mut request = TableRequest::new(table, &settings.youtube);
    request.query = args.query;
    request.video_ids = args.video_ids.as_deref().map(split_ids).unwrap_or_default();
    request.channel_ids = args.channel_id.as_deref().map(split_ids).unwrap_or_default();
    if let Some(region) = args.region_code {
        request.region_code = region;
    }
    if let Some(max_results) = args.max_results {
        request.max_results = max_results;
    }
    if let Some(order) = args.order {
        request.order = order;
    }
    let run_id = RunId::parse_or_generate(args.run_id.as_deref())?;

    println!("{} Extracting table {}", style("→").cyan(), table.as_str());
    let extract = pipeline.yt_extract(request, run_id).await?;
    println!(
        "{} {} rows staged as {}",
        style("✓").green(),
        extract.count,
        extract.gcs_uri
    );
    println!(
        "  Next: ytpipe load --run-id {} --table {}",
        extract.run_id, extract.table
    );
    Ok(())
}

pub async fn cmd_load(settings: &Settings, run_id: &str, blob: &str) -> anyhow::Result<()> {
    let pipeline = helpers::pipeline(settings)?;
    let run_id = RunId::parse(run_id)?;

    println!("{} Loading {}", style("→").cyan(), blob);
    let load = pipeline.raw_parse(blob, run_id, None).await?;
    print_load(&load);
    Ok(())
}

pub async fn cmd_ingest(settings: &Settings, run_id: &str, table: &str) -> anyhow::Result<()> {
    let pipeline = helpers::pipeline(settings)?;
    let table = ExtractTable::parse(&table.to_ascii_lowercase())?;
    let run_id = RunId::parse(run_id)?;

    let ingest = pipeline.yt_ingest(table, run_id).await?;
    println!(
        "{} Inserted {} rows from {} into {} ({} rows total)",
        style("✓").green(),
        ingest.inserted,
        ingest.gcs_src,
        ingest.table_fqdn,
        ingest.total_rows_in_table
    );
    Ok(())
}

pub async fn cmd_transform(settings: &Settings, date: Option<&str>) -> anyhow::Result<()> {
    let pipeline = helpers::pipeline(settings)?;
    let date = helpers::parse_date(date)?;

    let outcome = pipeline.raw_transform(date).await?;
    println!(
        "{} Transformations for {} completed",
        style("✓").green(),
        outcome.date
    );
    for result in &outcome.results {
        println!("  {}", result);
    }
    Ok(())
}

pub async fn cmd_run(
    settings: &Settings,
    query: Option<String>,
    max_results: Option<usize>,
    run_id: Option<&str>,
) -> anyhow::Result<()> {
    let pipeline = helpers::pipeline(settings)?;

    let mut request = BatchRequest::from_settings(&settings.youtube);
    if let Some(query) = query {
        request.query = query;
    }
    if let Some(max_results) = max_results {
        request.max_results = max_results;
    }
    let run_id = RunId::parse_or_generate(run_id)?;

    println!(
        "{} Running pipeline for '{}' (run {})",
        style("→").cyan(),
        request.query,
        run_id
    );
    let summary = pipeline.run(request, run_id).await?;
    print_schema(&summary.schema);
    print_extract(&summary.extract);
    print_load(&summary.load);
    println!(
        "{} {} transformations for {}",
        style("✓").green(),
        summary.transform.results.len(),
        summary.transform.date
    );
    Ok(())
}
