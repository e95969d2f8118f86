//! Object path layout.
//!
//! - per-table flow: `extract/run_id=<id>/table=<name>.jsonl`
//! - combined flow: `raw/<source>/query=<q>/date=<yyyymmdd>/<run_id>/data.json`

use chrono::NaiveDate;

use crate::models::RunId;

/// Source segment of combined-flow paths.
pub const SOURCE_NAME: &str = "youtube";

pub fn table_extract_path(run_id: &RunId, table: &str) -> String {
    format!("extract/run_id={}/table={}.jsonl", run_id, table)
}

pub fn batch_document_path(query: &str, date: NaiveDate, run_id: &RunId) -> String {
    format!(
        "raw/{}/query={}/date={}/{}/data.json",
        SOURCE_NAME,
        query_segment(query),
        date.format("%Y%m%d"),
        run_id
    )
}

/// Queries are free text; keep them readable but never let them add path segments.
fn query_segment(query: &str) -> String {
    let cleaned: String = query
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
