//! Raw → staging upserts (dimension and fact tables).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::warehouse::{tables, Dialect, MergeSpec, Warehouse};

/// Latest row per key of a raw table.
fn latest(dialect: &Dialect, raw_dataset: &str, table: &str, key: &str, columns: &str) -> String {
    format!(
        "SELECT {columns} FROM {table} WHERE {key} IS NOT NULL \
         QUALIFY ROW_NUMBER() OVER (PARTITION BY {key} ORDER BY ingest_timestamp DESC) = 1",
        columns = columns,
        table = dialect.table_ref(raw_dataset, table),
        key = key,
    )
}

/// ISO-8601 duration rendered as `MM:SS`, or `H:MM:SS` once it reaches an hour.
fn duration_expr(dialect: &Dialect, column: &str) -> String {
    let hours = dialect.regexp_extract(column, r"(\d+)H");
    let minutes = dialect.regexp_extract(column, r"(\d+)M");
    let seconds = dialect.regexp_extract(column, r"(\d+)S");
    let mm_ss = format!(
        "LPAD(COALESCE({m}, '0'), 2, '0'), ':', LPAD(COALESCE({s}, '0'), 2, '0')",
        m = minutes,
        s = seconds,
    );
    format!(
        "CASE WHEN {col} IS NULL THEN NULL \
         WHEN {h} IS NULL THEN CONCAT({mm_ss}) \
         ELSE CONCAT({h}, ':', {mm_ss}) END",
        col = column,
        h = hours,
        mm_ss = mm_ss,
    )
}

/// The ordered upserts of one transform run.
pub fn merge_specs(
    dialect: &Dialect,
    raw_dataset: &str,
    now: DateTime<Utc>,
    date: NaiveDate,
) -> Vec<MergeSpec> {
    let now = dialect.timestamp_literal(now);
    let date = dialect.date_literal(date);
    let date_col = dialect.ident("date");

    vec![
        MergeSpec::new(
            tables::dim_videos(),
            latest(
                dialect,
                raw_dataset,
                "videos",
                "video_id",
                &format!(
                    "video_id, title, description, channel_id, published_at, {} AS last_updated",
                    now
                ),
            ),
        ),
        MergeSpec::new(
            tables::dim_channels(),
            latest(
                dialect,
                raw_dataset,
                "channels",
                "channel_id",
                &format!(
                    "channel_id, channel_title, channel_description, country, \
                     subscriber_count, video_count, {} AS last_updated",
                    now
                ),
            ),
        ),
        MergeSpec::new(
            tables::dim_comments(),
            latest(
                dialect,
                raw_dataset,
                "comments",
                "comment_id",
                &format!(
                    "comment_id, author_display_name, text_display AS comment_text, {} AS last_updated",
                    now
                ),
            ),
        ),
        MergeSpec::new(
            tables::dim_categories(),
            latest(
                dialect,
                raw_dataset,
                "categories",
                "category_id",
                &format!("category_id, category_title, region, {} AS last_updated", now),
            ),
        ),
        MergeSpec::new(
            tables::fact_video_statistics(),
            format!(
                "SELECT s.video_id AS video_id, v.channel_id AS channel_id, \
                 s.category_id AS category_id, {duration} AS duration, {date} AS {date_col}, \
                 s.view_count AS view_count, s.like_count AS like_count, \
                 s.comment_count AS comment_count \
                 FROM ({stats}) AS s JOIN ({videos}) AS v ON s.video_id = v.video_id",
                duration = duration_expr(dialect, "s.duration"),
                date = date,
                date_col = date_col,
                stats = latest(dialect, raw_dataset, "video_statistics", "video_id", "*"),
                videos = latest(dialect, raw_dataset, "videos", "video_id", "video_id, channel_id"),
            ),
        ),
        MergeSpec::new(
            tables::fact_comments(),
            latest(
                dialect,
                raw_dataset,
                "comments",
                "comment_id",
                "comment_id, video_id, like_count, published_at",
            ),
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutcome {
    pub date: NaiveDate,
    pub results: Vec<String>,
}

/// Ensure the staging tables exist and run every upsert in order.
///
/// The first failing statement aborts the run.
pub async fn run_transform(
    warehouse: &dyn Warehouse,
    raw_dataset: &str,
    staging_dataset: &str,
    date: NaiveDate,
) -> Result<TransformOutcome> {
    let dialect = warehouse.dialect().clone();

    warehouse.execute(&dialect.create_schema(raw_dataset)).await?;
    for table in tables::raw_tables() {
        warehouse
            .execute(&dialect.create_table(raw_dataset, &table))
            .await?;
    }
    warehouse
        .execute(&dialect.create_schema(staging_dataset))
        .await?;
    for table in tables::staging_tables() {
        warehouse
            .execute(&dialect.create_table(staging_dataset, &table))
            .await?;
    }

    let mut results = Vec::new();
    for (i, spec) in merge_specs(&dialect, raw_dataset, Utc::now(), date)
        .into_iter()
        .enumerate()
    {
        warehouse
            .execute(&spec.render(&dialect, staging_dataset))
            .await?;
        info!("Merged {}.{}", staging_dataset, spec.target.name);
        results.push(format!("Query {} ({}) executed successfully", i + 1, spec.target.name));
    }

    Ok(TransformOutcome { date, results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractTable;
    use crate::warehouse::{DuckDbWarehouse, RowExt, SqlValue};
    use chrono::TimeZone;

    #[test]
    fn test_specs_are_ordered() {
        let specs = merge_specs(
            &Dialect::DuckDb,
            "youtube_raw",
            Utc::now(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        );
        let names: Vec<_> = specs.iter().map(|s| s.target.name).collect();
        assert_eq!(
            names,
            [
                "dim_videos",
                "dim_channels",
                "dim_comments",
                "dim_categories",
                "fact_video_statistics",
                "fact_comments"
            ]
        );
        assert!(specs[4].source.contains("DATE '2025-01-01' AS \"date\""));
    }

    #[tokio::test]
    async fn test_duration_rendering() {
        let wh = DuckDbWarehouse::in_memory().unwrap();
        let expr = duration_expr(wh.dialect(), "d");
        let rows = wh
            .query(
                &format!(
                    "SELECT {} AS r FROM (VALUES (1, 'PT4M13S'), (2, 'PT45S'), (3, 'PT1H2M'), \
                     (4, 'PT2H5S'), (5, NULL)) AS t(i, d) ORDER BY i",
                    expr
                ),
                &[],
            )
            .await
            .unwrap();
        let rendered: Vec<Option<String>> = rows.iter().map(|r| r.text("r")).collect();
        assert_eq!(
            rendered,
            vec![
                Some("04:13".to_string()),
                Some("00:45".to_string()),
                Some("1:02:00".to_string()),
                Some("2:00:05".to_string()),
                None
            ]
        );
    }

    #[tokio::test]
    async fn test_stats_without_video_row_are_dropped() {
        let wh = DuckDbWarehouse::in_memory().unwrap();
        let dialect = wh.dialect().clone();
        wh.execute(&dialect.create_schema("youtube_raw")).await.unwrap();
        for table in tables::raw_tables() {
            wh.execute(&dialect.create_table("youtube_raw", &table)).await.unwrap();
        }
        let ts = SqlValue::Timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap());
        let lineage = [ts.clone(), SqlValue::text("raw/x.json"), SqlValue::text("r1")];

        let mut video = vec![
            SqlValue::text("v1"),
            SqlValue::text("c1"),
            SqlValue::text("Video 1"),
            SqlValue::Null,
            ts.clone(),
            SqlValue::text("rust"),
            SqlValue::text("relevance"),
        ];
        video.extend(lineage.iter().cloned());
        wh.insert_rows("youtube_raw", &tables::raw_table(ExtractTable::Videos), &[video], "r1")
            .await
            .unwrap();

        let stats: Vec<Vec<SqlValue>> = ["v1", "v2"]
            .iter()
            .map(|id| {
                let mut row = vec![
                    SqlValue::text(*id),
                    SqlValue::text("28"),
                    SqlValue::Null,
                    SqlValue::text("PT4M13S"),
                    SqlValue::Int(100),
                    SqlValue::Int(5),
                    SqlValue::Int(1),
                    SqlValue::Int(0),
                    ts.clone(),
                ];
                row.extend(lineage.iter().cloned());
                row
            })
            .collect();
        wh.insert_rows("youtube_raw", &tables::raw_table(ExtractTable::VideoStats), &stats, "r1")
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        run_transform(&wh, "youtube_raw", "youtube_staging", date)
            .await
            .unwrap();

        let rows = wh
            .query(
                "SELECT video_id, channel_id FROM youtube_staging.fact_video_statistics",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("video_id").as_deref(), Some("v1"));
        assert_eq!(rows[0].text("channel_id").as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_transform_on_empty_warehouse() {
        let wh = DuckDbWarehouse::in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let outcome = run_transform(&wh, "youtube_raw", "youtube_staging", date)
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 6);
        assert_eq!(wh.count_rows("youtube_staging", "dim_videos").await.unwrap(), 0);
    }
}
