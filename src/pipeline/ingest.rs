//! Load staged objects into the raw warehouse tables.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::models::{
    parse_timestamp, Category, Channel, Comment, ExtractTable, ExtractionBatch, Lineage, RunId,
    Video, VideoStatistics,
};
use crate::storage::ObjectStore;
use crate::warehouse::{tables, SqlValue, Warehouse};

/// A staged record that maps onto a raw table row.
pub trait RawRecord: DeserializeOwned {
    const TABLE: ExtractTable;

    /// Values of the non-lineage columns, in table order.
    fn values(&self) -> Vec<SqlValue>;

    fn row(&self, lineage: &Lineage) -> Vec<SqlValue> {
        let mut values = self.values();
        values.push(SqlValue::Timestamp(lineage.ingest_timestamp));
        values.push(SqlValue::text(lineage.source_path.clone()));
        values.push(SqlValue::text(lineage.run_id.as_str()));
        values
    }
}

fn ts(raw: &Option<String>) -> SqlValue {
    SqlValue::opt_timestamp(raw.as_deref().and_then(parse_timestamp))
}

fn text(raw: &Option<String>) -> SqlValue {
    SqlValue::opt_text(raw.as_deref())
}

impl RawRecord for Video {
    const TABLE: ExtractTable = ExtractTable::Videos;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::text(self.video_id.clone()),
            text(&self.channel_id),
            text(&self.title),
            text(&self.description),
            ts(&self.published_at),
            text(&self.search_query),
            text(&self.search_order),
        ]
    }
}

impl RawRecord for Channel {
    const TABLE: ExtractTable = ExtractTable::Channels;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::text(self.channel_id.clone()),
            text(&self.channel_title),
            text(&self.channel_description),
            text(&self.country),
            ts(&self.published_at),
            SqlValue::Int(self.subscriber_count),
            SqlValue::Int(self.video_count),
            SqlValue::Int(self.view_count),
        ]
    }
}

impl RawRecord for Comment {
    const TABLE: ExtractTable = ExtractTable::Comments;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::text(self.comment_id.clone()),
            SqlValue::text(self.video_id.clone()),
            text(&self.author_display_name),
            text(&self.text_display),
            SqlValue::Int(self.like_count),
            ts(&self.published_at),
        ]
    }
}

impl RawRecord for VideoStatistics {
    const TABLE: ExtractTable = ExtractTable::VideoStats;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::text(self.video_id.clone()),
            text(&self.category_id),
            text(&self.tags),
            text(&self.duration),
            SqlValue::Int(self.view_count),
            SqlValue::Int(self.like_count),
            SqlValue::Int(self.comment_count),
            SqlValue::Int(self.favorite_count),
            ts(&self.collected_at),
        ]
    }
}

impl RawRecord for Category {
    const TABLE: ExtractTable = ExtractTable::Categories;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::text(self.category_id.clone()),
            text(&self.category_title),
            self.assignable.map_or(SqlValue::Null, SqlValue::Bool),
            text(&self.region),
        ]
    }
}

/// Rows inserted into one raw table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableLoad {
    pub table: String,
    pub rows: usize,
}

async fn insert_records<R: RawRecord>(
    warehouse: &dyn Warehouse,
    dataset: &str,
    records: &[R],
    lineage: &Lineage,
) -> Result<usize> {
    let table = tables::raw_table(R::TABLE);
    if records.is_empty() {
        info!("Skipping {} (no rows)", table.name);
        return Ok(0);
    }

    let rows: Vec<Vec<SqlValue>> = records.iter().map(|r| r.row(lineage)).collect();
    let batch_key = format!("{}:{}", lineage.run_id, table.name);
    let inserted = warehouse
        .insert_rows(dataset, &table, &rows, &batch_key)
        .await?;
    info!("Loaded {} rows into {}.{}", inserted, dataset, table.name);
    Ok(inserted)
}

/// Load a combined batch document into all five raw tables.
pub async fn load_batch(
    warehouse: &dyn Warehouse,
    store: &dyn ObjectStore,
    dataset: &str,
    blob_name: &str,
    run_id: &RunId,
) -> Result<Vec<TableLoad>> {
    let body = store.get(blob_name).await?;
    let batch: ExtractionBatch = serde_json::from_slice(&body)?;
    let lineage = Lineage::new(store.uri(blob_name), run_id.clone());

    let loads = vec![
        (
            ExtractTable::Videos,
            insert_records(warehouse, dataset, &batch.videos, &lineage).await?,
        ),
        (
            ExtractTable::Channels,
            insert_records(warehouse, dataset, &batch.channels, &lineage).await?,
        ),
        (
            ExtractTable::Comments,
            insert_records(warehouse, dataset, &batch.comments, &lineage).await?,
        ),
        (
            ExtractTable::VideoStats,
            insert_records(warehouse, dataset, &batch.video_stats, &lineage).await?,
        ),
        (
            ExtractTable::Categories,
            insert_records(warehouse, dataset, &batch.categories, &lineage).await?,
        ),
    ];

    Ok(loads
        .into_iter()
        .map(|(table, rows)| TableLoad {
            table: table.raw_table().to_string(),
            rows,
        })
        .collect())
}

fn parse_lines<R: RawRecord>(body: &[u8]) -> Result<Vec<R>> {
    body.split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| serde_json::from_slice(line).map_err(Into::into))
        .collect()
}

/// Result of a single-table ingest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableIngest {
    pub table: String,
    pub gcs_src: String,
    pub table_fqdn: String,
    pub inserted: usize,
    pub total_rows_in_table: i64,
}

async fn load_lines<R: RawRecord>(
    warehouse: &dyn Warehouse,
    dataset: &str,
    body: &[u8],
    lineage: &Lineage,
) -> Result<usize> {
    let records: Vec<R> = parse_lines(body)?;
    insert_records(warehouse, dataset, &records, lineage).await
}

/// Load one staged JSON Lines table and report the table's total row count.
pub async fn load_table(
    warehouse: &dyn Warehouse,
    store: &dyn ObjectStore,
    dataset: &str,
    table: ExtractTable,
    run_id: &RunId,
) -> Result<TableIngest> {
    let blob_name = crate::storage::paths::table_extract_path(run_id, table.as_str());
    let body = store.get(&blob_name).await?;
    let gcs_src = store.uri(&blob_name);
    let lineage = Lineage::new(gcs_src.clone(), run_id.clone());

    let inserted = match table {
        ExtractTable::Videos => load_lines::<Video>(warehouse, dataset, &body, &lineage).await?,
        ExtractTable::VideoStats => {
            load_lines::<VideoStatistics>(warehouse, dataset, &body, &lineage).await?
        }
        ExtractTable::Channels => load_lines::<Channel>(warehouse, dataset, &body, &lineage).await?,
        ExtractTable::Categories => {
            load_lines::<Category>(warehouse, dataset, &body, &lineage).await?
        }
        ExtractTable::Comments => load_lines::<Comment>(warehouse, dataset, &body, &lineage).await?,
    };

    let raw_table = table.raw_table();
    let total = warehouse.count_rows(dataset, raw_table).await?;
    Ok(TableIngest {
        table: table.as_str().to_string(),
        gcs_src,
        table_fqdn: warehouse.dialect().table_fqdn(dataset, raw_table),
        inserted,
        total_rows_in_table: total,
    })
}
