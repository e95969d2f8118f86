//! Raw dataset initialization.

use serde::Serialize;
use tracing::{info, warn};

use crate::warehouse::{tables, Warehouse};

/// Outcome for one raw table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableStatus {
    Ready { table: String, row_count: i64 },
    Failed { table: String, error: String },
}

impl TableStatus {
    pub fn table(&self) -> &str {
        match self {
            TableStatus::Ready { table, .. } | TableStatus::Failed { table, .. } => table,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TableStatus::Ready { .. })
    }
}

/// Create the raw dataset and tables if missing.
///
/// A failing table is reported in its status entry; the remaining tables
/// are still processed.
pub async fn init_raw_schema(
    warehouse: &dyn Warehouse,
    dataset: &str,
    drop_existing: bool,
) -> Vec<TableStatus> {
    let dialect = warehouse.dialect().clone();

    if let Err(e) = warehouse.execute(&dialect.create_schema(dataset)).await {
        warn!("Could not create dataset {}: {}", dataset, e);
    }

    let mut statuses = Vec::new();
    for table in tables::raw_tables() {
        if drop_existing {
            if let Err(e) = warehouse.execute(&dialect.drop_table(dataset, table.name)).await {
                warn!("Dropping {}.{} failed: {}", dataset, table.name, e);
            }
        }

        let status = match warehouse.execute(&dialect.create_table(dataset, &table)).await {
            Ok(()) => match warehouse.count_rows(dataset, table.name).await {
                Ok(row_count) => TableStatus::Ready {
                    table: table.name.to_string(),
                    row_count,
                },
                Err(e) => TableStatus::Failed {
                    table: table.name.to_string(),
                    error: e.to_string(),
                },
            },
            Err(e) => TableStatus::Failed {
                table: table.name.to_string(),
                error: e.to_string(),
            },
        };

        match &status {
            TableStatus::Ready { row_count, .. } => {
                info!("Table {}.{} ready ({} rows)", dataset, table.name, row_count)
            }
            TableStatus::Failed { error, .. } => {
                warn!("Table {}.{} failed: {}", dataset, table.name, error)
            }
        }
        statuses.push(status);
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::DuckDbWarehouse;

    #[tokio::test]
    async fn test_init_twice_is_stable() {
        let wh = DuckDbWarehouse::in_memory().unwrap();

        let first = init_raw_schema(&wh, "youtube_raw", false).await;
        assert_eq!(first.len(), 5);
        assert!(first.iter().all(TableStatus::is_ready));

        wh.execute("INSERT INTO youtube_raw.categories (category_id) VALUES ('1')")
            .await
            .unwrap();

        let second = init_raw_schema(&wh, "youtube_raw", false).await;
        let categories = second.iter().find(|s| s.table() == "categories").unwrap();
        assert_eq!(
            categories,
            &TableStatus::Ready {
                table: "categories".into(),
                row_count: 1
            }
        );

        let dropped = init_raw_schema(&wh, "youtube_raw", true).await;
        assert!(dropped.iter().all(|s| matches!(s, TableStatus::Ready { row_count: 0, .. })));
    }

    #[test]
    fn test_status_serialization() {
        let ok = serde_json::to_value(TableStatus::Ready {
            table: "videos".into(),
            row_count: 3,
        })
        .unwrap();
        assert_eq!(ok, serde_json::json!({"table": "videos", "row_count": 3}));

        let failed = serde_json::to_value(TableStatus::Failed {
            table: "videos".into(),
            error: "boom".into(),
        })
        .unwrap();
        assert_eq!(failed, serde_json::json!({"table": "videos", "error": "boom"}));
    }
}
