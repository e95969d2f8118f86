//! Write extraction output to object storage.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::extract::TableRows;
use crate::error::Result;
use crate::models::{ExtractionBatch, RunId};
use crate::storage::{paths, ObjectStore, JSONL_CONTENT_TYPE, JSON_CONTENT_TYPE};

/// Where a staged object landed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedObject {
    pub bucket_name: String,
    pub blob_name: String,
    pub uri: String,
    pub run_id: RunId,
    pub count: usize,
}

/// Stage a combined batch as one JSON document.
pub async fn stage_batch(
    store: &dyn ObjectStore,
    batch: &ExtractionBatch,
    run_id: &RunId,
    date: NaiveDate,
) -> Result<StagedObject> {
    let blob_name = paths::batch_document_path(&batch.query, date, run_id);
    let body = serde_json::to_vec(batch)?;
    store.put(&blob_name, body, JSON_CONTENT_TYPE).await?;

    let count = batch.counts().iter().map(|(_, n)| n).sum();
    let uri = store.uri(&blob_name);
    info!("Staged {} rows to {}", count, uri);

    Ok(StagedObject {
        bucket_name: store.bucket().to_string(),
        blob_name,
        uri,
        run_id: run_id.clone(),
        count,
    })
}

/// Stage one table's rows as JSON Lines.
pub async fn stage_table(
    store: &dyn ObjectStore,
    rows: &TableRows,
    run_id: &RunId,
) -> Result<StagedObject> {
    let blob_name = paths::table_extract_path(run_id, rows.table().as_str());
    store
        .put(&blob_name, rows.to_json_lines()?, JSONL_CONTENT_TYPE)
        .await?;

    let uri = store.uri(&blob_name);
    info!("Staged {} {} rows to {}", rows.len(), rows.table().as_str(), uri);

    Ok(StagedObject {
        bucket_name: store.bucket().to_string(),
        blob_name,
        uri,
        run_id: run_id.clone(),
        count: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Video, ExtractTable};
    use crate::storage::LocalObjectStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stage_batch_layout() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "raw");
        let run_id = RunId::parse("r1").unwrap();
        let mut batch = ExtractionBatch::new("data engineering");
        batch.videos.push(Video {
            video_id: "v1".into(),
            ..Default::default()
        });

        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let staged = stage_batch(&store, &batch, &run_id, date).await.unwrap();
        assert_eq!(
            staged.blob_name,
            "raw/youtube/query=data engineering/date=20250203/r1/data.json"
        );
        assert_eq!(staged.bucket_name, "raw");
        assert_eq!(staged.count, 1);

        let body = store.get(&staged.blob_name).await.unwrap();
        let back: ExtractionBatch = serde_json::from_slice(&body).unwrap();
        assert_eq!(back.videos[0].video_id, "v1");
    }

    #[tokio::test]
    async fn test_stage_empty_table() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "raw");
        let run_id = RunId::parse("r2").unwrap();

        let staged = stage_table(&store, &TableRows::Comments(Vec::new()), &run_id)
            .await
            .unwrap();
        assert_eq!(staged.blob_name, "extract/run_id=r2/table=comments.jsonl");
        assert_eq!(staged.count, 0);
        assert!(store.get(&staged.blob_name).await.unwrap().is_empty());
        assert_eq!(ExtractTable::Comments.as_str(), "comments");
    }
}
