//! Filesystem-backed object store laid out as `<root>/<bucket>/<path>`.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{validate_object_path, ObjectStore};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, bucket: impl Into<String>) -> Self {
        Self {
            root,
            bucket: bucket.into(),
        }
    }

    fn object_path(&self, path: &str) -> Result<PathBuf> {
        validate_object_path(path)?;
        Ok(self.root.join(&self.bucket).join(path))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn uri(&self, path: &str) -> String {
        format!("file://{}", self.root.join(&self.bucket).join(path).display())
    }

    async fn put(&self, path: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        let target = self.object_path(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write beside the target, then rename into place.
        let tmp = target.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!("Wrote {} bytes to {}", body.len(), target.display());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.object_path(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::storage(
                format!("Object not found: {}", self.uri(path)),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "raw-bucket");

        store
            .put("extract/run_id=r1/table=videos.jsonl", b"{}\n".to_vec(), "application/x-ndjson")
            .await
            .unwrap();

        let body = store.get("extract/run_id=r1/table=videos.jsonl").await.unwrap();
        assert_eq!(body, b"{}\n");
        assert!(dir
            .path()
            .join("raw-bucket/extract/run_id=r1/table=videos.jsonl")
            .is_file());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "b");

        store.put("a/data.json", b"one".to_vec(), "application/json").await.unwrap();
        store.put("a/data.json", b"two".to_vec(), "application/json").await.unwrap();

        assert_eq!(store.get("a/data.json").await.unwrap(), b"two");
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("b/a")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_object_is_storage_error() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "b");
        let err = store.get("nope/data.json").await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "b");
        let err = store.put("../x", Vec::new(), "text/plain").await.unwrap_err();
        assert!(err.is_client_error());
    }
}
