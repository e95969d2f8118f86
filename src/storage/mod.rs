//! Object storage for staged extraction documents.

mod gcs;
mod local;
pub mod paths;

pub use gcs::GcsObjectStore;
pub use local::LocalObjectStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Settings, StorageBackend};
use crate::error::{PipelineError, Result};
use crate::gcp_auth::GcpAuth;

pub const GCS_BASE: &str = "https://storage.googleapis.com";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const JSONL_CONTENT_TYPE: &str = "application/x-ndjson";

/// A bucket of immutable objects addressed by slash-separated paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Canonical URI of an object, recorded as row lineage.
    fn uri(&self, path: &str) -> String;

    /// Write an object in a single call. Readers never see a partial object.
    async fn put(&self, path: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    async fn get(&self, path: &str) -> Result<Vec<u8>>;
}

/// Build the configured object store.
///
/// A missing bucket is reported as a request error, matching the behavior of
/// the function endpoints when `RAW_BUCKET` is unset.
pub fn from_settings(settings: &Settings, auth: Arc<GcpAuth>) -> Result<Arc<dyn ObjectStore>> {
    let bucket = settings
        .bucket()
        .map_err(|_| PipelineError::invalid("Missing RAW_BUCKET environment variable"))?
        .to_string();

    let store: Arc<dyn ObjectStore> = match settings.storage.backend {
        StorageBackend::Local => Arc::new(LocalObjectStore::new(
            settings.storage.local_root.clone(),
            bucket,
        )),
        StorageBackend::Gcs => Arc::new(GcsObjectStore::new(
            &settings.storage.gcs_base_url,
            bucket,
            auth,
            &settings.user_agent,
        )?),
    };
    Ok(store)
}

/// Reject empty, absolute and parent-traversing object paths.
pub(crate) fn validate_object_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') {
        return Err(PipelineError::invalid(format!("Invalid object path: '{}'", path)));
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(PipelineError::invalid(format!("Invalid object path: '{}'", path)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_object_path() {
        assert!(validate_object_path("extract/run_id=1/table=videos.jsonl").is_ok());
        assert!(validate_object_path("raw/youtube/query=data engineering/date=20250101/r/data.json").is_ok());
        assert!(validate_object_path("").is_err());
        assert!(validate_object_path("/etc/passwd").is_err());
        assert!(validate_object_path("raw/../../secret").is_err());
        assert!(validate_object_path("raw//x").is_err());
    }
}
