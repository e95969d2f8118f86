//! Google Cloud Storage backend over the JSON API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{validate_object_path, ObjectStore};
use crate::error::{PipelineError, Result};
use crate::gcp_auth::GcpAuth;

pub struct GcsObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    auth: Arc<GcpAuth>,
}

impl GcsObjectStore {
    pub fn new(
        base_url: &str,
        bucket: impl Into<String>,
        auth: Arc<GcpAuth>,
        user_agent: &str,
    ) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            auth,
        })
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn uri(&self, path: &str) -> String {
        format!("gs://{}/{}", self.bucket, path)
    }

    async fn put(&self, path: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        validate_object_path(path)?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(path)
        );
        let token = self.auth.token().await?;
        let len = body.len();

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::storage(format!(
                "Upload of {} failed (HTTP {}): {}",
                self.uri(path),
                status,
                text
            )));
        }

        tracing::debug!("Uploaded {} bytes to {}", len, self.uri(path));
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        validate_object_path(path)?;
        let url = format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            self.base_url,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(path)
        );
        let token = self.auth.token().await?;

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        match response.status() {
            s if s.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(PipelineError::storage(format!(
                "Object not found: {}",
                self.uri(path)
            ))),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(PipelineError::storage(format!(
                    "Download of {} failed (HTTP {}): {}",
                    self.uri(path),
                    status,
                    text
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> GcsObjectStore {
        GcsObjectStore::new(
            &server.uri(),
            "raw-bucket",
            Arc::new(GcpAuth::static_token("tok")),
            "ytpipe-test",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_uses_media_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/raw-bucket/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "extract/run_id=r1/table=videos.jsonl"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .put("extract/run_id=r1/table=videos.jsonl", b"{}".to_vec(), "application/x-ndjson")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_download_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = store(&server).get("raw/x/data.json").await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(err.to_string().contains("gs://raw-bucket/raw/x/data.json"));
    }

    #[test]
    fn test_uri() {
        let store = GcsObjectStore::new(
            GCS_TEST_BASE,
            "b",
            Arc::new(GcpAuth::static_token("t")),
            "ua",
        )
        .unwrap();
        assert_eq!(store.uri("a/b.json"), "gs://b/a/b.json");
    }

    const GCS_TEST_BASE: &str = "http://localhost:1";
}
