//! Shared fixtures: a mocked YouTube Data API and a local pipeline.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ytpipe::config::Settings;
use ytpipe::pipeline::Pipeline;
use ytpipe::secrets::MemorySecretStore;
use ytpipe::storage::LocalObjectStore;
use ytpipe::warehouse::DuckDbWarehouse;
use ytpipe::youtube::YoutubeClient;

pub const BUCKET: &str = "raw-test";

fn search_item(video_id: &str, channel_id: &str, title: &str) -> Value {
    json!({
        "id": {"kind": "youtube#video", "videoId": video_id},
        "snippet": {
            "channelId": channel_id,
            "title": title,
            "description": format!("About {}", title),
            "publishedAt": "2025-01-01T12:00:00Z"
        }
    })
}

fn channel(channel_id: &str, title: &str) -> Value {
    json!({
        "id": channel_id,
        "snippet": {
            "title": title,
            "description": "",
            "country": "US",
            "publishedAt": "2020-01-01T00:00:00Z"
        },
        "statistics": {"viewCount": "1000", "subscriberCount": "10", "videoCount": "5"}
    })
}

fn video(video_id: &str, views: u64) -> Value {
    json!({
        "id": video_id,
        "snippet": {"categoryId": "28", "tags": ["rust", "etl"]},
        "contentDetails": {"duration": "PT4M13S"},
        "statistics": {
            "viewCount": views.to_string(),
            "likeCount": "10",
            "commentCount": "2"
        }
    })
}

fn comment_thread(video_id: &str, comment_id: &str, text: &str) -> Value {
    json!({
        "id": format!("thread-{}", comment_id),
        "snippet": {
            "videoId": video_id,
            "topLevelComment": {
                "id": comment_id,
                "snippet": {
                    "authorDisplayName": "viewer",
                    "textDisplay": text,
                    "likeCount": 1,
                    "publishedAt": "2025-01-02T08:00:00Z"
                }
            }
        }
    })
}

pub fn api_error(code: u16, reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "error": {
            "code": code,
            "message": format!("request failed: {}", reason),
            "errors": [{"reason": reason, "domain": "youtube.commentThread"}]
        }
    }))
}

/// Search answers in two pages: `v1, v2` then `v3`.
pub async fn mount_search(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                search_item("v1", "c1", "Intro to pipelines"),
                search_item("v2", "c1", "Warehouses 101")
            ],
            "nextPageToken": "page-2"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [search_item("v3", "c2", "Streaming joins")]
        })))
        .mount(server)
        .await;
}

pub async fn mount_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [channel("c1", "Data Channel"), channel("c2", "Stream Channel")]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [video("v1", 1000), video("v2", 2000), video("v3", 500)]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/videoCategories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "28", "snippet": {"title": "Science & Technology", "assignable": true}}]
        })))
        .mount(server)
        .await;
}

/// `v1` has comments disabled, `v2` has two comments.
pub async fn mount_comments(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .and(query_param("videoId", "v1"))
        .respond_with(api_error(403, "commentsDisabled"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .and(query_param("videoId", "v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                comment_thread("v2", "cm1", "Great overview"),
                comment_thread("v2", "cm2", "Thanks!")
            ]
        })))
        .mount(server)
        .await;
}

/// Every endpoint the combined extraction calls.
pub async fn mock_youtube() -> MockServer {
    let server = MockServer::start().await;
    mount_search(&server).await;
    mount_details(&server).await;
    mount_comments(&server).await;
    server
}

pub fn youtube_client(base: &str) -> YoutubeClient {
    YoutubeClient::new("test-key", base, Duration::from_secs(5), "ytpipe-test").unwrap()
}

pub fn settings(dir: &Path) -> Settings {
    let mut settings = Settings::with_data_dir(dir.to_path_buf());
    settings.storage.bucket = Some(BUCKET.into());
    settings.youtube.default_query = "data engineering".into();
    settings.youtube.max_results = 10;
    settings
}

/// Pipeline over local objects, in-memory DuckDB and the mocked API.
pub fn pipeline(dir: &Path, youtube_base: &str) -> Pipeline {
    Pipeline::new(settings(dir))
        .unwrap()
        .with_secrets(Arc::new(MemorySecretStore::new()))
        .with_store(Arc::new(LocalObjectStore::new(dir.join("objects"), BUCKET)))
        .with_warehouse(Arc::new(DuckDbWarehouse::in_memory().unwrap()))
        .with_youtube(youtube_client(youtube_base))
}
