//! YouTube extraction against a mocked Data API.

mod common;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ytpipe::config::Settings;
use ytpipe::pipeline::extract::{extract_batch, BatchRequest};
use ytpipe::youtube::{CommentFetch, CommentScope};

fn request(max_results: usize) -> BatchRequest {
    let mut request = BatchRequest::from_settings(&Settings::default().youtube);
    request.query = "data engineering".into();
    request.max_results = max_results;
    request
}

#[tokio::test]
async fn test_search_follows_page_tokens() {
    let server = common::mock_youtube().await;
    let client = common::youtube_client(&server.uri());

    let videos = client.search_videos("data engineering", 10, "relevance").await.unwrap();
    let ids: Vec<_> = videos.iter().map(|v| v.video_id.as_str()).collect();
    assert_eq!(ids, ["v1", "v2", "v3"]);
    assert!(videos.iter().all(|v| v.search_query.as_deref() == Some("data engineering")));
}

#[tokio::test]
async fn test_search_stops_at_max_results() {
    let server = MockServer::start().await;
    common::mount_search(&server).await;
    let client = common::youtube_client(&server.uri());

    let videos = client.search_videos("data engineering", 2, "relevance").await.unwrap();
    assert_eq!(videos.len(), 2);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "second page must not be fetched");
}

#[tokio::test]
async fn test_extraction_is_capped_at_one_page() {
    let server = MockServer::start().await;
    let items: Vec<_> = (0..50)
        .map(|i| {
            json!({
                "id": {"kind": "youtube#video", "videoId": format!("v{}", i)},
                "snippet": {"channelId": "c1", "title": format!("Video {}", i)}
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("maxResults", "50"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": items, "nextPageToken": "more"})),
        )
        .mount(&server)
        .await;
    let client = common::youtube_client(&server.uri());

    let req = request(120).validate().unwrap();
    assert_eq!(req.max_results, 50);

    let videos = client
        .search_videos(&req.query, req.max_results, &req.order)
        .await
        .unwrap();
    assert_eq!(videos.len(), 50);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_batch_extraction_bounds() {
    let server = common::mock_youtube().await;
    let client = common::youtube_client(&server.uri());

    let batch = extract_batch(&client, &request(10).validate().unwrap()).await.unwrap();

    assert!(batch.videos.len() <= 10);
    assert!(batch.videos.iter().all(|v| !v.video_id.is_empty()));
    assert_eq!(batch.channels.len(), 2);
    assert_eq!(batch.video_stats.len(), 3);
    assert_eq!(batch.categories.len(), 1);
    // v1 has comments disabled, so the first video with comments is v2.
    assert_eq!(batch.comments.len(), 2);
    assert!(batch.comments.iter().all(|c| c.video_id == "v2"));
}

#[tokio::test]
async fn test_comments_disabled_is_not_an_error() {
    let server = common::mock_youtube().await;
    let client = common::youtube_client(&server.uri());

    let fetched = client.video_comments("v1", 20).await.unwrap();
    assert_eq!(fetched, CommentFetch::Disabled);
}

#[tokio::test]
async fn test_every_video_without_comments() {
    let server = MockServer::start().await;
    common::mount_search(&server).await;
    common::mount_details(&server).await;
    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .respond_with(common::api_error(403, "commentsDisabled"))
        .expect(3)
        .mount(&server)
        .await;
    let client = common::youtube_client(&server.uri());

    let mut req = request(10);
    req.comment_scope = CommentScope::AllVideos;
    let batch = extract_batch(&client, &req.validate().unwrap()).await.unwrap();

    assert_eq!(batch.videos.len(), 3);
    assert!(batch.comments.is_empty());
}

#[tokio::test]
async fn test_no_channel_ids_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(0)
        .mount(&server)
        .await;
    let client = common::youtube_client(&server.uri());

    let channels = client.channel_details(&[]).await.unwrap();
    assert!(channels.is_empty());
}

#[tokio::test]
async fn test_quota_error_degrades_to_empty_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(common::api_error(403, "quotaExceeded"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/videoCategories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;
    let client = common::youtube_client(&server.uri());

    let batch = extract_batch(&client, &request(10).validate().unwrap()).await.unwrap();
    assert!(batch.is_empty());
}
