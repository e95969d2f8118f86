//! YouTube Data API v3 client.
//!
//! Thin request/response wrapper: every endpoint call is sequential,
//! pagination follows `nextPageToken`, and ids are batched 50 per request.

pub mod api;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{Category, Channel, Comment, Video, VideoStatistics};
use api::{
    CategoryResource, ChannelResource, CommentThreadResource, ErrorEnvelope, ListResponse,
    SearchResult, VideoResource,
};

pub const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Page size ceiling of `search.list`, `channels.list` and `videos.list`.
pub const MAX_PAGE_SIZE: usize = 50;

/// Page size ceiling of `commentThreads.list`.
pub const MAX_COMMENT_PAGE_SIZE: usize = 100;

/// Ids accepted per `channels.list` / `videos.list` call.
pub const MAX_IDS_PER_REQUEST: usize = 50;

/// Reason code returned with a 403 when a video has comments turned off.
pub const COMMENTS_DISABLED: &str = "commentsDisabled";

/// Which videos comment extraction samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentScope {
    /// Walk videos in search order and stop at the first one with comments.
    #[default]
    FirstAvailable,
    /// Collect comments from every video.
    AllVideos,
}

/// Outcome of fetching one video's comments.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentFetch {
    Comments(Vec<Comment>),
    /// The uploader disabled comments. Reported, never raised.
    Disabled,
}

impl Default for CommentFetch {
    fn default() -> Self {
        CommentFetch::Comments(Vec::new())
    }
}

impl CommentFetch {
    pub fn into_comments(self) -> Vec<Comment> {
        match self {
            CommentFetch::Comments(c) => c,
            CommentFetch::Disabled => Vec::new(),
        }
    }
}

/// Client for the YouTube Data API.
#[derive(Clone)]
pub struct YoutubeClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for YoutubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoutubeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl YoutubeClient {
    /// Create a new client.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET an endpoint and decode the JSON body.
    ///
    /// Non-success statuses and undecodable bodies become [`PipelineError::Api`];
    /// transport failures stay [`PipelineError::Http`].
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_slice(&body).map_err(|e| PipelineError::Api {
            status: status.as_u16(),
            reason: Some("invalidResponse".to_string()),
            message: format!("Failed to decode {} response: {}", endpoint, e),
        })
    }

    /// Search videos matching `query`, following page tokens until
    /// `max_results` rows are collected or the results run out.
    pub async fn search_videos(
        &self,
        query: &str,
        max_results: usize,
        order: &str,
    ) -> Result<Vec<Video>> {
        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;

        while videos.len() < max_results {
            let page_size = (max_results - videos.len()).min(MAX_PAGE_SIZE);
            let mut params = vec![
                ("part", "snippet".to_string()),
                ("type", "video".to_string()),
                ("q", query.to_string()),
                ("order", order.to_string()),
                ("maxResults", page_size.to_string()),
            ];
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: ListResponse<SearchResult> = self.get_json("search", &params).await?;
            let next = page.next_token();
            let page_len = page.items.len();

            for item in page.items {
                if videos.len() >= max_results {
                    break;
                }
                if let Some(video) = item.into_video(query, order) {
                    videos.push(video);
                }
            }

            match next {
                Some(token) if page_len > 0 => page_token = Some(token),
                _ => break,
            }
        }

        info!("Search '{}' returned {} videos", query, videos.len());
        Ok(videos)
    }

    /// Fetch channel details. No request is made for an empty id list.
    pub async fn channel_details(&self, channel_ids: &[String]) -> Result<Vec<Channel>> {
        let ids = unique_ids(channel_ids);
        let mut channels = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let params = [
                ("part", "snippet,statistics".to_string()),
                ("id", chunk.join(",")),
                ("maxResults", MAX_IDS_PER_REQUEST.to_string()),
            ];
            let page: ListResponse<ChannelResource> = self.get_json("channels", &params).await?;
            channels.extend(page.items.into_iter().map(Channel::from));
        }

        debug!("Fetched {} of {} channels", channels.len(), ids.len());
        Ok(channels)
    }

    /// Fetch statistics, category, tags and duration for each video.
    pub async fn video_statistics(&self, video_ids: &[String]) -> Result<Vec<VideoStatistics>> {
        let ids = unique_ids(video_ids);
        let mut stats = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let params = [
                ("part", "snippet,statistics,contentDetails".to_string()),
                ("id", chunk.join(",")),
                ("maxResults", MAX_IDS_PER_REQUEST.to_string()),
            ];
            let page: ListResponse<VideoResource> = self.get_json("videos", &params).await?;
            stats.extend(page.items.into_iter().map(VideoStatistics::from));
        }

        debug!("Fetched statistics for {} of {} videos", stats.len(), ids.len());
        Ok(stats)
    }

    /// Fetch up to `max_comments` top-level comments of a video.
    pub async fn video_comments(&self, video_id: &str, max_comments: usize) -> Result<CommentFetch> {
        let mut comments = Vec::new();
        let mut page_token: Option<String> = None;

        while comments.len() < max_comments {
            let page_size = (max_comments - comments.len()).min(MAX_COMMENT_PAGE_SIZE);
            let mut params = vec![
                ("part", "snippet".to_string()),
                ("videoId", video_id.to_string()),
                ("maxResults", page_size.to_string()),
                ("textFormat", "plainText".to_string()),
            ];
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: ListResponse<CommentThreadResource> =
                match self.get_json("commentThreads", &params).await {
                    Ok(page) => page,
                    Err(e) if e.api_reason() == Some(COMMENTS_DISABLED) => {
                        info!("Comments are disabled for video {}", video_id);
                        return Ok(CommentFetch::Disabled);
                    }
                    Err(e) => return Err(e),
                };

            let next = page.next_token();
            let page_len = page.items.len();
            for thread in page.items {
                if comments.len() >= max_comments {
                    break;
                }
                comments.push(thread.into_comment(video_id));
            }

            match next {
                Some(token) if page_len > 0 => page_token = Some(token),
                _ => break,
            }
        }

        Ok(CommentFetch::Comments(comments))
    }

    /// List the video categories of a region.
    pub async fn video_categories(&self, region_code: &str) -> Result<Vec<Category>> {
        let params = [
            ("part", "snippet".to_string()),
            ("regionCode", region_code.to_string()),
        ];
        let page: ListResponse<CategoryResource> =
            self.get_json("videoCategories", &params).await?;
        Ok(page
            .items
            .into_iter()
            .map(|c| c.into_category(region_code))
            .collect())
    }
}

/// Build an API error from a non-success response body.
fn api_error(status: u16, body: &[u8]) -> PipelineError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => PipelineError::Api {
            status,
            reason: envelope
                .error
                .errors
                .into_iter()
                .find_map(|e| e.reason),
            message: envelope.error.message,
        },
        Err(_) => PipelineError::Api {
            status,
            reason: None,
            message: String::from_utf8_lossy(body).chars().take(500).collect(),
        },
    }
}

/// Drop empty and repeated ids, keeping first-seen order.
pub fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(|id| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids_keeps_order() {
        let ids = vec![
            "b".to_string(),
            "a".to_string(),
            " b ".to_string(),
            "".to_string(),
            "c".to_string(),
        ];
        assert_eq!(unique_ids(&ids), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_api_error_parses_reason() {
        let err = api_error(
            403,
            br#"{"error": {"code": 403, "message": "quota", "errors": [{"reason": "quotaExceeded"}]}}"#,
        );
        assert_eq!(err.api_reason(), Some("quotaExceeded"));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_api_error_non_json_body() {
        let err = api_error(502, b"Bad Gateway");
        assert_eq!(err.api_reason(), None);
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn test_comment_fetch_disabled_is_empty() {
        assert!(CommentFetch::Disabled.into_comments().is_empty());
    }
}
