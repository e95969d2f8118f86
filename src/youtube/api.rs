//! Wire types for the YouTube Data API v3 and their flattening into rows.

use chrono::Utc;
use serde::Deserialize;

use crate::models::lenient::parse_count;
use crate::models::{Category, Channel, Comment, Video, VideoStatistics};

/// Generic list envelope shared by every `*.list` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl<T> ListResponse<T> {
    /// Continuation token, treating an empty string as absent.
    pub fn next_token(&self) -> Option<String> {
        self.next_page_token.clone().filter(|t| !t.is_empty())
    }
}

/// Error envelope: `{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorItem {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub id: SearchResultId,
    #[serde(default)]
    pub snippet: SearchSnippet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultId {
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSnippet {
    pub channel_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
}

impl SearchResult {
    /// Flatten a search hit; hits without a video id (channels, playlists) are dropped.
    pub fn into_video(self, query: &str, order: &str) -> Option<Video> {
        let video_id = self.id.video_id.filter(|id| !id.is_empty())?;
        Some(Video {
            video_id,
            channel_id: self.snippet.channel_id,
            title: self.snippet.title,
            description: self.snippet.description,
            published_at: self.snippet.published_at,
            search_query: Some(query.to_string()),
            search_order: Some(order.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelResource {
    pub id: String,
    #[serde(default)]
    pub snippet: ChannelSnippet,
    #[serde(default)]
    pub statistics: CounterSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSnippet {
    pub title: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub published_at: Option<String>,
}

/// Counters arrive as decimal strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CounterSet {
    pub view_count: Option<String>,
    pub subscriber_count: Option<String>,
    pub video_count: Option<String>,
    pub like_count: Option<String>,
    pub comment_count: Option<String>,
    pub favorite_count: Option<String>,
}

impl From<ChannelResource> for Channel {
    fn from(res: ChannelResource) -> Self {
        Channel {
            channel_id: res.id,
            channel_title: res.snippet.title,
            channel_description: res.snippet.description,
            country: res.snippet.country,
            published_at: res.snippet.published_at,
            subscriber_count: parse_count(res.statistics.subscriber_count.as_deref()),
            video_count: parse_count(res.statistics.video_count.as_deref()),
            view_count: parse_count(res.statistics.view_count.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResource {
    pub id: String,
    #[serde(default)]
    pub snippet: VideoSnippet,
    #[serde(default)]
    pub content_details: ContentDetails,
    #[serde(default)]
    pub statistics: CounterSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoSnippet {
    pub category_id: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContentDetails {
    pub duration: Option<String>,
}

impl From<VideoResource> for VideoStatistics {
    fn from(res: VideoResource) -> Self {
        let tags = if res.snippet.tags.is_empty() {
            None
        } else {
            Some(res.snippet.tags.join(","))
        };
        VideoStatistics {
            video_id: res.id,
            category_id: res.snippet.category_id,
            tags,
            duration: res.content_details.duration,
            view_count: parse_count(res.statistics.view_count.as_deref()),
            like_count: parse_count(res.statistics.like_count.as_deref()),
            comment_count: parse_count(res.statistics.comment_count.as_deref()),
            favorite_count: parse_count(res.statistics.favorite_count.as_deref()),
            collected_at: Some(Utc::now().to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentThreadResource {
    pub id: String,
    pub snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadSnippet {
    #[serde(default)]
    pub video_id: Option<String>,
    pub top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
pub struct TopLevelComment {
    pub id: String,
    #[serde(default)]
    pub snippet: CommentSnippet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentSnippet {
    pub author_display_name: Option<String>,
    pub text_display: Option<String>,
    pub like_count: Option<i64>,
    pub published_at: Option<String>,
}

impl CommentThreadResource {
    pub fn into_comment(self, requested_video: &str) -> Comment {
        let top = self.snippet.top_level_comment;
        Comment {
            comment_id: top.id,
            video_id: self
                .snippet
                .video_id
                .unwrap_or_else(|| requested_video.to_string()),
            author_display_name: top.snippet.author_display_name,
            text_display: top.snippet.text_display,
            like_count: top.snippet.like_count.unwrap_or(0),
            published_at: top.snippet.published_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryResource {
    pub id: String,
    #[serde(default)]
    pub snippet: CategorySnippet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CategorySnippet {
    pub title: Option<String>,
    pub assignable: Option<bool>,
}

impl CategoryResource {
    pub fn into_category(self, region: &str) -> Category {
        Category {
            category_id: self.id,
            category_title: self.snippet.title,
            assignable: self.snippet.assignable,
            region: Some(region.to_string()),
        }
    }
}
