//! Top-level comment rows.

use serde::{Deserialize, Serialize};

use super::lenient;

/// A top-level comment on a video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    #[serde(deserialize_with = "lenient::string")]
    pub comment_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub video_id: String,
    #[serde(alias = "author")]
    pub author_display_name: Option<String>,
    #[serde(alias = "text")]
    pub text_display: Option<String>,
    #[serde(alias = "likes", deserialize_with = "lenient::count")]
    pub like_count: i64,
    pub published_at: Option<String>,
}
