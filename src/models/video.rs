//! Video and per-video statistics rows.

use serde::{Deserialize, Serialize};

use super::lenient;

/// A video found by search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Video {
    #[serde(deserialize_with = "lenient::string")]
    pub video_id: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub channel_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    /// Query that surfaced this video.
    pub search_query: Option<String>,
    /// Search ordering used (`relevance`, `date`, ...).
    pub search_order: Option<String>,
}

/// Statistics snapshot of a video at extraction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoStatistics {
    #[serde(deserialize_with = "lenient::string")]
    pub video_id: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub category_id: Option<String>,
    /// Comma-joined tag list.
    #[serde(deserialize_with = "lenient::tags")]
    pub tags: Option<String>,
    /// ISO-8601 duration, e.g. `PT4M13S`.
    #[serde(alias = "duration_iso8601")]
    pub duration: Option<String>,
    #[serde(alias = "views", deserialize_with = "lenient::count")]
    pub view_count: i64,
    #[serde(alias = "likes", deserialize_with = "lenient::count")]
    pub like_count: i64,
    #[serde(alias = "comments", deserialize_with = "lenient::count")]
    pub comment_count: i64,
    #[serde(alias = "favorites", deserialize_with = "lenient::count")]
    pub favorite_count: i64,
    #[serde(alias = "collected_at_utc")]
    pub collected_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_accepts_per_table_field_names() {
        let stats: VideoStatistics = serde_json::from_str(
            r#"{
                "video_id": "abc",
                "views": "1500",
                "likes": 20,
                "comments": null,
                "duration_iso8601": "PT3M5S",
                "collected_at_utc": "2024-05-01T00:00:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(stats.video_id, "abc");
        assert_eq!(stats.view_count, 1500);
        assert_eq!(stats.like_count, 20);
        assert_eq!(stats.comment_count, 0);
        assert_eq!(stats.favorite_count, 0);
        assert_eq!(stats.duration.as_deref(), Some("PT3M5S"));
        assert!(stats.collected_at.is_some());
    }

    #[test]
    fn test_video_serializes_canonical_names() {
        let video = Video {
            video_id: "v1".into(),
            channel_id: Some("c1".into()),
            search_query: Some("data engineering".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["video_id"], "v1");
        assert_eq!(json["channel_id"], "c1");
        assert_eq!(json["search_query"], "data engineering");
    }
}
