//! Combined extraction document and the per-table extraction selector.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{Category, Channel, Comment, Video, VideoStatistics};
use crate::error::{PipelineError, Result};

/// Everything one combined extraction produced, staged as a single JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionBatch {
    pub query: String,
    pub videos: Vec<Video>,
    pub channels: Vec<Channel>,
    pub video_stats: Vec<VideoStatistics>,
    pub comments: Vec<Comment>,
    pub categories: Vec<Category>,
    /// RFC 3339 extraction time; older documents carry naive timestamps.
    pub extracted_at: Option<String>,
}

impl ExtractionBatch {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            extracted_at: Some(Utc::now().to_rfc3339()),
            ..Default::default()
        }
    }

    /// Row counts keyed by document key, in staging order.
    pub fn counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("videos", self.videos.len()),
            ("channels", self.channels.len()),
            ("video_stats", self.video_stats.len()),
            ("comments", self.comments.len()),
            ("categories", self.categories.len()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.counts().iter().all(|(_, n)| *n == 0)
    }
}

/// Table selector for single-table extraction and ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractTable {
    Videos,
    VideoStats,
    Channels,
    Categories,
    Comments,
}

impl ExtractTable {
    pub const ALL: [ExtractTable; 5] = [
        ExtractTable::Videos,
        ExtractTable::VideoStats,
        ExtractTable::Channels,
        ExtractTable::Categories,
        ExtractTable::Comments,
    ];

    /// Raw table creation order.
    pub const RAW_ORDER: [ExtractTable; 5] = [
        ExtractTable::Videos,
        ExtractTable::Channels,
        ExtractTable::Comments,
        ExtractTable::VideoStats,
        ExtractTable::Categories,
    ];

    /// Name used in payloads and object paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Videos => "videos",
            Self::VideoStats => "video_stats",
            Self::Channels => "channels",
            Self::Categories => "categories",
            Self::Comments => "comments",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "videos" => Some(Self::Videos),
            "video_stats" | "video_statistics" => Some(Self::VideoStats),
            "channels" => Some(Self::Channels),
            "categories" => Some(Self::Categories),
            "comments" => Some(Self::Comments),
            _ => None,
        }
    }

    /// Parse a payload value, producing the 400 message on failure.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| {
            PipelineError::invalid(format!(
                "Unsupported table '{}'. Expected one of: {}",
                s,
                Self::ALL
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }

    /// Raw warehouse table this selector lands in.
    pub fn raw_table(&self) -> &'static str {
        match self {
            Self::VideoStats => "video_statistics",
            other => other.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_document_keys() {
        let mut batch = ExtractionBatch::new("data engineering");
        batch.videos.push(Video {
            video_id: "v1".into(),
            ..Default::default()
        });
        let json = serde_json::to_value(&batch).unwrap();
        for key in [
            "query",
            "videos",
            "channels",
            "video_stats",
            "comments",
            "categories",
            "extracted_at",
        ] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_batch_tolerates_missing_sections() {
        let batch: ExtractionBatch =
            serde_json::from_str(r#"{"query": "q", "videos": [{"video_id": "a"}]}"#).unwrap();
        assert_eq!(batch.videos.len(), 1);
        assert!(batch.comments.is_empty());
        assert!(batch.extracted_at.is_none());
    }

    #[test]
    fn test_table_names() {
        assert_eq!(ExtractTable::parse("video_stats").unwrap().raw_table(), "video_statistics");
        assert_eq!(
            ExtractTable::parse("video_statistics").unwrap(),
            ExtractTable::VideoStats
        );
        let err = ExtractTable::parse("playlists").unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("playlists"));
    }
}
