//! Channel and category rows.

use serde::{Deserialize, Serialize};

use super::lenient;

/// Channel details and counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    #[serde(deserialize_with = "lenient::string")]
    pub channel_id: String,
    #[serde(alias = "title")]
    pub channel_title: Option<String>,
    #[serde(alias = "description")]
    pub channel_description: Option<String>,
    pub country: Option<String>,
    pub published_at: Option<String>,
    #[serde(alias = "subscribers", deserialize_with = "lenient::count")]
    pub subscriber_count: i64,
    #[serde(alias = "videos", deserialize_with = "lenient::count")]
    pub video_count: i64,
    #[serde(alias = "views", deserialize_with = "lenient::count")]
    pub view_count: i64,
}

/// A video category for one region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    #[serde(deserialize_with = "lenient::string")]
    pub category_id: String,
    #[serde(alias = "title")]
    pub category_title: Option<String>,
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub assignable: Option<bool>,
    pub region: Option<String>,
}
