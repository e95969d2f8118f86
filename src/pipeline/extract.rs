//! Extraction from the YouTube Data API into in-memory batches.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::YoutubeSettings;
use crate::error::{PipelineError, Result};
use crate::models::{Category, Channel, Comment, ExtractTable, ExtractionBatch, Video, VideoStatistics};
use crate::youtube::{unique_ids, CommentFetch, CommentScope, YoutubeClient, MAX_PAGE_SIZE};

/// Upper bound on rows per extraction call: one API page.
pub const MAX_EXTRACT_RESULTS: usize = MAX_PAGE_SIZE;

/// Parameters of a combined extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub query: String,
    pub max_results: usize,
    pub region_code: String,
    pub order: String,
    pub comment_limit: usize,
    pub comment_scope: CommentScope,
}

impl BatchRequest {
    pub fn from_settings(settings: &YoutubeSettings) -> Self {
        Self {
            query: settings.default_query.clone(),
            max_results: settings.max_results as usize,
            region_code: settings.region_code.clone(),
            order: settings.search_order.clone(),
            comment_limit: settings.comment_limit as usize,
            comment_scope: settings.comment_scope,
        }
    }

    /// Reject unusable requests and clamp `max_results`.
    pub fn validate(mut self) -> Result<Self> {
        self.query = self.query.trim().to_string();
        if self.query.is_empty() {
            return Err(PipelineError::invalid("query must not be empty"));
        }
        if self.max_results == 0 {
            return Err(PipelineError::invalid("max_results must be greater than 0"));
        }
        self.max_results = self.max_results.min(MAX_EXTRACT_RESULTS);
        if self.region_code.trim().is_empty() {
            self.region_code = "US".to_string();
        }
        Ok(self)
    }
}

/// Keep going after an API-level failure; transport failures still abort.
fn degrade<T: Default>(what: &str, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            warn!("{} failed, continuing without it: {}", what, e);
            Ok(T::default())
        }
    }
}

/// Search, then enrich the hits with channels, statistics, comments and categories.
pub async fn extract_batch(client: &YoutubeClient, request: &BatchRequest) -> Result<ExtractionBatch> {
    let mut batch = ExtractionBatch::new(request.query.clone());

    batch.videos = degrade(
        "Video search",
        client
            .search_videos(&request.query, request.max_results, &request.order)
            .await,
    )?;

    let channel_ids: Vec<String> = batch
        .videos
        .iter()
        .filter_map(|v| v.channel_id.clone())
        .collect();
    let channel_ids = unique_ids(&channel_ids);
    batch.channels = degrade("Channel details", client.channel_details(&channel_ids).await)?;

    let video_ids: Vec<String> = batch.videos.iter().map(|v| v.video_id.clone()).collect();
    batch.video_stats = degrade("Video statistics", client.video_statistics(&video_ids).await)?;

    batch.comments = extract_comments(client, &video_ids, request).await?;

    batch.categories = degrade(
        "Video categories",
        client.video_categories(&request.region_code).await,
    )?;

    info!(
        "Extracted '{}': {} videos, {} channels, {} stats, {} comments, {} categories",
        request.query,
        batch.videos.len(),
        batch.channels.len(),
        batch.video_stats.len(),
        batch.comments.len(),
        batch.categories.len()
    );
    Ok(batch)
}

async fn extract_comments(
    client: &YoutubeClient,
    video_ids: &[String],
    request: &BatchRequest,
) -> Result<Vec<Comment>> {
    let mut comments = Vec::new();
    if request.comment_limit == 0 {
        return Ok(comments);
    }

    for video_id in video_ids {
        let fetched = degrade(
            "Comment extraction",
            client.video_comments(video_id, request.comment_limit).await,
        )?;
        let found = match fetched {
            CommentFetch::Disabled => continue,
            CommentFetch::Comments(found) => found,
        };
        if found.is_empty() {
            continue;
        }
        comments.extend(found);
        if request.comment_scope == CommentScope::FirstAvailable {
            break;
        }
    }

    if comments.is_empty() && !video_ids.is_empty() {
        info!("No comments available for any of the {} videos", video_ids.len());
    }
    Ok(comments)
}

/// Parameters of a single-table extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequest {
    pub table: ExtractTable,
    pub query: Option<String>,
    pub video_ids: Vec<String>,
    pub channel_ids: Vec<String>,
    pub region_code: String,
    pub max_results: usize,
    pub order: String,
}

impl TableRequest {
    pub fn new(table: ExtractTable, settings: &YoutubeSettings) -> Self {
        Self {
            table,
            query: None,
            video_ids: Vec::new(),
            channel_ids: Vec::new(),
            region_code: settings.region_code.clone(),
            max_results: settings.table_max_results as usize,
            order: settings.search_order.clone(),
        }
    }

    pub fn validate(mut self) -> Result<Self> {
        if self.max_results == 0 {
            return Err(PipelineError::invalid("max_results must be greater than 0"));
        }
        self.max_results = self.max_results.min(MAX_EXTRACT_RESULTS);
        self.video_ids = unique_ids(&self.video_ids);
        self.channel_ids = unique_ids(&self.channel_ids);
        self.query = self
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        if self.region_code.trim().is_empty() {
            self.region_code = "US".to_string();
        }

        match self.table {
            ExtractTable::Videos if self.query.is_none() => {
                Err(PipelineError::invalid("videos requires query"))
            }
            ExtractTable::VideoStats if self.video_ids.is_empty() => {
                Err(PipelineError::invalid("video_stats requires video_ids"))
            }
            ExtractTable::Comments if self.video_ids.is_empty() => {
                Err(PipelineError::invalid("comments requires video_ids"))
            }
            ExtractTable::Channels if self.channel_ids.is_empty() => {
                Err(PipelineError::invalid("channels requires channel_id"))
            }
            _ => Ok(self),
        }
    }
}

/// Split a comma-separated id list.
pub fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Rows of one extracted table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRows {
    Videos(Vec<Video>),
    VideoStats(Vec<VideoStatistics>),
    Channels(Vec<Channel>),
    Categories(Vec<Category>),
    Comments(Vec<Comment>),
}

impl TableRows {
    pub fn table(&self) -> ExtractTable {
        match self {
            TableRows::Videos(_) => ExtractTable::Videos,
            TableRows::VideoStats(_) => ExtractTable::VideoStats,
            TableRows::Channels(_) => ExtractTable::Channels,
            TableRows::Categories(_) => ExtractTable::Categories,
            TableRows::Comments(_) => ExtractTable::Comments,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TableRows::Videos(r) => r.len(),
            TableRows::VideoStats(r) => r.len(),
            TableRows::Channels(r) => r.len(),
            TableRows::Categories(r) => r.len(),
            TableRows::Comments(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize as JSON Lines, one record per line.
    pub fn to_json_lines(&self) -> Result<Vec<u8>> {
        fn lines<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
            let mut out = Vec::new();
            for row in rows {
                serde_json::to_writer(&mut out, row)?;
                out.push(b'\n');
            }
            Ok(out)
        }
        match self {
            TableRows::Videos(r) => lines(r),
            TableRows::VideoStats(r) => lines(r),
            TableRows::Channels(r) => lines(r),
            TableRows::Categories(r) => lines(r),
            TableRows::Comments(r) => lines(r),
        }
    }
}

/// Extract one table. API errors propagate, except disabled comments.
pub async fn extract_table(client: &YoutubeClient, request: &TableRequest) -> Result<TableRows> {
    let rows = match request.table {
        ExtractTable::Videos => {
            let query = request.query.as_deref().unwrap_or_default();
            TableRows::Videos(
                client
                    .search_videos(query, request.max_results, &request.order)
                    .await?,
            )
        }
        ExtractTable::VideoStats => {
            TableRows::VideoStats(client.video_statistics(&request.video_ids).await?)
        }
        ExtractTable::Channels => {
            TableRows::Channels(client.channel_details(&request.channel_ids).await?)
        }
        ExtractTable::Categories => {
            TableRows::Categories(client.video_categories(&request.region_code).await?)
        }
        ExtractTable::Comments => {
            let mut comments = Vec::new();
            for video_id in &request.video_ids {
                let fetched = client.video_comments(video_id, request.max_results).await?;
                comments.extend(fetched.into_comments());
            }
            TableRows::Comments(comments)
        }
    };

    info!("Extracted {} rows for table {}", rows.len(), request.table.as_str());
    Ok(rows)
}
