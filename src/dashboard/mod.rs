//! Read-side analytics over the staging tables.
//!
//! Every section is an independent parameterized query. A section that
//! fails is logged and left empty so the rest of the page still renders.

pub mod format;

use std::future::Future;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::warehouse::{tables, QueryParam, Row, RowExt, SqlValue, Warehouse};

pub use format::{format_count, round2};

/// Selectable date windows, in days.
pub const WINDOWS: [u32; 3] = [7, 30, 90];
pub const DEFAULT_WINDOW: u32 = 30;

const TOP_VIDEOS_LIMIT: usize = 50;
const TOP_CHANNELS_LIMIT: usize = 10;

/// Date window and optional channel restriction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardFilter {
    pub ndays: u32,
    pub channel_id: Option<String>,
}

impl Default for DashboardFilter {
    fn default() -> Self {
        Self {
            ndays: DEFAULT_WINDOW,
            channel_id: None,
        }
    }
}

impl DashboardFilter {
    /// Parse raw request values. An empty or `All` channel means no restriction.
    pub fn parse(ndays: Option<&str>, channel_id: Option<&str>) -> Result<Self> {
        let ndays = match ndays.map(str::trim).filter(|s| !s.is_empty()) {
            None => DEFAULT_WINDOW,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| WINDOWS.contains(n))
                .ok_or_else(|| {
                    PipelineError::invalid(format!(
                        "ndays must be one of 7, 30 or 90 (got '{}')",
                        raw
                    ))
                })?,
        };
        let channel_id = channel_id
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
            .map(String::from);
        Ok(Self { ndays, channel_id })
    }

    /// First day inside the window.
    pub fn since(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(i64::from(self.ndays))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelOption {
    pub channel_id: String,
    pub channel_title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopVideo {
    pub video_id: String,
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub published_at: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelViews {
    pub channel_title: String,
    pub views: i64,
}

/// Most recent snapshot date loaded into the fact table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Freshness {
    pub latest_date: String,
    pub row_count: i64,
}

/// Everything the dashboard page shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub filter: DashboardFilter,
    pub since: NaiveDate,
    pub channels: Vec<ChannelOption>,
    pub kpis: Kpis,
    pub daily: Vec<DailyPoint>,
    pub top_videos: Vec<TopVideo>,
    /// Mean of (likes + comments) per 1000 views over snapshot rows with views.
    pub engagement_per_1k: Option<f64>,
    pub top_channels: Vec<ChannelViews>,
    pub freshness: Option<Freshness>,
}

/// SQL fragments for one dataset and filter.
struct Queries<'a> {
    warehouse: &'a dyn Warehouse,
    dataset: &'a str,
    filter: &'a DashboardFilter,
    since: NaiveDate,
}

impl Queries<'_> {
    fn table(&self, name: &str) -> String {
        self.warehouse.dialect().table_ref(self.dataset, name)
    }

    fn date_col(&self) -> String {
        self.warehouse.dialect().ident("date")
    }

    /// Joined and filtered statistics, shared by the windowed sections.
    fn filtered_from(&self) -> String {
        let mut sql = format!(
            "FROM {stats} AS s \
             JOIN {videos} AS v ON v.video_id = s.video_id \
             JOIN {channels} AS c ON c.channel_id = v.channel_id \
             WHERE s.{date} >= CAST(@since AS DATE)",
            stats = self.table(tables::FACT_VIDEO_STATISTICS),
            videos = self.table(tables::DIM_VIDEOS),
            channels = self.table(tables::DIM_CHANNELS),
            date = self.date_col(),
        );
        if self.filter.channel_id.is_some() {
            sql.push_str(" AND c.channel_id = @channel_id");
        }
        sql
    }

    fn params(&self) -> Vec<QueryParam> {
        let mut params = vec![QueryParam::new("since", SqlValue::Date(self.since))];
        if let Some(ref channel) = self.filter.channel_id {
            params.push(QueryParam::new("channel_id", SqlValue::text(channel.clone())));
        }
        params
    }

    async fn run(&self, sql: &str) -> Result<Vec<Row>> {
        self.warehouse.query(sql, &self.params()).await
    }

    async fn channels(&self) -> Result<Vec<ChannelOption>> {
        let sql = format!(
            "SELECT DISTINCT channel_id, channel_title FROM {} \
             WHERE channel_id IS NOT NULL ORDER BY channel_title",
            self.table(tables::DIM_CHANNELS)
        );
        let rows = self.warehouse.query(&sql, &[]).await?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                let channel_id = r.text("channel_id")?;
                let channel_title = r.text("channel_title").unwrap_or_else(|| channel_id.clone());
                Some(ChannelOption {
                    channel_id,
                    channel_title,
                })
            })
            .collect())
    }

    async fn kpis(&self) -> Result<Kpis> {
        let sql = format!(
            "SELECT SUM(s.view_count) AS views, SUM(s.like_count) AS likes, \
             SUM(s.comment_count) AS comments {}",
            self.filtered_from()
        );
        let rows = self.run(&sql).await?;
        Ok(rows
            .first()
            .map(|r| Kpis {
                views: r.int("views"),
                likes: r.int("likes"),
                comments: r.int("comments"),
            })
            .unwrap_or_default())
    }

    async fn daily(&self) -> Result<Vec<DailyPoint>> {
        let date = self.date_col();
        let sql = format!(
            "SELECT s.{date} AS day, SUM(s.view_count) AS views, SUM(s.like_count) AS likes, \
             SUM(s.comment_count) AS comments {from} GROUP BY s.{date} ORDER BY s.{date}",
            date = date,
            from = self.filtered_from()
        );
        let rows = self.run(&sql).await?;
        Ok(rows
            .iter()
            .map(|r| DailyPoint {
                date: r.text("day").unwrap_or_default(),
                views: r.int("views"),
                likes: r.int("likes"),
                comments: r.int("comments"),
            })
            .collect())
    }

    /// Latest snapshot of each video in the window, ranked by views.
    async fn top_videos(&self) -> Result<Vec<TopVideo>> {
        let sql = format!(
            "SELECT v.video_id AS video_id, v.title AS title, c.channel_title AS channel_title, \
             v.published_at AS published_at, s.view_count AS views, s.like_count AS likes, \
             s.comment_count AS comments {from} \
             QUALIFY ROW_NUMBER() OVER (PARTITION BY s.video_id ORDER BY s.{date} DESC) = 1 \
             ORDER BY views DESC, video_id LIMIT {limit}",
            from = self.filtered_from(),
            date = self.date_col(),
            limit = TOP_VIDEOS_LIMIT
        );
        let rows = self.run(&sql).await?;
        Ok(rows
            .iter()
            .map(|r| TopVideo {
                video_id: r.text("video_id").unwrap_or_default(),
                title: r.text("title"),
                channel_title: r.text("channel_title"),
                published_at: r.text("published_at"),
                views: r.int("views"),
                likes: r.int("likes"),
                comments: r.int("comments"),
            })
            .collect())
    }

    async fn engagement(&self) -> Result<Option<f64>> {
        let sql = format!(
            "SELECT s.view_count AS views, s.like_count AS likes, \
             s.comment_count AS comments {}",
            self.filtered_from()
        );
        let rows = self.run(&sql).await?;
        Ok(engagement_per_1k(
            rows.iter()
                .map(|r| (r.int("views"), r.int("likes"), r.int("comments"))),
        ))
    }

    async fn top_channels(&self) -> Result<Vec<ChannelViews>> {
        let sql = format!(
            "SELECT c.channel_title AS channel_title, SUM(s.view_count) AS views {from} \
             GROUP BY c.channel_title ORDER BY views DESC LIMIT {limit}",
            from = self.filtered_from(),
            limit = TOP_CHANNELS_LIMIT
        );
        let rows = self.run(&sql).await?;
        Ok(rows
            .iter()
            .map(|r| ChannelViews {
                channel_title: r.text("channel_title").unwrap_or_else(|| "(unknown)".into()),
                views: r.int("views"),
            })
            .collect())
    }

    async fn freshness(&self) -> Result<Option<Freshness>> {
        let table = self.table(tables::FACT_VIDEO_STATISTICS);
        let date = self.date_col();
        let sql = format!(
            "SELECT {date} AS latest_date, COUNT(*) AS row_count FROM {table} \
             WHERE {date} = (SELECT MAX({date}) FROM {table}) GROUP BY {date}",
            date = date,
            table = table
        );
        let rows = self.warehouse.query(&sql, &[]).await?;
        Ok(rows.first().and_then(|r| {
            Some(Freshness {
                latest_date: r.text("latest_date")?,
                row_count: r.int("row_count"),
            })
        }))
    }
}

/// Average engagement per 1000 views; rows without views are skipped.
pub fn engagement_per_1k(rows: impl IntoIterator<Item = (i64, i64, i64)>) -> Option<f64> {
    let rates: Vec<f64> = rows
        .into_iter()
        .filter(|(views, _, _)| *views > 0)
        .map(|(views, likes, comments)| (likes + comments) as f64 / views as f64 * 1000.0)
        .collect();
    if rates.is_empty() {
        return None;
    }
    Some(round2(rates.iter().sum::<f64>() / rates.len() as f64))
}

async fn section<T: Default>(name: &str, fut: impl Future<Output = Result<T>>) -> T {
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            warn!("Dashboard section '{}' failed: {}", name, e);
            T::default()
        }
    }
}

/// Run every section for `filter`, with the window ending at `today`.
pub async fn load_dashboard(
    warehouse: &dyn Warehouse,
    dataset: &str,
    filter: &DashboardFilter,
    today: NaiveDate,
) -> Dashboard {
    let queries = Queries {
        warehouse,
        dataset,
        filter,
        since: filter.since(today),
    };

    Dashboard {
        filter: filter.clone(),
        since: queries.since,
        channels: section("channels", queries.channels()).await,
        kpis: section("kpis", queries.kpis()).await,
        daily: section("daily", queries.daily()).await,
        top_videos: section("top_videos", queries.top_videos()).await,
        engagement_per_1k: section("engagement", queries.engagement()).await,
        top_channels: section("top_channels", queries.top_channels()).await,
        freshness: section("freshness", queries.freshness()).await,
    }
}
