//! Fixed table layouts of the raw and staging datasets.

use crate::models::ExtractTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef { name, ty }
}

/// A warehouse table: ordered columns plus the merge key (empty for raw tables).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
    pub key: &'static [&'static str],
}

impl TableDef {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

use ColumnType::*;

const LINEAGE: [ColumnDef; 3] = [
    col("ingest_timestamp", Timestamp),
    col("source_path", String),
    col("run_id", String),
];

fn raw(name: &'static str, columns: &[ColumnDef]) -> TableDef {
    let mut all = columns.to_vec();
    all.extend_from_slice(&LINEAGE);
    TableDef {
        name,
        columns: all,
        key: &[],
    }
}

/// Raw tables in creation order.
pub fn raw_tables() -> Vec<TableDef> {
    ExtractTable::RAW_ORDER.iter().map(|t| raw_table(*t)).collect()
}

pub fn raw_table(table: ExtractTable) -> TableDef {
    match table {
        ExtractTable::Videos => raw(
            "videos",
            &[
                col("video_id", String),
                col("channel_id", String),
                col("title", String),
                col("description", String),
                col("published_at", Timestamp),
                col("search_query", String),
                col("search_order", String),
            ],
        ),
        ExtractTable::Channels => raw(
            "channels",
            &[
                col("channel_id", String),
                col("channel_title", String),
                col("channel_description", String),
                col("country", String),
                col("published_at", Timestamp),
                col("subscriber_count", Integer),
                col("video_count", Integer),
                col("view_count", Integer),
            ],
        ),
        ExtractTable::Comments => raw(
            "comments",
            &[
                col("comment_id", String),
                col("video_id", String),
                col("author_display_name", String),
                col("text_display", String),
                col("like_count", Integer),
                col("published_at", Timestamp),
            ],
        ),
        ExtractTable::VideoStats => raw(
            "video_statistics",
            &[
                col("video_id", String),
                col("category_id", String),
                col("tags", String),
                col("duration", String),
                col("view_count", Integer),
                col("like_count", Integer),
                col("comment_count", Integer),
                col("favorite_count", Integer),
                col("collected_at", Timestamp),
            ],
        ),
        ExtractTable::Categories => raw(
            "categories",
            &[
                col("category_id", String),
                col("category_title", String),
                col("assignable", Boolean),
                col("region", String),
            ],
        ),
    }
}

pub const DIM_VIDEOS: &str = "dim_videos";
pub const DIM_CHANNELS: &str = "dim_channels";
pub const DIM_COMMENTS: &str = "dim_comments";
pub const DIM_CATEGORIES: &str = "dim_categories";
pub const FACT_VIDEO_STATISTICS: &str = "fact_video_statistics";
pub const FACT_COMMENTS: &str = "fact_comments";

pub fn dim_videos() -> TableDef {
    TableDef {
        name: DIM_VIDEOS,
        columns: vec![
            col("video_id", String),
            col("title", String),
            col("description", String),
            col("channel_id", String),
            col("published_at", Timestamp),
            col("last_updated", Timestamp),
        ],
        key: &["video_id"],
    }
}

pub fn dim_channels() -> TableDef {
    TableDef {
        name: DIM_CHANNELS,
        columns: vec![
            col("channel_id", String),
            col("channel_title", String),
            col("channel_description", String),
            col("country", String),
            col("subscriber_count", Integer),
            col("video_count", Integer),
            col("last_updated", Timestamp),
        ],
        key: &["channel_id"],
    }
}

pub fn dim_comments() -> TableDef {
    TableDef {
        name: DIM_COMMENTS,
        columns: vec![
            col("comment_id", String),
            col("author_display_name", String),
            col("comment_text", String),
            col("last_updated", Timestamp),
        ],
        key: &["comment_id"],
    }
}

pub fn dim_categories() -> TableDef {
    TableDef {
        name: DIM_CATEGORIES,
        columns: vec![
            col("category_id", String),
            col("category_title", String),
            col("region", String),
            col("last_updated", Timestamp),
        ],
        key: &["category_id"],
    }
}

pub fn fact_video_statistics() -> TableDef {
    TableDef {
        name: FACT_VIDEO_STATISTICS,
        columns: vec![
            col("video_id", String),
            col("channel_id", String),
            col("category_id", String),
            col("duration", String),
            col("date", Date),
            col("view_count", Integer),
            col("like_count", Integer),
            col("comment_count", Integer),
        ],
        key: &["video_id", "date"],
    }
}

pub fn fact_comments() -> TableDef {
    TableDef {
        name: FACT_COMMENTS,
        columns: vec![
            col("comment_id", String),
            col("video_id", String),
            col("like_count", Integer),
            col("published_at", Timestamp),
        ],
        key: &["comment_id"],
    }
}

/// Staging tables in merge order.
pub fn staging_tables() -> Vec<TableDef> {
    vec![
        dim_videos(),
        dim_channels(),
        dim_comments(),
        dim_categories(),
        fact_video_statistics(),
        fact_comments(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_tables_carry_lineage() {
        let tables = raw_tables();
        let names: Vec<_> = tables.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            ["videos", "channels", "comments", "video_statistics", "categories"]
        );
        for table in &tables {
            let cols = table.column_names();
            assert_eq!(&cols[cols.len() - 3..], ["ingest_timestamp", "source_path", "run_id"]);
            assert!(table.key.is_empty());
        }
    }

    #[test]
    fn test_staging_keys_are_columns() {
        for table in staging_tables() {
            assert!(!table.key.is_empty(), "{} has no key", table.name);
            for key in table.key {
                assert!(table.column(key).is_some(), "{}.{} missing", table.name, key);
            }
        }
    }
}
