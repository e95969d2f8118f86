//! SQL rendering differences between BigQuery and DuckDB.

use chrono::{DateTime, NaiveDate, Utc};

use super::tables::{ColumnType, TableDef};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialect {
    DuckDb,
    BigQuery { project: String, location: String },
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::DuckDb => "duckdb",
            Dialect::BigQuery { .. } => "bigquery",
        }
    }

    pub fn ident(&self, name: &str) -> String {
        match self {
            Dialect::DuckDb => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::BigQuery { .. } => format!("`{}`", name.replace('`', "")),
        }
    }

    /// Dataset (BigQuery) or schema (DuckDB) reference.
    pub fn dataset_ref(&self, dataset: &str) -> String {
        match self {
            Dialect::DuckDb => self.ident(dataset),
            Dialect::BigQuery { project, .. } => format!("`{}.{}`", project, dataset),
        }
    }

    pub fn table_ref(&self, dataset: &str, table: &str) -> String {
        match self {
            Dialect::DuckDb => format!("{}.{}", self.ident(dataset), self.ident(table)),
            Dialect::BigQuery { project, .. } => format!("`{}.{}.{}`", project, dataset, table),
        }
    }

    /// Human-readable fully qualified name, reported back to callers.
    pub fn table_fqdn(&self, dataset: &str, table: &str) -> String {
        match self {
            Dialect::DuckDb => format!("{}.{}", dataset, table),
            Dialect::BigQuery { project, .. } => format!("{}.{}.{}", project, dataset, table),
        }
    }

    pub fn type_name(&self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (Dialect::BigQuery { .. }, ColumnType::String) => "STRING",
            (Dialect::BigQuery { .. }, ColumnType::Integer) => "INT64",
            (Dialect::BigQuery { .. }, ColumnType::Float) => "FLOAT64",
            (Dialect::BigQuery { .. }, ColumnType::Boolean) => "BOOL",
            (Dialect::DuckDb, ColumnType::String) => "VARCHAR",
            (Dialect::DuckDb, ColumnType::Integer) => "BIGINT",
            (Dialect::DuckDb, ColumnType::Float) => "DOUBLE",
            (Dialect::DuckDb, ColumnType::Boolean) => "BOOLEAN",
            (_, ColumnType::Timestamp) => "TIMESTAMP",
            (_, ColumnType::Date) => "DATE",
        }
    }

    pub fn create_schema(&self, dataset: &str) -> String {
        match self {
            Dialect::DuckDb => format!("CREATE SCHEMA IF NOT EXISTS {}", self.dataset_ref(dataset)),
            Dialect::BigQuery { location, .. } => format!(
                "CREATE SCHEMA IF NOT EXISTS {} OPTIONS(location = '{}')",
                self.dataset_ref(dataset),
                location.replace('\'', "")
            ),
        }
    }

    pub fn create_table(&self, dataset: &str, table: &TableDef) -> String {
        let columns = table
            .columns
            .iter()
            .map(|c| format!("{} {}", self.ident(c.name), self.type_name(c.ty)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table_ref(dataset, table.name),
            columns
        )
    }

    pub fn drop_table(&self, dataset: &str, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table_ref(dataset, table))
    }

    pub fn count_rows(&self, dataset: &str, table: &str) -> String {
        format!("SELECT COUNT(*) AS row_count FROM {}", self.table_ref(dataset, table))
    }

    /// First capture group of `pattern` in `expr`, NULL when absent.
    pub fn regexp_extract(&self, expr: &str, pattern: &str) -> String {
        match self {
            Dialect::DuckDb => format!(
                "NULLIF(regexp_extract({}, '{}', 1), '')",
                expr,
                pattern.replace('\'', "''")
            ),
            Dialect::BigQuery { .. } => format!(
                "REGEXP_EXTRACT({}, r'{}')",
                expr,
                pattern.replace('\'', "")
            ),
        }
    }

    pub fn timestamp_literal(&self, ts: DateTime<Utc>) -> String {
        format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f"))
    }

    pub fn date_literal(&self, date: NaiveDate) -> String {
        format!("DATE '{}'", date.format("%Y-%m-%d"))
    }
}

/// Dataset names come from configuration; keep them to plain identifiers.
pub fn validate_dataset(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid && name.len() <= 1024 {
        Ok(())
    } else {
        Err(PipelineError::Config(format!("Invalid dataset name '{}'", name)))
    }
}

/// Project ids allow lowercase letters, digits and hyphens (and a `domain:` prefix).
pub fn validate_project(project: &str) -> Result<()> {
    let valid = !project.is_empty()
        && project
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ':' | '_'));
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Config(format!("Invalid project id '{}'", project)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::tables;

    fn bq() -> Dialect {
        Dialect::BigQuery {
            project: "proj".into(),
            location: "US".into(),
        }
    }

    #[test]
    fn test_table_refs() {
        assert_eq!(Dialect::DuckDb.table_ref("youtube_raw", "videos"), "\"youtube_raw\".\"videos\"");
        assert_eq!(bq().table_ref("youtube_raw", "videos"), "`proj.youtube_raw.videos`");
        assert_eq!(bq().table_fqdn("youtube_raw", "videos"), "proj.youtube_raw.videos");
    }

    #[test]
    fn test_create_table() {
        let sql = Dialect::DuckDb.create_table("youtube_raw", &tables::raw_table(crate::models::ExtractTable::Categories));
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"youtube_raw\".\"categories\" (\"category_id\" VARCHAR, \
             \"category_title\" VARCHAR, \"assignable\" BOOLEAN, \"region\" VARCHAR, \
             \"ingest_timestamp\" TIMESTAMP, \"source_path\" VARCHAR, \"run_id\" VARCHAR)"
        );
        let sql = bq().create_table("youtube_staging", &tables::fact_comments());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `proj.youtube_staging.fact_comments`"));
        assert!(sql.contains("`like_count` INT64"));
    }

    #[test]
    fn test_create_schema_location() {
        assert_eq!(
            bq().create_schema("youtube_raw"),
            "CREATE SCHEMA IF NOT EXISTS `proj.youtube_raw` OPTIONS(location = 'US')"
        );
    }

    #[test]
    fn test_regexp_extract() {
        assert_eq!(
            bq().regexp_extract("s.duration", r"(\d+)M"),
            r"REGEXP_EXTRACT(s.duration, r'(\d+)M')"
        );
        assert_eq!(
            Dialect::DuckDb.regexp_extract("s.duration", r"(\d+)M"),
            r"NULLIF(regexp_extract(s.duration, '(\d+)M', 1), '')"
        );
    }

    #[test]
    fn test_validate_names() {
        assert!(validate_dataset("youtube_raw").is_ok());
        assert!(validate_dataset("raw; DROP TABLE x").is_err());
        assert!(validate_dataset("1abc").is_err());
        assert!(validate_project("my-project-123").is_ok());
        assert!(validate_project("bad`proj").is_err());
    }
}
