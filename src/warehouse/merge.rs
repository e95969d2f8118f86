//! Idempotent upserts of a source query into a keyed table.

use super::dialect::Dialect;
use super::tables::TableDef;

/// One upsert: `source` selects exactly the target's columns, in order, at
/// most one row per key.
#[derive(Debug, Clone)]
pub struct MergeSpec {
    pub target: TableDef,
    pub source: String,
}

impl MergeSpec {
    pub fn new(target: TableDef, source: impl Into<String>) -> Self {
        Self {
            target,
            source: source.into(),
        }
    }

    /// Render the upsert as a single script for `dialect`.
    pub fn render(&self, dialect: &Dialect, dataset: &str) -> String {
        match dialect {
            Dialect::BigQuery { .. } => self.render_merge(dialect, dataset),
            Dialect::DuckDb => self.render_delete_insert(dialect, dataset),
        }
    }

    fn column_list(&self, dialect: &Dialect, prefix: &str) -> String {
        self.target
            .columns
            .iter()
            .map(|c| format!("{}{}", prefix, dialect.ident(c.name)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_merge(&self, dialect: &Dialect, dataset: &str) -> String {
        let on = self
            .target
            .key
            .iter()
            .map(|k| format!("T.{0} = S.{0}", dialect.ident(k)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let set = self
            .target
            .columns
            .iter()
            .filter(|c| !self.target.key.contains(&c.name))
            .map(|c| format!("{0} = S.{0}", dialect.ident(c.name)))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "MERGE {target} AS T\nUSING (\n{source}\n) AS S\nON {on}\n\
             WHEN MATCHED THEN UPDATE SET {set}\n\
             WHEN NOT MATCHED THEN INSERT ({cols}) VALUES ({values})",
            target = dialect.table_ref(dataset, self.target.name),
            source = self.source,
            on = on,
            set = set,
            cols = self.column_list(dialect, ""),
            values = self.column_list(dialect, "S."),
        )
    }

    /// DuckDB has no MERGE; delete matching rows and insert the staged source
    /// inside one transaction.
    fn render_delete_insert(&self, dialect: &Dialect, dataset: &str) -> String {
        let target = dialect.table_ref(dataset, self.target.name);
        let temp = dialect.ident(&format!("__merge_{}", self.target.name));
        let matches = self
            .target
            .key
            .iter()
            .map(|k| {
                let qk = dialect.ident(k);
                format!("{}.{} = {}.{}", target, qk, temp, qk)
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        let cols = self.column_list(dialect, "");

        format!(
            "BEGIN TRANSACTION;\n\
             CREATE OR REPLACE TEMP TABLE {temp} AS\n{source};\n\
             DELETE FROM {target} WHERE EXISTS (SELECT 1 FROM {temp} WHERE {matches});\n\
             INSERT INTO {target} ({cols}) SELECT {cols} FROM {temp};\n\
             DROP TABLE {temp};\n\
             COMMIT;",
            temp = temp,
            source = self.source,
            target = target,
            matches = matches,
            cols = cols,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::tables;

    fn spec() -> MergeSpec {
        MergeSpec::new(
            tables::dim_comments(),
            "SELECT comment_id, author_display_name, text_display, now() FROM src",
        )
    }

    #[test]
    fn test_bigquery_merge() {
        let dialect = Dialect::BigQuery {
            project: "p".into(),
            location: "US".into(),
        };
        let sql = spec().render(&dialect, "youtube_staging");
        assert!(sql.starts_with("MERGE `p.youtube_staging.dim_comments` AS T"));
        assert!(sql.contains("ON T.`comment_id` = S.`comment_id`"));
        assert!(sql.contains(
            "UPDATE SET `author_display_name` = S.`author_display_name`, \
             `comment_text` = S.`comment_text`, `last_updated` = S.`last_updated`"
        ));
        assert!(!sql.contains("SET `comment_id`"));
        assert!(sql.ends_with(
            "VALUES (S.`comment_id`, S.`author_display_name`, S.`comment_text`, S.`last_updated`)"
        ));
    }

    #[test]
    fn test_duckdb_delete_insert() {
        let spec = MergeSpec::new(tables::fact_video_statistics(), "SELECT 1");
        let sql = spec.render(&Dialect::DuckDb, "youtube_staging");
        assert!(sql.starts_with("BEGIN TRANSACTION;"));
        assert!(sql.contains(
            "\"youtube_staging\".\"fact_video_statistics\".\"video_id\" = \
             \"__merge_fact_video_statistics\".\"video_id\" AND \
             \"youtube_staging\".\"fact_video_statistics\".\"date\" = \
             \"__merge_fact_video_statistics\".\"date\""
        ));
        assert!(sql.trim_end().ends_with("COMMIT;"));
    }
}
