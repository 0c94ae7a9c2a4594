//! Database schema and query templates
//!
//! Table names are chosen by the caller, so every statement is rendered once
//! from a validated [`TableName`] when the store is built and reused for the
//! store's lifetime. Nothing is interpolated per call.

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::types::SortDirection;

use super::cursor::Page;

/// Longest accepted table name
pub const MAX_TABLE_NAME_LEN: usize = 64;

/// A table name checked against `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > MAX_TABLE_NAME_LEN {
            return Err(Error::Config(format!("invalid table name: {name:?}")));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted identifier for use in SQL
    fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The pair of tables a store instance owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub profiles: TableName,
    pub watches: TableName,
}

impl Tables {
    pub fn new(profiles: &str, watches: &str) -> Result<Self> {
        let tables = Self {
            profiles: TableName::new(profiles)?,
            watches: TableName::new(watches)?,
        };
        if tables.profiles == tables.watches {
            return Err(Error::Config(format!(
                "profile and watch tables must differ: {profiles}"
            )));
        }
        Ok(tables)
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            profiles: TableName("results".to_string()),
            watches: TableName("watches".to_string()),
        }
    }
}

/// Columns yielded by URL searches: everything except the payload.
const SUMMARY_COLUMNS: &str = r#""id", "url", "SERVER", "GET", "ENV", "simple_url",
    "request_ts", "request_ts_micro", "request_date",
    "main_wt", "main_ct", "main_cpu", "main_mu", "main_pmu""#;

/// Every column of the profile table.
const PROFILE_COLUMNS: &str = r#""id", "profile", "url", "SERVER", "GET", "ENV", "simple_url",
    "request_ts", "request_ts_micro", "request_date",
    "main_wt", "main_ct", "main_cpu", "main_mu", "main_pmu""#;

/// Every statement a store issues, rendered for one pair of tables.
#[derive(Debug, Clone)]
pub struct Queries {
    pub create_profiles: String,
    pub create_watches: String,
    pub latest: String,
    pub get_by_id: String,
    pub count_by_url: String,
    find_by_url_asc: String,
    find_by_url_desc: String,
    find_by_url_after_asc: String,
    find_by_url_after_desc: String,
    pub delete_by_id: String,
    pub delete_all: String,
    pub statistics: String,
    pub insert_profile: String,
    pub insert_watch: String,
    pub update_watch: String,
    pub remove_watch: String,
    pub page_watches: String,
    pub truncate_watches: String,
}

impl Queries {
    pub fn new(tables: &Tables) -> Self {
        let p = tables.profiles.quoted();
        let w = tables.watches.quoted();
        let idx = tables.profiles.as_str();

        let find_by_url = |direction: SortDirection| {
            format!(
                r#"SELECT {SUMMARY_COLUMNS}
                FROM {p}
                WHERE "simple_url" LIKE ?1 ESCAPE '\'
                ORDER BY "request_ts" {dir}, "id" {dir}
                LIMIT ?2 OFFSET ?3"#,
                dir = direction.as_str()
            )
        };
        // Continuation after the last row of the previous batch.
        let find_by_url_after = |direction: SortDirection| {
            let cmp = match direction {
                SortDirection::Asc => ">",
                SortDirection::Desc => "<",
            };
            format!(
                r#"SELECT {SUMMARY_COLUMNS}
                FROM {p}
                WHERE "simple_url" LIKE ?1 ESCAPE '\'
                  AND ("request_ts", "id") {cmp} (?3, ?4)
                ORDER BY "request_ts" {dir}, "id" {dir}
                LIMIT ?2"#,
                dir = direction.as_str()
            )
        };

        Self {
            create_profiles: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {p} (
                    "id"               CHAR(24) PRIMARY KEY,
                    "profile"          TEXT           NOT NULL,
                    "url"              TEXT           NULL,
                    "SERVER"           TEXT           NULL,
                    "GET"              TEXT           NULL,
                    "ENV"              TEXT           NULL,
                    "simple_url"       TEXT           NULL,
                    "request_ts"       INTEGER        NOT NULL,
                    "request_ts_micro" NUMERIC(15, 4) NOT NULL,
                    "request_date"     DATE           NOT NULL,
                    "main_wt"          INTEGER        NOT NULL,
                    "main_ct"          INTEGER        NOT NULL,
                    "main_cpu"         INTEGER        NOT NULL,
                    "main_mu"          INTEGER        NOT NULL,
                    "main_pmu"         INTEGER        NOT NULL
                );
                CREATE INDEX IF NOT EXISTS "{idx}_request_ts" ON {p}("request_ts");
                CREATE INDEX IF NOT EXISTS "{idx}_request_date" ON {p}("request_date");
                "#
            ),
            create_watches: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {w} (
                    "id"      CHAR(24) PRIMARY KEY,
                    "removed" TEXT     NULL,
                    "name"    TEXT     NOT NULL
                );
                "#
            ),
            // Oldest first, despite the name.
            latest: format!(
                r#"SELECT {PROFILE_COLUMNS} FROM {p} ORDER BY "request_date" ASC, "id" ASC LIMIT 1"#
            ),
            get_by_id: format!(r#"SELECT {PROFILE_COLUMNS} FROM {p} WHERE "id" = ?1"#),
            count_by_url: format!(
                r#"SELECT COUNT(*) FROM {p} WHERE "simple_url" LIKE ?1 ESCAPE '\'"#
            ),
            find_by_url_asc: find_by_url(SortDirection::Asc),
            find_by_url_desc: find_by_url(SortDirection::Desc),
            find_by_url_after_asc: find_by_url_after(SortDirection::Asc),
            find_by_url_after_desc: find_by_url_after(SortDirection::Desc),
            delete_by_id: format!(r#"DELETE FROM {p} WHERE "id" = ?1"#),
            delete_all: format!("DELETE FROM {p}"),
            statistics: format!(
                r#"SELECT
                    COUNT(*),
                    MAX("request_ts"),
                    COALESCE(SUM(LENGTH(CAST("profile" AS BLOB))), 0)
                FROM {p}"#
            ),
            insert_profile: format!(
                r#"INSERT INTO {p} ({PROFILE_COLUMNS})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#
            ),
            insert_watch: format!(r#"INSERT INTO {w} ("id", "removed", "name") VALUES (?1, ?2, ?3)"#),
            update_watch: format!(r#"UPDATE {w} SET "removed" = ?2, "name" = ?3 WHERE "id" = ?1"#),
            remove_watch: format!(r#"DELETE FROM {w} WHERE "id" = ?1"#),
            // Resumes after the last rowid seen; callers still get no ordering promise.
            page_watches: format!(
                r#"SELECT rowid, "id", "removed", "name" FROM {w}
                WHERE rowid > ?1 ORDER BY rowid LIMIT ?2"#
            ),
            truncate_watches: format!("DELETE FROM {w}"),
        }
    }

    /// The URL search statement for one batch. The first batch skips by
    /// offset (`?3`); later ones resume after `("request_ts", "id")` (`?3`, `?4`).
    pub fn find_by_url<K>(&self, direction: SortDirection, page: &Page<K>) -> &str {
        match (page, direction) {
            (Page::Skip(_), SortDirection::Asc) => &self.find_by_url_asc,
            (Page::Skip(_), SortDirection::Desc) => &self.find_by_url_desc,
            (Page::After(_), SortDirection::Asc) => &self.find_by_url_after_asc,
            (Page::After(_), SortDirection::Desc) => &self.find_by_url_after_desc,
        }
    }
}

/// Create both tables if they are absent.
///
/// Safe to run on every construction. Any failure here means the store
/// cannot serve requests, so it is reported as [`Error::BackendUnavailable`].
pub fn init_schema(conn: &Connection, queries: &Queries) -> Result<()> {
    let unavailable = |e: rusqlite::Error| Error::BackendUnavailable {
        op: "init_schema",
        reason: e.to_string(),
    };

    conn.execute_batch(&queries.create_profiles)
        .map_err(unavailable)?;
    conn.execute_batch(&queries.create_watches)
        .map_err(unavailable)?;

    Ok(())
}

/// Whether a table exists in the main schema
#[cfg(test)]
pub(crate) fn table_exists(conn: &Connection, table: &TableName) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table.as_str()],
            |r| r.get(0),
        )
        .map_err(|e| Error::backend("table_exists", Some(table.as_str()), e))?;
    Ok(count > 0)
}

/// Escape `%`, `_` and `\` so the value matches literally inside a LIKE
/// pattern, then wrap it for substring search.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let tables = Tables::default();
        let queries = Queries::new(&tables);

        // Run twice - should be idempotent
        init_schema(&conn, &queries).unwrap();
        init_schema(&conn, &queries).unwrap();

        assert!(table_exists(&conn, &tables.profiles).unwrap());
        assert!(table_exists(&conn, &tables.watches).unwrap());
    }

    #[test]
    fn test_custom_table_names() {
        let conn = Connection::open_in_memory().unwrap();
        let tables = Tables::new("app_profiles", "app_watches").unwrap();
        init_schema(&conn, &Queries::new(&tables)).unwrap();

        assert!(table_exists(&conn, &tables.profiles).unwrap());
        assert!(table_exists(&conn, &tables.watches).unwrap());
        assert!(!table_exists(&conn, &TableName::new("results").unwrap()).unwrap());

        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'app_profiles' AND name LIKE 'app_profiles_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 2);
    }

    #[test]
    fn test_table_name_validation() {
        assert!(TableName::new("results").is_ok());
        assert!(TableName::new("_private_2").is_ok());

        for bad in ["", "1results", "res ults", "r\"; DROP TABLE x; --", "résultats"] {
            assert!(TableName::new(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(TableName::new(&"a".repeat(MAX_TABLE_NAME_LEN + 1)).is_err());
        assert!(Tables::new("same", "same").is_err());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(""), "%%");
        assert_eq!(like_pattern("/a_b"), "%/a\\_b%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
    }

    #[test]
    fn test_init_schema_read_only_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ro.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE other (x INTEGER)")
            .unwrap();

        let conn = Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .unwrap();
        let err = init_schema(&conn, &Queries::new(&Tables::default())).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { op: "init_schema", .. }));
    }
}
