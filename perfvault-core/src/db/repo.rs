//! SQLite-backed profile store
//!
//! Provides the relational implementation of [`ProfileStore`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::cursor::{sql_count, Page, Paged, RecordIter};
use super::schema::{self, like_pattern, Queries, Tables};
use super::store::ProfileStore;
use crate::config::Backend;
use crate::error::{Error, Result};
use crate::types::*;

/// Default number of rows fetched per round trip by lazy sequences
pub const DEFAULT_BATCH_SIZE: u64 = 100;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Profile store over a shared SQLite connection.
///
/// The connection is handed in by the caller and only borrowed through the
/// mutex for the duration of each round trip; the store never closes it.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    tables: Tables,
    queries: Queries,
    batch_size: u64,
}

impl SqliteStore {
    /// Build a store over an existing connection, creating the tables if
    /// needed.
    pub fn new(conn: Arc<Mutex<Connection>>, tables: Tables) -> Result<Self> {
        let queries = Queries::new(&tables);
        let store = Self {
            conn,
            tables,
            queries,
            batch_size: DEFAULT_BATCH_SIZE,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open or create a database at the given path
    pub fn open(path: &Path, tables: Tables, busy_timeout: Duration) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let unavailable = |e: rusqlite::Error| Error::BackendUnavailable {
            op: "open",
            reason: format!("{}: {e}", path.display()),
        };

        let conn = Connection::open(path).map_err(unavailable)?;
        conn.busy_timeout(busy_timeout).map_err(unavailable)?;

        // WAL lets readers proceed while an import is writing
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )
        .map_err(unavailable)?;

        tracing::debug!(path = %path.display(), "Opened profile database");
        Self::new(Arc::new(Mutex::new(conn)), tables)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(tables: Tables) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::BackendUnavailable {
            op: "open",
            reason: e.to_string(),
        })?;
        Self::new(Arc::new(Mutex::new(conn)), tables)
    }

    /// Set how many rows lazy sequences fetch per round trip
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Shared handle to the underlying connection
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn lock(&self, op: &'static str) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::BackendUnavailable {
            op,
            reason: "connection lock poisoned".to_string(),
        })
    }

    fn fetch_summaries(
        &self,
        pattern: &str,
        direction: SortDirection,
        page: &Page<(i64, String)>,
        limit: u64,
    ) -> Result<Vec<ProfileSummary>> {
        const OP: &str = "find_by_url";
        let conn = self.lock(OP)?;
        let mut stmt = conn
            .prepare_cached(self.queries.find_by_url(direction, page))
            .map_err(|e| Error::backend(OP, None, e))?;
        let rows = match page {
            Page::Skip(skip) => stmt.query_map(
                params![pattern, sql_count(limit), sql_count(*skip)],
                Self::row_to_summary,
            ),
            Page::After((request_ts, id)) => stmt.query_map(
                params![pattern, sql_count(limit), request_ts, id],
                Self::row_to_summary,
            ),
        }
        .map_err(|e| Error::backend(OP, None, e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::backend(OP, None, e))
    }

    fn fetch_watches(&self, page: &Page<i64>, limit: u64) -> Result<Vec<(i64, Watch)>> {
        const OP: &str = "all_watches";
        let after = match page {
            Page::After(rowid) => *rowid,
            Page::Skip(_) => i64::MIN,
        };
        let conn = self.lock(OP)?;
        let mut stmt = conn
            .prepare_cached(&self.queries.page_watches)
            .map_err(|e| Error::backend(OP, None, e))?;
        let rows = stmt
            .query_map(params![after, sql_count(limit)], |row| {
                Ok((row.get(0)?, Self::row_to_watch(row)?))
            })
            .map_err(|e| Error::backend(OP, None, e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::backend(OP, None, e))
    }

    fn query_record(&self, op: &'static str, sql: &str, id: Option<&str>) -> Result<ProfileRecord> {
        let conn = self.lock(op)?;
        let mut stmt = conn
            .prepare_cached(sql)
            .map_err(|e| Error::backend(op, id, e))?;
        let record = match id {
            Some(id) => stmt.query_row([id], Self::row_to_record),
            None => stmt.query_row([], Self::row_to_record),
        }
        .optional()
        .map_err(|e| Error::backend(op, id, e))?;

        record.ok_or_else(|| Error::NotFound {
            op,
            what: match id {
                Some(id) => format!("profile {id}"),
                None => "profile".to_string(),
            },
        })
    }

    fn execute(&self, op: &'static str, sql: &str, id: Option<&str>) -> Result<u64> {
        let conn = self.lock(op)?;
        let affected = match id {
            Some(id) => conn.execute(sql, [id]),
            None => conn.execute(sql, []),
        }
        .map_err(|e| Error::backend(op, id, e))?;
        Ok(affected as u64)
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<ProfileRecord> {
        Ok(ProfileRecord {
            id: row.get("id")?,
            profile: row.get("profile")?,
            url: row.get("url")?,
            server: row.get("SERVER")?,
            get: row.get("GET")?,
            env: row.get("ENV")?,
            simple_url: row.get("simple_url")?,
            request_ts: row.get("request_ts")?,
            request_ts_micro: row.get("request_ts_micro")?,
            request_date: Self::get_date(row, "request_date")?,
            metrics: Self::row_to_metrics(row)?,
        })
    }

    fn row_to_summary(row: &Row) -> rusqlite::Result<ProfileSummary> {
        Ok(ProfileSummary {
            id: row.get("id")?,
            url: row.get("url")?,
            server: row.get("SERVER")?,
            get: row.get("GET")?,
            env: row.get("ENV")?,
            simple_url: row.get("simple_url")?,
            request_ts: row.get("request_ts")?,
            request_ts_micro: row.get("request_ts_micro")?,
            request_date: Self::get_date(row, "request_date")?,
            metrics: Self::row_to_metrics(row)?,
        })
    }

    fn row_to_metrics(row: &Row) -> rusqlite::Result<ProfileMetrics> {
        Ok(ProfileMetrics {
            wt: row.get("main_wt")?,
            ct: row.get("main_ct")?,
            cpu: row.get("main_cpu")?,
            mu: row.get("main_mu")?,
            pmu: row.get("main_pmu")?,
        })
    }

    fn row_to_watch(row: &Row) -> rusqlite::Result<Watch> {
        Ok(Watch {
            id: row.get("id")?,
            removed: row.get("removed")?,
            name: row.get("name")?,
        })
    }

    fn get_date(row: &Row, column: &str) -> rusqlite::Result<NaiveDate> {
        let idx = row.as_ref().column_index(column)?;
        let text: String = row.get(idx)?;
        NaiveDate::parse_from_str(&text, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }
}

impl ProfileStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock("init_schema")?;
        schema::init_schema(&conn, &self.queries)?;
        tracing::info!(
            profiles = %self.tables.profiles,
            watches = %self.tables.watches,
            "Schema ready"
        );
        Ok(())
    }

    fn latest(&self) -> Result<ProfileRecord> {
        self.query_record("latest", &self.queries.latest, None)
    }

    fn get_by_id(&self, id: &str) -> Result<ProfileRecord> {
        tracing::debug!(id, "Fetching profile");
        self.query_record("get_by_id", &self.queries.get_by_id, Some(id))
    }

    fn count_by_url(&self, url: &str) -> Result<u64> {
        const OP: &str = "count_by_url";
        let conn = self.lock(OP)?;
        let count: i64 = conn
            .prepare_cached(&self.queries.count_by_url)
            .and_then(|mut stmt| stmt.query_row([like_pattern(url)], |r| r.get(0)))
            .map_err(|e| Error::backend(OP, None, e))?;
        Ok(count as u64)
    }

    fn find_by_url(
        &self,
        url: &str,
        direction: SortDirection,
        skip: u64,
        per_page: u64,
    ) -> Result<RecordIter<'_, ProfileSummary>> {
        tracing::debug!(url, %direction, skip, per_page, "Searching profiles");
        let pattern = like_pattern(url);
        Ok(Box::new(Paged::new(
            move |page: &Page<(i64, String)>, limit| {
                self.fetch_summaries(&pattern, direction, page, limit)
            },
            |row: &ProfileSummary| (row.request_ts, row.id.clone()),
            skip,
            per_page,
            self.batch_size,
        )))
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        let removed = self.execute("delete_by_id", &self.queries.delete_by_id, Some(id))?;
        tracing::debug!(id, removed, "Deleted profile");
        Ok(())
    }

    fn delete_all(&self) -> Result<u64> {
        let removed = self.execute("delete_all", &self.queries.delete_all, None)?;
        tracing::info!(removed, "Deleted all profiles");
        Ok(removed)
    }

    fn statistics(&self) -> Result<StoreStatistics> {
        const OP: &str = "statistics";
        let conn = self.lock(OP)?;
        let (profiles, latest, bytes): (i64, Option<i64>, i64) = conn
            .query_row(&self.queries.statistics, [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .map_err(|e| Error::backend(OP, None, e))?;

        Ok(match latest {
            Some(latest) if profiles > 0 => StoreStatistics::Populated(Statistics {
                profiles: profiles as u64,
                latest,
                bytes: bytes as u64,
            }),
            _ => StoreStatistics::Empty,
        })
    }

    fn save_profile(&self, record: &ProfileRecord) -> Result<()> {
        const OP: &str = "save_profile";
        let conn = self.lock(OP)?;
        let mut stmt = conn
            .prepare_cached(&self.queries.insert_profile)
            .map_err(|e| Error::backend(OP, Some(record.id.as_str()), e))?;
        stmt.execute(params![
            record.id,
            record.profile,
            record.url,
            record.server,
            record.get,
            record.env,
            record.simple_url,
            record.request_ts,
            record.request_ts_micro,
            record.request_date.format(DATE_FORMAT).to_string(),
            record.metrics.wt,
            record.metrics.ct,
            record.metrics.cpu,
            record.metrics.mu,
            record.metrics.pmu,
        ])
        .map_err(|e| {
            let err = Error::backend(OP, Some(record.id.as_str()), e);
            if matches!(err, Error::Conflict { .. }) {
                tracing::warn!(id = %record.id, "Profile id already stored");
            }
            err
        })?;

        tracing::debug!(id = %record.id, "Saved profile");
        Ok(())
    }

    fn save_watch(&self, watch: &Watch) -> Result<()> {
        const OP: &str = "save_watch";
        watch.validate(OP)?;
        let conn = self.lock(OP)?;
        conn.execute(
            &self.queries.insert_watch,
            params![watch.id, watch.removed, watch.name],
        )
        .map_err(|e| Error::backend(OP, Some(watch.id.as_str()), e))?;
        tracing::debug!(id = %watch.id, name = %watch.name, "Saved watch");
        Ok(())
    }

    fn update_watch(&self, watch: &Watch) -> Result<u64> {
        const OP: &str = "update_watch";
        watch.validate(OP)?;
        let conn = self.lock(OP)?;
        let affected = conn
            .execute(
                &self.queries.update_watch,
                params![watch.id, watch.removed, watch.name],
            )
            .map_err(|e| Error::backend(OP, Some(watch.id.as_str()), e))?;
        tracing::debug!(id = %watch.id, affected, "Updated watch");
        Ok(affected as u64)
    }

    fn remove_watch(&self, id: &str) -> Result<()> {
        self.execute("remove_watch", &self.queries.remove_watch, Some(id))?;
        Ok(())
    }

    fn all_watches(&self) -> Result<RecordIter<'_, Watch>> {
        let watches = Paged::new(
            move |page: &Page<i64>, limit| self.fetch_watches(page, limit),
            |(rowid, _): &(i64, Watch)| *rowid,
            0,
            u64::MAX,
            self.batch_size,
        );
        Ok(Box::new(watches.map(|row| row.map(|(_, watch)| watch))))
    }

    fn truncate_watches(&self) -> Result<u64> {
        let removed = self.execute("truncate_watches", &self.queries.truncate_watches, None)?;
        tracing::info!(removed, "Removed all watches");
        Ok(removed)
    }
}
