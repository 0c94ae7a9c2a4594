//! The backend-neutral store interface
//!
//! Callers depend on [`ProfileStore`] only; [`open_store`] picks the
//! implementation named in the configuration.

use std::time::Duration;

use super::cursor::RecordIter;
use super::memory::MemoryStore;
use super::repo::SqliteStore;
use super::schema::Tables;
use crate::config::{Backend, StoreConfig};
use crate::error::Result;
use crate::types::*;

/// Persistence for profile and watch records.
///
/// Every method is a single synchronous round trip with no retries. Lazy
/// sequences returned by [`find_by_url`](ProfileStore::find_by_url) and
/// [`all_watches`](ProfileStore::all_watches) borrow the store and fetch rows
/// as they are consumed.
pub trait ProfileStore: Send + Sync {
    /// Which implementation this is
    fn backend(&self) -> Backend;

    /// Create the backing tables if absent. Idempotent; implementations
    /// call it during construction.
    fn init_schema(&self) -> Result<()>;

    /// The record with the earliest `request_date`.
    ///
    /// Ordering is ascending, i.e. the oldest record, which does not match
    /// what the name suggests. Existing callers rely on it, so it stays.
    fn latest(&self) -> Result<ProfileRecord>;

    /// Full record including payload, or [`Error::NotFound`](crate::Error::NotFound).
    fn get_by_id(&self, id: &str) -> Result<ProfileRecord>;

    /// Number of records whose simple URL contains `url`.
    fn count_by_url(&self, url: &str) -> Result<u64>;

    /// Records whose simple URL contains `url`, ordered by request time,
    /// skipping `skip` rows and yielding at most `per_page`.
    fn find_by_url(
        &self,
        url: &str,
        direction: SortDirection,
        skip: u64,
        per_page: u64,
    ) -> Result<RecordIter<'_, ProfileSummary>>;

    /// Remove one record; absent ids are ignored.
    fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Remove every profile, returning how many were removed.
    fn delete_all(&self) -> Result<u64>;

    fn statistics(&self) -> Result<StoreStatistics>;

    /// Insert a new record; a duplicate id fails with [`Error::Conflict`](crate::Error::Conflict).
    fn save_profile(&self, record: &ProfileRecord) -> Result<()>;

    fn save_watch(&self, watch: &Watch) -> Result<()>;

    /// Overwrite `name` and `removed` of the watch with the same id.
    /// Returns the number of rows touched, zero when the id is unknown.
    fn update_watch(&self, watch: &Watch) -> Result<u64>;

    fn remove_watch(&self, id: &str) -> Result<()>;

    /// Every watch in backend scan order.
    fn all_watches(&self) -> Result<RecordIter<'_, Watch>>;

    /// Remove every watch, returning how many were removed.
    fn truncate_watches(&self) -> Result<u64>;
}

/// Build the store described by `config`.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn ProfileStore>> {
    config.validate()?;
    let tables = Tables::new(&config.profiles_table, &config.watches_table)?;

    let store: Box<dyn ProfileStore> = match config.backend {
        Backend::Sqlite => {
            let path = config.database_path();
            tracing::info!(path = %path.display(), "Opening SQLite profile store");
            Box::new(
                SqliteStore::open(
                    &path,
                    tables,
                    Duration::from_millis(config.busy_timeout_ms),
                )?
                .with_batch_size(config.batch_size as u64),
            )
        }
        Backend::Memory => {
            tracing::info!("Using in-memory profile store");
            Box::new(MemoryStore::new())
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_store_selects_backend() {
        let config = StoreConfig {
            backend: Backend::Memory,
            ..Default::default()
        };
        assert_eq!(open_store(&config).unwrap().backend(), Backend::Memory);

        let dir = tempfile::TempDir::new().unwrap();
        let config = StoreConfig {
            backend: Backend::Sqlite,
            path: Some(dir.path().join("profiles.db")),
            ..Default::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.backend(), Backend::Sqlite);
        assert!(store.statistics().unwrap().is_empty());
    }

    #[test]
    fn test_open_store_rejects_bad_tables() {
        let config = StoreConfig {
            backend: Backend::Memory,
            profiles_table: "bad name".to_string(),
            ..Default::default()
        };
        assert!(open_store(&config).is_err());
    }
}
