//! Process-local profile store
//!
//! Keeps everything in memory behind a mutex. Useful for tests and for
//! throwaway runs where nothing should touch disk. Search results are
//! snapshotted when the sequence is created.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::cursor::RecordIter;
use super::store::ProfileStore;
use crate::config::Backend;
use crate::error::{Error, Result};
use crate::types::*;

#[derive(Default)]
struct MemoryTables {
    profiles: HashMap<String, ProfileRecord>,
    watches: Vec<Watch>,
}

/// In-memory implementation of [`ProfileStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, op: &'static str) -> Result<MutexGuard<'_, MemoryTables>> {
        self.tables.lock().map_err(|_| Error::BackendUnavailable {
            op,
            reason: "store lock poisoned".to_string(),
        })
    }

    fn matching<'a>(
        tables: &'a MemoryTables,
        url: &'a str,
    ) -> impl Iterator<Item = &'a ProfileRecord> + 'a {
        tables
            .profiles
            .values()
            .filter(move |p| p.simple_url.as_deref().is_some_and(|s| contains_ignore_case(s, url)))
    }
}

/// Substring match with ASCII case folding, mirroring SQLite's LIKE.
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

impl ProfileStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn init_schema(&self) -> Result<()> {
        self.lock("init_schema").map(|_| ())
    }

    fn latest(&self) -> Result<ProfileRecord> {
        let tables = self.lock("latest")?;
        tables
            .profiles
            .values()
            .min_by(|a, b| a.request_date.cmp(&b.request_date).then_with(|| a.id.cmp(&b.id)))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                op: "latest",
                what: "profile".to_string(),
            })
    }

    fn get_by_id(&self, id: &str) -> Result<ProfileRecord> {
        let tables = self.lock("get_by_id")?;
        tables
            .profiles
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                op: "get_by_id",
                what: format!("profile {id}"),
            })
    }

    fn count_by_url(&self, url: &str) -> Result<u64> {
        let tables = self.lock("count_by_url")?;
        Ok(Self::matching(&tables, url).count() as u64)
    }

    fn find_by_url(
        &self,
        url: &str,
        direction: SortDirection,
        skip: u64,
        per_page: u64,
    ) -> Result<RecordIter<'_, ProfileSummary>> {
        let tables = self.lock("find_by_url")?;
        let mut rows: Vec<&ProfileRecord> = Self::matching(&tables, url).collect();
        rows.sort_by(|a, b| {
            let order = a
                .request_ts
                .cmp(&b.request_ts)
                .then_with(|| a.id.cmp(&b.id));
            match direction {
                SortDirection::Asc => order,
                SortDirection::Desc => order.reverse(),
            }
        });

        let page: Vec<Result<ProfileSummary>> = rows
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .map(|p| Ok(p.summary()))
            .collect();
        Ok(Box::new(page.into_iter()))
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        self.lock("delete_by_id")?.profiles.remove(id);
        Ok(())
    }

    fn delete_all(&self) -> Result<u64> {
        let mut tables = self.lock("delete_all")?;
        let removed = tables.profiles.len() as u64;
        tables.profiles.clear();
        tracing::info!(removed, "Deleted all profiles");
        Ok(removed)
    }

    fn statistics(&self) -> Result<StoreStatistics> {
        let tables = self.lock("statistics")?;
        let latest = tables.profiles.values().map(|p| p.request_ts).max();

        Ok(match latest {
            None => StoreStatistics::Empty,
            Some(latest) => StoreStatistics::Populated(Statistics {
                profiles: tables.profiles.len() as u64,
                latest,
                bytes: tables.profiles.values().map(ProfileRecord::payload_bytes).sum(),
            }),
        })
    }

    fn save_profile(&self, record: &ProfileRecord) -> Result<()> {
        let mut tables = self.lock("save_profile")?;
        if tables.profiles.contains_key(&record.id) {
            tracing::warn!(id = %record.id, "Profile id already stored");
            return Err(Error::Conflict {
                op: "save_profile",
                id: record.id.clone(),
            });
        }
        tables.profiles.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn save_watch(&self, watch: &Watch) -> Result<()> {
        const OP: &str = "save_watch";
        watch.validate(OP)?;
        let mut tables = self.lock(OP)?;
        if tables.watches.iter().any(|w| w.id == watch.id) {
            return Err(Error::Conflict {
                op: OP,
                id: watch.id.clone(),
            });
        }
        tables.watches.push(watch.clone());
        Ok(())
    }

    fn update_watch(&self, watch: &Watch) -> Result<u64> {
        const OP: &str = "update_watch";
        watch.validate(OP)?;
        let mut tables = self.lock(OP)?;
        match tables.watches.iter_mut().find(|w| w.id == watch.id) {
            Some(existing) => {
                existing.name = watch.name.clone();
                existing.removed = watch.removed.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn remove_watch(&self, id: &str) -> Result<()> {
        self.lock("remove_watch")?.watches.retain(|w| w.id != id);
        Ok(())
    }

    fn all_watches(&self) -> Result<RecordIter<'_, Watch>> {
        let watches: Vec<Result<Watch>> = self
            .lock("all_watches")?
            .watches
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::new(watches.into_iter()))
    }

    fn truncate_watches(&self) -> Result<u64> {
        let mut tables = self.lock("truncate_watches")?;
        let removed = tables.watches.len() as u64;
        tables.watches.clear();
        Ok(removed)
    }
}
