//! Core domain types for perfvault
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Profile** | One recorded performance snapshot of a single instrumented request |
//! | **Watch** | A named rule designating a function for profiling instrumentation |
//! | **Simple URL** | A normalized form of the request URL used for grouping and search |
//! | **Backend** | The system actually persisting the data (SQLite, memory) |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================
// Profiles
// ============================================

/// Summary metrics of the `main()` entry, denormalized from the payload so
/// listings can sort and render without decoding it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetrics {
    /// Wall time in microseconds
    pub wt: i64,
    /// Call count
    pub ct: i64,
    /// CPU time in microseconds
    pub cpu: i64,
    /// Memory usage in bytes
    pub mu: i64,
    /// Peak memory usage in bytes
    pub pmu: i64,
}

/// One profiling snapshot, including the raw payload.
///
/// Records are immutable once saved: there is no update operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// 24-character opaque identifier
    pub id: String,
    /// Serialized call tree, opaque to the store
    pub profile: String,
    /// Full request URL
    pub url: Option<String>,
    /// Serialized server parameters
    pub server: Option<String>,
    /// Serialized query parameters
    pub get: Option<String>,
    /// Serialized environment
    pub env: Option<String>,
    /// Normalized URL used for search and grouping
    pub simple_url: Option<String>,
    /// Request time, epoch seconds
    pub request_ts: i64,
    /// Request time with sub-second precision (four decimal places)
    pub request_ts_micro: f64,
    /// Calendar date of the request
    pub request_date: NaiveDate,
    /// Summary metrics
    pub metrics: ProfileMetrics,
}

impl ProfileRecord {
    /// Drop the payload, keeping the fields shown in listings.
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id.clone(),
            url: self.url.clone(),
            server: self.server.clone(),
            get: self.get.clone(),
            env: self.env.clone(),
            simple_url: self.simple_url.clone(),
            request_ts: self.request_ts,
            request_ts_micro: self.request_ts_micro,
            request_date: self.request_date,
            metrics: self.metrics,
        }
    }

    /// Size of the payload in bytes, as counted by statistics.
    pub fn payload_bytes(&self) -> u64 {
        self.profile.len() as u64
    }
}

/// A profile without its payload, as yielded by URL searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: String,
    pub url: Option<String>,
    pub server: Option<String>,
    pub get: Option<String>,
    pub env: Option<String>,
    pub simple_url: Option<String>,
    pub request_ts: i64,
    pub request_ts_micro: f64,
    pub request_date: NaiveDate,
    pub metrics: ProfileMetrics,
}

/// Ordering of URL search results by request time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(Error::InvalidQuery {
                op: "find_by_url",
                reason: format!("unsupported sort direction: {s}"),
            }),
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Statistics
// ============================================

/// Aggregate figures over the profile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Number of stored profiles
    pub profiles: u64,
    /// Largest `request_ts` across all profiles
    pub latest: i64,
    /// Sum of payload sizes in bytes
    pub bytes: u64,
}

/// Result of a statistics query.
///
/// An empty table is reported as [`StoreStatistics::Empty`] rather than an
/// error so callers can render a "no data" view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreStatistics {
    Empty,
    Populated(Statistics),
}

impl StoreStatistics {
    /// Number of stored profiles (zero when empty)
    pub fn profiles(&self) -> u64 {
        match self {
            StoreStatistics::Empty => 0,
            StoreStatistics::Populated(stats) => stats.profiles,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, StoreStatistics::Empty)
    }
}

// ============================================
// Watches
// ============================================

/// A function name the profiler should pay attention to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watch {
    pub id: String,
    /// Fully qualified function or method name
    pub name: String,
    /// Operator-defined marker for disabled watches
    pub removed: Option<String>,
}

impl Watch {
    /// Create an active watch with a freshly generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: crate::import::generate_id(),
            name: name.into(),
            removed: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.is_some()
    }

    /// Reject watches the store must never persist.
    pub(crate) fn validate(&self, op: &'static str) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidQuery {
                op,
                reason: format!("watch {} has an empty name", self.id),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!("asc".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);

        let err = "sideways".parse::<SortDirection>().unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn test_statistics_empty() {
        assert_eq!(StoreStatistics::Empty.profiles(), 0);
        assert!(StoreStatistics::Empty.is_empty());

        let populated = StoreStatistics::Populated(Statistics {
            profiles: 3,
            latest: 100,
            bytes: 42,
        });
        assert_eq!(populated.profiles(), 3);
        assert!(!populated.is_empty());
    }

    #[test]
    fn test_watch_validation() {
        let watch = Watch::new("strlen");
        assert_eq!(watch.id.len(), 24);
        assert!(!watch.is_removed());
        assert!(watch.validate("save_watch").is_ok());

        let empty = Watch::new("  ");
        assert!(empty.validate("save_watch").is_err());
    }
}
