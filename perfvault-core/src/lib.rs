//! # perfvault-core
//!
//! Core library for perfvault - a store for request profiling snapshots.
//!
//! This library provides:
//! - Domain types for profiles and watches
//! - The profile record store, with SQLite and in-memory backends
//! - Import of exported profiling documents
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use perfvault_core::{open_store, Config, SortDirection};
//!
//! let config = Config::load().expect("failed to load config");
//! let store = open_store(&config.store).expect("failed to open store");
//!
//! for profile in store.find_by_url("/checkout", SortDirection::Desc, 0, 25).unwrap() {
//!     let profile = profile.unwrap();
//!     println!("{} {}us", profile.id, profile.metrics.wt);
//! }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{open_store, MemoryStore, ProfileStore, RecordIter, SqliteStore, Tables};
pub use error::{Error, Result};
pub use import::ImportDocument;
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod logging;
pub mod types;
