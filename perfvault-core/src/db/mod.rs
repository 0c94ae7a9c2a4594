//! Profile record store
//!
//! This module provides the storage layer with:
//! - A backend-neutral [`ProfileStore`] trait
//! - A SQLite implementation with caller-named tables
//! - An in-memory implementation for tests and ephemeral runs
//! - Lazy, batched result sequences

pub mod cursor;
pub mod memory;
pub mod repo;
pub mod schema;
pub mod store;

pub use cursor::RecordIter;
pub use memory::MemoryStore;
pub use repo::SqliteStore;
pub use schema::{TableName, Tables};
pub use store::{open_store, ProfileStore};
