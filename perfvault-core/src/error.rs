//! Error types for perfvault-core

use thiserror::Error;

/// Main error type for the perfvault-core library
#[derive(Error, Debug)]
pub enum Error {
    /// A point lookup matched no row
    #[error("{op}: {what} not found")]
    NotFound { op: &'static str, what: String },

    /// Insert collided with an existing primary key
    #[error("{op}: record {id} already exists")]
    Conflict { op: &'static str, id: String },

    /// Connection-level failure (open, lock, busy, schema creation)
    #[error("{op}: backend unavailable: {reason}")]
    BackendUnavailable { op: &'static str, reason: String },

    /// Input rejected before or by the backend
    #[error("{op}: invalid query: {reason}")]
    InvalidQuery { op: &'static str, reason: String },

    /// Any other backend failure
    #[error("{op} failed{}: {source}", id_suffix(.id))]
    Database {
        op: &'static str,
        id: Option<String>,
        #[source]
        source: rusqlite::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Import document could not be turned into a profile
    #[error("import error: {0}")]
    Import(String),
}

impl Error {
    /// Wrap a rusqlite error with the operation that produced it.
    ///
    /// Primary key collisions become [`Error::Conflict`], lock and open
    /// failures become [`Error::BackendUnavailable`].
    pub fn backend(op: &'static str, id: Option<&str>, source: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        if is_key_collision(&source) {
            return Error::Conflict {
                op,
                id: id.unwrap_or_default().to_string(),
            };
        }

        match source.sqlite_error_code() {
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseCorrupt,
            ) => Error::BackendUnavailable {
                op,
                reason: source.to_string(),
            },
            _ => Error::Database {
                op,
                id: id.map(str::to_string),
                source,
            },
        }
    }

    /// True when the error is a lookup miss rather than a system failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

fn is_key_collision(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;

    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn id_suffix(id: &Option<String>) -> String {
    id.as_deref()
        .map(|id| format!(" for {id}"))
        .unwrap_or_default()
}

/// Result type alias for perfvault-core
pub type Result<T> = std::result::Result<T, Error>;
