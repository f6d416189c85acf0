//! Core error types for dopamine-core.
//!
//! Every fallible operation in the library returns [`CoreError`]. A failure
//! inside a rotation aborts the enclosing transaction, so callers never observe
//! a partially written association set.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for dopamine-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A member or challenge does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness or referential constraint was violated.
    ///
    /// Raised when two writers race on the same member; the whole resolution
    /// should be retried.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl CoreError {
    pub fn member_not_found(id: i64) -> Self {
        CoreError::NotFound {
            entity: "Member",
            id: id.to_string(),
        }
    }

    pub fn challenge_not_found(id: i64) -> Self {
        CoreError::NotFound {
            entity: "Challenge",
            id: id.to_string(),
        }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Conflict(_) | CoreError::Database(DatabaseError::Locked)
        )
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked or busy past the configured timeout
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A required text field was empty
    #[error("'{field}' must not be blank")]
    Blank { field: &'static str },

    /// Unknown proficiency tier
    #[error("Unknown proficiency tier '{0}' (expected LOW, MID or HIGH)")]
    UnknownTier(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Whether `err` is a failed `FOREIGN KEY` check, i.e. a referenced row is missing.
pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

impl From<rusqlite::Error> for CoreError {
    // A missing reference is not a race; retrying cannot fix it.
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            _ if is_foreign_key_violation(&err) => CoreError::Database(DatabaseError::from(err)),
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => CoreError::Database(DatabaseError::from(err)),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
