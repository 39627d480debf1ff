//! Core error types for schedua-core.
//!
//! This module defines the error hierarchy used across the library with
//! thiserror. Per-series rule failures are non-fatal (the resolver logs and
//! skips the series); repository write failures surface to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for schedua-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Recurrence rule parse/expansion errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// A specific series carries a rule that fails to parse or expand
    #[error("Invalid rule for series {series_id}: {reason}")]
    InvalidRule { series_id: i64, reason: String },

    /// Validation errors on upsert
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced id absent at read time
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Delete refused because other records still reference the entity
    #[error("{entity} {id} is referenced by {refs} record(s)")]
    InUse {
        entity: &'static str,
        id: i64,
        refs: usize,
    },

    /// Rename/delete refused on a system-owned record
    #[error("{entity} is a system record and cannot be modified")]
    SystemImmutable { entity: String },

    /// Sink write errors (surfaced by the scheduler retry policy)
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
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

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Recurrence rule errors.
///
/// Unknown keys are not errors (they are ignored); these cover malformed
/// tokens and out-of-range values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Token is not `KEY=VALUE` (or `DTSTART:<timestamp>`)
    #[error("malformed token '{0}'")]
    MalformedToken(String),

    /// Value out of range or unparsable for a recognised key
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    /// Timestamp not in `YYYYMMDDTHHMMSS` form
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// Duration not in `PT[<n>H][<n>M]` form
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be greater than start ({start})")]
    InvalidTimeRange {
        start: chrono::NaiveDateTime,
        end: chrono::NaiveDateTime,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Sink write errors.
///
/// `Transient` feeds the scheduler retry policy; `Fatal` terminates retries
/// for the occurrence. A per-call timeout counts as transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Recoverable write failure (connection refused, timeout, busy node)
    #[error("transient sink failure: {0}")]
    Transient(String),

    /// Unrecoverable write failure (bad node id, rejected data type)
    #[error("fatal sink failure: {0}")]
    Fatal(String),
}

impl SinkError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::Fatal(_))
    }
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
