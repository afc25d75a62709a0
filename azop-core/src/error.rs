//! Error types and the retry classification the engine acts on.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Version;

/// Propagation class of a failure.
///
/// The engine decides between requeue and terminal failure from this class
/// alone, never from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Timeout, rate limit, conflict or temporary backend outage.
    Transient,
    /// The spec can never succeed as written.
    Configuration,
    /// Access denied by the backend.
    Permission,
    /// Anything unexpected. Retried like `Transient` up to a limit.
    Unknown,
}

impl ErrorKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, ErrorKind::Configuration | ErrorKind::Permission)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Permission => "permission",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Error returned by a manager implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ManagerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ManagerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }
}

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflict with existing record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Version mismatch (optimistic concurrency control).
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: Version, actual: Version },

    /// Store temporarily unreachable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from the status tracker, already classified for the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusError {
    /// Someone else wrote the record since it was read.
    #[error("status write conflict: {0}")]
    Conflict(String),

    /// The record disappeared from the store.
    #[error("record is gone")]
    Gone,

    #[error("status write failed: {0}")]
    Transient(String),

    #[error("status write cancelled")]
    Cancelled,
}

impl From<StoreError> for StatusError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionMismatch { .. } | StoreError::Conflict(_) => {
                StatusError::Conflict(e.to_string())
            }
            StoreError::NotFound(_) => StatusError::Gone,
            StoreError::Unavailable(_) | StoreError::Internal(_) => {
                StatusError::Transient(e.to_string())
            }
        }
    }
}
