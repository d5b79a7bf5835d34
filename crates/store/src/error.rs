//! Error types for the store crate.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The object does not exist.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: String },

    /// A concurrent writer won the race, or the object already exists.
    #[error("conflict writing {kind} '{key}': {reason}")]
    Conflict {
        kind: String,
        key: String,
        reason: String,
    },

    /// Transient failure talking to the store.
    #[error("store unavailable during {operation}: {reason}")]
    Unavailable { operation: String, reason: String },

    /// The store rejected the object.
    #[error("invalid {kind} '{key}': {reason}")]
    Invalid {
        kind: String,
        key: String,
        reason: String,
    },

    /// The kind was never registered in the scheme.
    #[error("kind '{kind}' is not registered in the scheme")]
    UnknownKind { kind: String },

    /// Object could not be (de)serialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: impl Into<String>, key: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(kind: impl Into<String>, key: impl ToString, reason: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid object error.
    pub fn invalid(kind: impl Into<String>, key: impl ToString, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind: kind.into(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an unknown kind error.
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Whether this is a not found error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a conflict error.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether retrying the same request later can succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable { .. })
    }
}
