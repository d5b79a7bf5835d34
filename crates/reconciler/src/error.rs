//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The store failed; conflicts and outages are retryable.
    #[error("store error: {0}")]
    Store(#[from] webgame_store::Error),

    /// The record can never converge as written.
    #[error("invariant violated for '{key}': {reason}")]
    InvariantViolation { key: String, reason: String },

    /// The record changed in a way the controller does not support.
    #[error("unsupported transition for '{key}': {reason}")]
    UnsupportedTransition { key: String, reason: String },

    /// Serialization failed.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an invariant violation error.
    pub fn invariant(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported transition error.
    pub fn unsupported_transition(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::UnsupportedTransition {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the same pass can succeed later without the record changing.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::InvariantViolation { .. }
            | Self::UnsupportedTransition { .. }
            | Self::Serialization { .. }
            | Self::InvalidConfig { .. } => false,
        }
    }

    /// Whether a concurrent writer caused this error.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invariant("games/sample", "gameType is empty");
        assert!(err.to_string().contains("games/sample"));
        assert!(err.to_string().contains("gameType is empty"));
    }

    #[test]
    fn test_retry_policy() {
        let conflict = Error::from(webgame_store::Error::conflict("Deployment", "a/b", "race"));
        assert!(conflict.is_retryable());
        assert!(conflict.is_conflict());

        let outage = Error::from(webgame_store::Error::unavailable("get", "timeout"));
        assert!(outage.is_retryable());
        assert!(!outage.is_conflict());

        assert!(!Error::invariant("a/b", "bad port").is_retryable());
        assert!(!Error::unsupported_transition("a/b", "gameType changed").is_retryable());
    }
}
