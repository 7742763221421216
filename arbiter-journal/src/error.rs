//! Error types for the audit journal.

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by journal components.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The provided configuration was invalid.
    #[error("invalid journal configuration: {0}")]
    InvalidConfig(&'static str),
    /// Underlying I/O failure while reading or writing the log file.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// A custom store reported a failure.
    #[error("journal backend error: {reason}")]
    Backend {
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl JournalError {
    /// Helper to construct backend errors from string-like values.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Result type alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;
