//! Shared error definitions for arbiter primitives.

use thiserror::Error;

/// Result alias used throughout the arbiter.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The provided perspective identifier was empty after trimming.
    #[error("invalid perspective id `{id}`: {reason}")]
    InvalidPerspectiveId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: &'static str,
    },
}
