//! Core shared types for perspective arbitration.

#![warn(missing_docs, clippy::pedantic)]

mod conflict;
mod context;
mod error;
mod ids;
mod perspective;

/// Conflict records and the strategies that resolve them.
pub use conflict::{Conflict, ConflictResolution, ConflictType, ResolutionStrategy, Severity};
/// Execution context supplied with every resolution request.
pub use context::{DEFAULT_ENVIRONMENT, ExecutionContext};
/// Error type and result alias shared across the arbiter.
pub use error::{Error, Result};
/// Identifier of a perspective (open vocabulary).
pub use ids::PerspectiveId;
/// Perspective participating in a resolution request.
pub use perspective::Perspective;
