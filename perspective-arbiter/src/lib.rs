//! Perspective conflict resolution facade.
//!
//! Depend on this crate via `cargo add perspective-arbiter`. It bundles the
//! arbiter crates behind feature flags so callers can pull in only the
//! resolver, only the audit journal, or everything.

#![warn(missing_docs, clippy::pedantic)]

/// Shared identifiers, execution context, and conflict records.
pub use arbiter_primitives as primitives;

/// Buffered, rotating audit log (enabled by `journal` feature).
#[cfg(feature = "journal")]
pub use arbiter_journal as journal;

/// Priority matrix, context weighting, negotiation, and the resolver
/// (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use arbiter_policy as policy;

/// Tracing subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use arbiter_telemetry as telemetry;

/// Aggregate configuration and environment overrides (enabled by `config`
/// feature).
#[cfg(feature = "config")]
pub use arbiter_config as config;

#[cfg(feature = "policy")]
pub use arbiter_policy::{ResolvedDecision, Resolver};
pub use arbiter_primitives::{ExecutionContext, Perspective, PerspectiveId, ResolutionStrategy};
