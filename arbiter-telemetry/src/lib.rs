//! Observability utilities for the arbiter.
//!
//! Everything logs through `tracing`; this crate only installs the global
//! subscriber from a [`TelemetryConfig`].

#![warn(missing_docs, clippy::pedantic)]

pub mod tracing_support;

pub use tracing_support::{
    LogFormat, TelemetryConfig, TelemetryError, TelemetryResult, init_tracing,
};
