//! Configuration for the perspective arbiter.
//!
//! [`ArbiterConfig`] gathers the resolver, journal, and telemetry sections.
//! Every field has a default, so a partial document deserializes cleanly, and
//! `ARBITER_*` environment variables are layered on top by
//! [`ArbiterConfig::from_env`].

#![warn(missing_docs, clippy::pedantic)]

use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use arbiter_journal::logger::DEFAULT_LOG_PATH;
use arbiter_journal::{JournalError, LoggerConfig};
use arbiter_policy::{ResolveError, ResolverConfig};
use arbiter_telemetry::{LogFormat, TelemetryConfig, TelemetryError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Log file location.
pub const ENV_LOG_PATH: &str = "ARBITER_LOG_PATH";
/// Buffered entry count that triggers a flush.
pub const ENV_FLUSH_THRESHOLD: &str = "ARBITER_FLUSH_THRESHOLD";
/// Flush timer period in seconds; `0` disables the timer.
pub const ENV_FLUSH_INTERVAL_SECS: &str = "ARBITER_FLUSH_INTERVAL_SECS";
/// Serialized size cap of the log in bytes.
pub const ENV_MAX_LOG_BYTES: &str = "ARBITER_MAX_LOG_BYTES";
/// Entries kept after rotation.
pub const ENV_RETAIN_ENTRIES: &str = "ARBITER_RETAIN_ENTRIES";
/// Base-priority spread above which priority ordering wins.
pub const ENV_SPREAD_THRESHOLD: &str = "ARBITER_SPREAD_THRESHOLD";
/// `EnvFilter` directive.
pub const ENV_LOG_FILTER: &str = "ARBITER_LOG_FILTER";
/// `compact` or `pretty`.
pub const ENV_LOG_FORMAT: &str = "ARBITER_LOG_FORMAT";

/// Errors raised while assembling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment override could not be parsed.
    #[error("invalid value `{value}` for {key}")]
    InvalidOverride {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// The resolver section failed validation.
    #[error(transparent)]
    Resolver(#[from] ResolveError),
    /// The journal section failed validation.
    #[error(transparent)]
    Journal(#[from] JournalError),
    /// The telemetry section failed validation.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Serializable form of [`LoggerConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalSection {
    /// Log file location.
    pub path: PathBuf,
    /// Buffered entry count that triggers a flush.
    pub flush_threshold: usize,
    /// Timer period in seconds; `0` disables the timer.
    pub flush_interval_secs: u64,
    /// Serialized size cap in bytes.
    pub max_bytes: u64,
    /// Entries kept after rotation.
    pub retain_entries: usize,
}

impl Default for JournalSection {
    fn default() -> Self {
        let defaults = LoggerConfig::default();
        Self {
            path: PathBuf::from(DEFAULT_LOG_PATH),
            flush_threshold: defaults.flush_threshold().get(),
            flush_interval_secs: defaults.flush_interval().map_or(0, |d| d.as_secs()),
            max_bytes: defaults.max_bytes(),
            retain_entries: defaults.retain_entries().get(),
        }
    }
}

impl JournalSection {
    /// Converts the section into a validated [`LoggerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Journal`] when a count is zero or the resulting
    /// logger configuration is invalid.
    pub fn logger_config(&self) -> ConfigResult<LoggerConfig> {
        let flush_threshold = NonZeroUsize::new(self.flush_threshold).ok_or(
            JournalError::InvalidConfig("flush threshold must be greater than zero"),
        )?;
        let retain_entries = NonZeroUsize::new(self.retain_entries).ok_or(
            JournalError::InvalidConfig("retained entry count must be greater than zero"),
        )?;

        let config = LoggerConfig::new(self.path.clone())
            .with_flush_threshold(flush_threshold)
            .with_max_bytes(self.max_bytes)
            .with_retain_entries(retain_entries);
        let config = match self.flush_interval_secs {
            0 => config.without_timer(),
            secs => config.with_flush_interval(Duration::from_secs(secs)),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Complete arbiter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Resolution pipeline tunables.
    pub resolver: ResolverConfig,
    /// Audit log settings.
    pub journal: JournalSection,
    /// Tracing subscriber settings.
    pub telemetry: TelemetryConfig,
}

impl ArbiterConfig {
    /// Builds the default configuration with process environment overrides.
    ///
    /// # Errors
    ///
    /// See [`ArbiterConfig::from_lookup`].
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the default configuration with overrides read through `lookup`.
    ///
    /// Blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for unparsable values and the
    /// section errors of [`ArbiterConfig::validate`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `ARBITER_*` overrides on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for unparsable values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = read(ENV_LOG_PATH) {
            self.journal.path = PathBuf::from(value);
        }
        if let Some(value) = read(ENV_FLUSH_THRESHOLD) {
            self.journal.flush_threshold = parse(ENV_FLUSH_THRESHOLD, &value)?;
        }
        if let Some(value) = read(ENV_FLUSH_INTERVAL_SECS) {
            self.journal.flush_interval_secs = parse(ENV_FLUSH_INTERVAL_SECS, &value)?;
        }
        if let Some(value) = read(ENV_MAX_LOG_BYTES) {
            self.journal.max_bytes = parse(ENV_MAX_LOG_BYTES, &value)?;
        }
        if let Some(value) = read(ENV_RETAIN_ENTRIES) {
            self.journal.retain_entries = parse(ENV_RETAIN_ENTRIES, &value)?;
        }
        if let Some(value) = read(ENV_SPREAD_THRESHOLD) {
            self.resolver = self
                .resolver
                .with_priority_spread_threshold(parse(ENV_SPREAD_THRESHOLD, &value)?);
        }
        if let Some(value) = read(ENV_LOG_FILTER) {
            self.telemetry = self.telemetry.clone().with_filter(value);
        }
        if let Some(value) = read(ENV_LOG_FORMAT) {
            let format = value
                .parse::<LogFormat>()
                .map_err(|_| invalid(ENV_LOG_FORMAT, &value))?;
            self.telemetry = self.telemetry.clone().with_format(format);
        }

        debug!(config = ?self, "configuration overrides applied");
        Ok(())
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first section error encountered.
    pub fn validate(&self) -> ConfigResult<()> {
        self.resolver.validate()?;
        self.journal.logger_config()?;
        self.telemetry.validate()?;
        Ok(())
    }

    /// Returns the journal section as a [`LoggerConfig`].
    ///
    /// # Errors
    ///
    /// See [`JournalSection::logger_config`].
    pub fn logger_config(&self) -> ConfigResult<LoggerConfig> {
        self.journal.logger_config()
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse::<T>().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
    }
}
