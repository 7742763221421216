//! Structured tracing helpers.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output layout of the fmt subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line records.
    #[default]
    Compact,
    /// Multi-line, human-oriented records.
    Pretty,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
        })
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            _ => Err(TelemetryError::UnknownFormat(value.to_owned())),
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    filter: String,
    format: LogFormat,
    with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Compact,
            with_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Sets the `EnvFilter` directive used when `RUST_LOG` is unset.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the output layout.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggles display of the event target.
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Returns the filter directive.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Returns the output layout.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }

    /// Returns whether targets are displayed.
    #[must_use]
    pub const fn shows_target(&self) -> bool {
        self.with_target
    }

    /// Validates the filter directive.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFilter`] when the directive does not parse.
    pub fn validate(&self) -> TelemetryResult<()> {
        self.env_filter().map(|_| ())
    }

    fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        EnvFilter::try_new(&self.filter).map_err(|err| TelemetryError::InvalidFilter {
            filter: self.filter.clone(),
            reason: err.to_string(),
        })
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    /// The filter directive did not parse.
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter {
        /// Offending directive.
        filter: String,
        /// Parser message.
        reason: String,
    },
    /// The log format name is not known.
    #[error("unknown log format `{0}`")]
    UnknownFormat(String),
    /// A global subscriber is already installed.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialised,
}

/// Convenience alias for telemetry results.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Installs the global fmt subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over the configured filter when it parses.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for an unparsable directive and
/// [`TelemetryError::AlreadyInitialised`] when a subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.env_filter()?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|_| TelemetryError::AlreadyInitialised)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter(), "info");
        assert_eq!(config.format(), LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_filters() {
        let config = TelemetryConfig::default().with_filter("arbiter=loud");
        assert!(matches!(
            config.validate(),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn parses_formats() {
        assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!(
            "json".parse::<LogFormat>().unwrap_err(),
            TelemetryError::UnknownFormat("json".into())
        );
    }

    #[test]
    fn deserialises_partial_sections() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"format": "pretty"}"#).unwrap();
        assert_eq!(config.format(), LogFormat::Pretty);
        assert_eq!(config.filter(), "info");
    }

    #[test]
    fn second_install_is_reported() {
        let config = TelemetryConfig::default().with_filter("warn");
        let _ = init_tracing(&config);
        assert_eq!(init_tracing(&config), Err(TelemetryError::AlreadyInitialised));
    }
}
