//! Execution context supplied to a resolution request.

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Environment assumed when the caller does not name one.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Describes the operation being arbitrated and where it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default)]
    operation: String,
    #[serde(
        default = "default_environment",
        deserialize_with = "deserialize_environment"
    )]
    environment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    flags: Map<String, Value>,
    #[serde(default = "local_now")]
    timestamp: DateTime<FixedOffset>,
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_owned()
}

/// Trimmed, lower-cased tag, or `None` when blank.
fn normalize_environment(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn deserialize_environment<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_environment(&raw).unwrap_or_else(default_environment))
}

fn local_now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            operation: String::new(),
            environment: default_environment(),
            targets: Vec::new(),
            flags: Map::new(),
            timestamp: local_now(),
        }
    }
}

impl ExecutionContext {
    /// Creates a context for the supplied operation text.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Replaces the operation text.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Sets the environment tag, e.g. `production` or `staging`.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        if let Some(environment) = normalize_environment(&environment.into()) {
            self.environment = environment;
        }
        self
    }

    /// Adds a target resource identifier, ignoring blank entries.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.add_target(target);
        self
    }

    /// Adds multiple target resource identifiers.
    #[must_use]
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for target in targets {
            self.add_target(target);
        }
        self
    }

    /// Sets a flag on the context.
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_flag(key, value);
        self
    }

    /// Pins the timestamp used by time-of-day heuristics.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a target resource identifier, ignoring blank entries.
    pub fn add_target(&mut self, target: impl Into<String>) {
        let target = target.into();
        if !target.trim().is_empty() {
            self.targets.push(target);
        }
    }

    /// Inserts or replaces a flag.
    pub fn insert_flag(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.flags.insert(key.into(), value.into());
    }

    /// Returns the operation text.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the environment tag.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns `true` for production environments.
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self.environment.as_str(), "production" | "prod")
    }

    /// Returns the target resource identifiers.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Returns the raw flag map.
    #[must_use]
    pub fn flags(&self) -> &Map<String, Value> {
        &self.flags
    }

    /// Returns the timestamp of the request.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// Returns `true` when the flag is set to a truthy value.
    ///
    /// Booleans, non-zero numbers, and the strings `true`, `1`, `yes`, and
    /// `on` count as set.
    #[must_use]
    pub fn flag_enabled(&self, key: &str) -> bool {
        match self.flags.get(key) {
            Some(Value::Bool(value)) => *value,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(text)) => matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            ),
            _ => false,
        }
    }
}
