//! Audit entries describing one completed resolution.

use std::time::Duration;

use arbiter_primitives::{Conflict, PerspectiveId, ResolutionStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One resolution as written to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictLogEntry {
    /// Unique identifier of the entry.
    pub id: Uuid,
    /// Operation text that was arbitrated.
    pub operation: String,
    /// Conflicts detected for the operation.
    pub conflicts: Vec<Conflict>,
    /// Resolved perspective list.
    pub resolution: Vec<PerspectiveId>,
    /// Strategy applied to reach the resolution.
    pub strategy: ResolutionStrategy,
    /// Time the entry was created.
    pub timestamp: DateTime<Utc>,
    /// End-to-end resolution time in milliseconds.
    pub resolution_time_ms: f64,
}

impl ConflictLogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        conflicts: Vec<Conflict>,
        resolution: Vec<PerspectiveId>,
        strategy: ResolutionStrategy,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: operation.into(),
            conflicts,
            resolution,
            strategy,
            timestamp: Utc::now(),
            resolution_time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_recorded_in_milliseconds() {
        let entry = ConflictLogEntry::new(
            "deploy",
            Vec::new(),
            vec![PerspectiveId::new("security").unwrap()],
            ResolutionStrategy::VetoOverride,
            Duration::from_micros(2500),
        );
        assert!((entry.resolution_time_ms - 2.5).abs() < f64::EPSILON);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["strategy"], "veto_override");
        assert_eq!(json["resolution"][0], "security");
    }
}
