//! Conflict records produced by detection and the strategies that resolve them.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::PerspectiveId;

/// Category of incompatibility between perspectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// One perspective may override the other outright.
    Direct,
    /// Perspectives claim the same resource.
    Resource,
    /// Perspectives pursue incompatible goals for the operation.
    Goal,
    /// Perspectives must negotiate rather than override.
    Negotiable,
    /// A perspective blocks the operation.
    Veto,
}

impl ConflictType {
    /// Returns the severity associated with this conflict type.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Veto => Severity::Critical,
            Self::Direct => Severity::High,
            Self::Negotiable | Self::Resource => Severity::Medium,
            Self::Goal => Severity::Low,
        }
    }

    /// Returns the snake-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Resource => "resource",
            Self::Goal => "goal",
            Self::Negotiable => "negotiable",
            Self::Veto => "veto",
        }
    }
}

impl Display for ConflictType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity label attached to a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational incompatibility.
    Low,
    /// Needs coordination.
    Medium,
    /// One perspective must yield.
    High,
    /// The operation is blocked.
    Critical,
}

/// Algorithm chosen to reconcile a conflict set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The vetoing perspective wins alone.
    VetoOverride,
    /// Perspectives are ordered by weighted priority.
    PriorityBased,
    /// A compromise is synthesised by the negotiation engine.
    Negotiation,
    /// Perspectives take turns on shared resources.
    SequentialAccess,
    /// Perspectives below a weighted threshold are dropped.
    WeightedConsensus,
}

impl ResolutionStrategy {
    /// Returns the snake-case label used in audit entries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VetoOverride => "veto_override",
            Self::PriorityBased => "priority_based",
            Self::Negotiation => "negotiation",
            Self::SequentialAccess => "sequential_access",
            Self::WeightedConsensus => "weighted_consensus",
        }
    }
}

impl Display for ResolutionStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Winner recorded against a conflict at detection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Perspective that prevails for this conflict.
    pub winner: PerspectiveId,
    /// Name of the rule that selected the winner.
    pub strategy: String,
}

/// Detected incompatibility between two or more perspectives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    kind: ConflictType,
    participants: Vec<PerspectiveId>,
    severity: Severity,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolution: Option<ConflictResolution>,
}

impl Conflict {
    /// Creates a conflict whose severity follows from its type.
    #[must_use]
    pub fn new(
        kind: ConflictType,
        participants: Vec<PerspectiveId>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            participants,
            severity: kind.severity(),
            description: description.into(),
            resource: None,
            goals: Vec::new(),
            resolution: None,
        }
    }

    /// Attaches the contested resource name.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Attaches the incompatible goal labels.
    #[must_use]
    pub fn with_goals<I, S>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.goals = goals.into_iter().map(Into::into).collect();
        self
    }

    /// Records the winner chosen for this conflict.
    #[must_use]
    pub fn resolved_by(mut self, winner: PerspectiveId, strategy: impl Into<String>) -> Self {
        self.resolution = Some(ConflictResolution {
            winner,
            strategy: strategy.into(),
        });
        self
    }

    /// Returns the conflict type.
    #[must_use]
    pub fn kind(&self) -> ConflictType {
        self.kind
    }

    /// Returns the perspectives involved.
    #[must_use]
    pub fn participants(&self) -> &[PerspectiveId] {
        &self.participants
    }

    /// Returns `true` when the perspective takes part in this conflict.
    #[must_use]
    pub fn involves(&self, id: &PerspectiveId) -> bool {
        self.participants.contains(id)
    }

    /// Returns the severity label.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the contested resource for resource conflicts.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Returns the incompatible goal labels for goal conflicts.
    #[must_use]
    pub fn goals(&self) -> &[String] {
        &self.goals
    }

    /// Returns the recorded resolution, if any.
    #[must_use]
    pub fn resolution(&self) -> Option<&ConflictResolution> {
        self.resolution.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> PerspectiveId {
        PerspectiveId::new(raw).unwrap()
    }

    #[test]
    fn severity_follows_type() {
        let veto = Conflict::new(ConflictType::Veto, vec![id("security"), id("qa")], "blocked");
        assert_eq!(veto.severity(), Severity::Critical);

        let goal = Conflict::new(ConflictType::Goal, vec![id("qa"), id("performance")], "goals")
            .with_goals(["thoroughness", "speed"]);
        assert_eq!(goal.severity(), Severity::Low);
        assert_eq!(goal.goals(), ["thoroughness", "speed"]);
    }

    #[test]
    fn serialises_snake_case_labels() {
        let participants = vec![id("backend"), id("performance")];
        let conflict = Conflict::new(ConflictType::Resource, participants, "db")
            .with_resource("database")
            .resolved_by(id("backend"), "sequential_access");
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["kind"], "resource");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["resource"], "database");
        assert_eq!(json["resolution"]["winner"], "backend");

        let back: Conflict = serde_json::from_value(json).unwrap();
        assert_eq!(back, conflict);
        assert_eq!(ResolutionStrategy::SequentialAccess.to_string(), "sequential_access");
    }
}
