//! Static priority, override, negotiation, and veto relations between perspectives.

use std::collections::{BTreeMap, BTreeSet};

use arbiter_primitives::PerspectiveId;
use serde::{Deserialize, Serialize};

static NO_TRIGGERS: BTreeSet<String> = BTreeSet::new();

/// Rules attached to one perspective.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityProfile {
    priority: i32,
    overrides: BTreeSet<PerspectiveId>,
    negotiates_with: BTreeSet<PerspectiveId>,
    negotiates_with_all: bool,
    veto_triggers: BTreeSet<String>,
}

impl PriorityProfile {
    /// Creates a profile with the given base priority and no relations.
    #[must_use]
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    /// Adds perspectives this one may override.
    #[must_use]
    pub fn overriding<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = PerspectiveId>,
    {
        self.overrides.extend(ids);
        self
    }

    /// Adds perspectives this one must negotiate with.
    #[must_use]
    pub fn negotiating_with<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = PerspectiveId>,
    {
        self.negotiates_with.extend(ids);
        self
    }

    /// Makes this perspective negotiate with every other perspective.
    #[must_use]
    pub fn negotiating_with_all(mut self) -> Self {
        self.negotiates_with_all = true;
        self
    }

    /// Adds named veto triggers.
    #[must_use]
    pub fn with_veto_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.veto_triggers.extend(triggers.into_iter().map(Into::into));
        self
    }

    /// Returns the base priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the perspectives this profile may override.
    #[must_use]
    pub fn overrides(&self) -> &BTreeSet<PerspectiveId> {
        &self.overrides
    }

    /// Returns `true` when this profile negotiates with `other`.
    #[must_use]
    pub fn negotiates_with(&self, other: &PerspectiveId) -> bool {
        self.negotiates_with_all || self.negotiates_with.contains(other)
    }

    /// Returns the named veto triggers.
    #[must_use]
    pub fn veto_triggers(&self) -> &BTreeSet<String> {
        &self.veto_triggers
    }
}

/// Read-only lookup table of [`PriorityProfile`]s keyed by perspective.
///
/// Unknown perspectives resolve to priority 0 with no overrides, negotiation
/// partners, or vetoes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityMatrix {
    profiles: BTreeMap<PerspectiveId, PriorityProfile>,
}

impl PriorityMatrix {
    /// Creates a matrix from explicit profiles.
    #[must_use]
    pub fn from_profiles<I>(profiles: I) -> Self
    where
        I: IntoIterator<Item = (PerspectiveId, PriorityProfile)>,
    {
        Self {
            profiles: profiles.into_iter().collect(),
        }
    }

    /// Adds or replaces a profile.
    #[must_use]
    pub fn with_profile(mut self, id: PerspectiveId, profile: PriorityProfile) -> Self {
        self.profiles.insert(id, profile);
        self
    }

    /// Returns the built-in table for the standard perspective set.
    #[must_use]
    pub fn standard() -> Self {
        let entries = [
            (
                "security",
                PriorityProfile::new(10)
                    .overriding(ids(&[
                        "performance",
                        "frontend",
                        "backend",
                        "refactorer",
                        "mentor",
                        "scribe",
                    ]))
                    .negotiating_with(ids(&["architect", "devops", "qa"]))
                    .with_veto_triggers(["unsafe_operations", "credential_exposure"]),
            ),
            (
                "architect",
                PriorityProfile::new(9)
                    .overriding(ids(&["frontend", "backend", "refactorer", "scribe"]))
                    .negotiating_with(ids(&["security", "performance", "devops"])),
            ),
            (
                "devops",
                PriorityProfile::new(8)
                    .overriding(ids(&["refactorer", "scribe"]))
                    .negotiating_with(ids(&["security", "architect", "performance"]))
                    .with_veto_triggers(["production_changes"]),
            ),
            (
                "qa",
                PriorityProfile::new(7)
                    .overriding(ids(&["refactorer", "scribe"]))
                    .negotiating_with(ids(&["security", "performance"]))
                    .with_veto_triggers(["skip_validation"]),
            ),
            (
                "performance",
                PriorityProfile::new(7)
                    .overriding(ids(&["refactorer", "scribe"]))
                    .negotiating_with(ids(&["qa", "architect", "devops", "frontend"])),
            ),
            (
                "backend",
                PriorityProfile::new(6)
                    .overriding(ids(&["scribe"]))
                    .negotiating_with(ids(&["frontend", "performance"])),
            ),
            (
                "analyzer",
                PriorityProfile::new(6)
                    .overriding(ids(&["mentor", "scribe"]))
                    .negotiating_with(ids(&["architect", "qa"])),
            ),
            (
                "frontend",
                PriorityProfile::new(6)
                    .overriding(ids(&["scribe"]))
                    .negotiating_with(ids(&["backend", "performance"])),
            ),
            (
                "refactorer",
                PriorityProfile::new(5)
                    .overriding(ids(&["scribe"]))
                    .negotiating_with(ids(&["architect"])),
            ),
            ("mentor", PriorityProfile::new(4).negotiating_with_all()),
            ("scribe", PriorityProfile::new(3).negotiating_with_all()),
        ];

        Self::from_profiles(
            entries
                .into_iter()
                .filter_map(|(id, profile)| PerspectiveId::new(id).ok().map(|id| (id, profile))),
        )
    }

    /// Returns the profile for `id`, if configured.
    #[must_use]
    pub fn profile(&self, id: &PerspectiveId) -> Option<&PriorityProfile> {
        self.profiles.get(id)
    }

    /// Returns the base priority, or 0 for unknown perspectives.
    #[must_use]
    pub fn priority(&self, id: &PerspectiveId) -> i32 {
        self.profile(id).map_or(0, PriorityProfile::priority)
    }

    /// Returns `true` iff `a`'s override set contains `b`.
    #[must_use]
    pub fn can_override(&self, a: &PerspectiveId, b: &PerspectiveId) -> bool {
        self.profile(a).is_some_and(|profile| profile.overrides.contains(b))
    }

    /// Returns `true` when either perspective negotiates with the other.
    #[must_use]
    pub fn needs_negotiation(&self, a: &PerspectiveId, b: &PerspectiveId) -> bool {
        self.profile(a).is_some_and(|profile| profile.negotiates_with(b))
            || self.profile(b).is_some_and(|profile| profile.negotiates_with(a))
    }

    /// Returns the named veto triggers for `id`.
    #[must_use]
    pub fn veto_triggers(&self, id: &PerspectiveId) -> &BTreeSet<String> {
        self.profile(id)
            .map_or(&NO_TRIGGERS, PriorityProfile::veto_triggers)
    }

    /// Returns the number of configured perspectives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns `true` when no perspectives are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn ids(raw: &[&str]) -> Vec<PerspectiveId> {
    raw.iter()
        .filter_map(|id| PerspectiveId::new(id).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> PerspectiveId {
        PerspectiveId::new(raw).unwrap()
    }

    #[test]
    fn standard_priorities() {
        let matrix = PriorityMatrix::standard();
        assert_eq!(matrix.len(), 11);
        assert_eq!(matrix.priority(&id("security")), 10);
        assert_eq!(matrix.priority(&id("qa")), 7);
        assert_eq!(matrix.priority(&id("performance")), 7);
        assert_eq!(matrix.priority(&id("scribe")), 3);
    }

    #[test]
    fn unknown_perspectives_are_harmless() {
        let matrix = PriorityMatrix::standard();
        let unknown = id("data-steward");
        assert_eq!(matrix.priority(&unknown), 0);
        assert!(!matrix.can_override(&unknown, &id("scribe")));
        assert!(!matrix.can_override(&id("security"), &unknown));
        assert!(!matrix.needs_negotiation(&unknown, &id("qa")));
        assert!(matrix.veto_triggers(&unknown).is_empty());
    }

    #[test]
    fn override_is_directional() {
        let matrix = PriorityMatrix::standard();
        assert!(matrix.can_override(&id("architect"), &id("frontend")));
        assert!(!matrix.can_override(&id("frontend"), &id("architect")));
    }

    #[test]
    fn negotiation_is_symmetric_and_honours_all() {
        let matrix = PriorityMatrix::standard();
        assert!(matrix.needs_negotiation(&id("qa"), &id("performance")));
        assert!(matrix.needs_negotiation(&id("performance"), &id("qa")));
        // Only mentor lists "all"; the relation still holds from either side.
        assert!(matrix.needs_negotiation(&id("devops"), &id("mentor")));
        assert!(matrix.needs_negotiation(&id("mentor"), &id("devops")));
        assert!(matrix.needs_negotiation(&id("mentor"), &id("data-steward")));
        assert!(!matrix.needs_negotiation(&id("analyzer"), &id("frontend")));
    }

    #[test]
    fn deserialises_custom_profiles() {
        let matrix: PriorityMatrix = serde_json::from_str(
            r#"{
                "compliance": {
                    "priority": 12,
                    "overrides": ["security"],
                    "veto_triggers": ["production_changes"]
                },
                "security": {"priority": 10, "negotiates_with_all": true}
            }"#,
        )
        .unwrap();

        assert_eq!(matrix.priority(&id("compliance")), 12);
        assert!(matrix.can_override(&id("compliance"), &id("security")));
        assert!(matrix.needs_negotiation(&id("qa"), &id("security")));
        assert!(matrix.veto_triggers(&id("compliance")).contains("production_changes"));
    }
}
