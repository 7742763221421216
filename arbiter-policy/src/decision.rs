//! Decision returned by every resolution.

use std::collections::BTreeMap;

use arbiter_primitives::{Conflict, PerspectiveId, ResolutionStrategy};
use serde::{Deserialize, Serialize};

use crate::negotiation::NegotiationOutcome;

/// Outcome of [`Resolver::resolve`](crate::Resolver::resolve).
///
/// A populated [`error`](Self::error) marks a degraded decision produced by
/// the fallback path; the call itself still succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDecision {
    pub(crate) perspectives: Vec<PerspectiveId>,
    pub(crate) conflicts: Vec<Conflict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) strategy: Option<ResolutionStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) scores: Option<BTreeMap<PerspectiveId, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) access_order: Option<BTreeMap<String, Vec<PerspectiveId>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) negotiation: Option<NegotiationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
    pub(crate) resolution_time_ms: f64,
}

impl ResolvedDecision {
    pub(crate) fn identity(perspectives: Vec<PerspectiveId>) -> Self {
        Self {
            perspectives,
            conflicts: Vec::new(),
            strategy: None,
            explanation: None,
            scores: None,
            access_order: None,
            negotiation: None,
            error: None,
            resolution_time_ms: 0.0,
        }
    }

    pub(crate) fn resolved(
        perspectives: Vec<PerspectiveId>,
        conflicts: Vec<Conflict>,
        strategy: ResolutionStrategy,
        explanation: String,
    ) -> Self {
        Self {
            conflicts,
            strategy: Some(strategy),
            explanation: Some(explanation),
            ..Self::identity(perspectives)
        }
    }

    pub(crate) fn fallback(winner: Option<PerspectiveId>, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::identity(winner.into_iter().collect())
        }
    }

    /// Resolved perspectives in precedence order.
    #[must_use]
    pub fn perspectives(&self) -> &[PerspectiveId] {
        &self.perspectives
    }

    /// Conflicts detected for the request.
    #[must_use]
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Strategy applied, absent for identity and fallback decisions.
    #[must_use]
    pub fn strategy(&self) -> Option<ResolutionStrategy> {
        self.strategy
    }

    /// Human-readable account of the decision.
    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Weighted scores used by priority and consensus strategies.
    #[must_use]
    pub fn scores(&self) -> Option<&BTreeMap<PerspectiveId, f64>> {
        self.scores.as_ref()
    }

    /// Advisory access order per shared resource.
    #[must_use]
    pub fn access_order(&self) -> Option<&BTreeMap<String, Vec<PerspectiveId>>> {
        self.access_order.as_ref()
    }

    /// Negotiation detail when the negotiation strategy ran.
    #[must_use]
    pub fn negotiation(&self) -> Option<&NegotiationOutcome> {
        self.negotiation.as_ref()
    }

    /// Error text of a degraded decision.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns `true` when the fallback path produced this decision.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// End-to-end resolution time in milliseconds.
    #[must_use]
    pub fn resolution_time_ms(&self) -> f64 {
        self.resolution_time_ms
    }
}
