//! Orchestrates detection, weighting, strategy selection, and application.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbiter_journal::{ConflictLogEntry, ConflictSink};
use arbiter_primitives::{
    Conflict, ConflictType, ExecutionContext, Perspective, PerspectiveId, ResolutionStrategy,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{ContextAnalyzer, ContextRules, ContextWeighting, ContextWeights};
use crate::decision::ResolvedDecision;
use crate::detection::{ConflictDetector, DetectionCatalog};
use crate::matrix::PriorityMatrix;
use crate::negotiation::NegotiationEngine;
use crate::phase::{PhaseTracker, ResolutionPhase};

const CONSENSUS_THRESHOLD_RATIO: f64 = 0.75;
const CONFLICT_PENALTY: f64 = 0.5;

/// Tunables of the resolution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    priority_spread_threshold: i32,
}

impl ResolverConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            priority_spread_threshold: 3,
        }
    }

    /// Sets the base-priority spread above which priority ordering wins.
    #[must_use]
    pub const fn with_priority_spread_threshold(mut self, threshold: i32) -> Self {
        self.priority_spread_threshold = threshold;
        self
    }

    /// Returns the base-priority spread threshold (exclusive).
    #[must_use]
    pub const fn priority_spread_threshold(self) -> i32 {
        self.priority_spread_threshold
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidConfig`] when the spread threshold is
    /// negative.
    pub fn validate(&self) -> ResolveResult<()> {
        if self.priority_spread_threshold < 0 {
            return Err(ResolveError::InvalidConfig(
                "priority spread threshold must be non-negative",
            ));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Failures inside the pipeline.
///
/// [`Resolver::resolve`] converts these into a fallback decision; only
/// [`ResolverBuilder::build`] returns them to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// Configuration rejected during validation.
    #[error("invalid resolver configuration: {0}")]
    InvalidConfig(&'static str),
    /// The weighting source produced an unusable weight.
    #[error("invalid context weight {weight} for perspective {perspective}")]
    InvalidWeight {
        /// Perspective carrying the weight.
        perspective: PerspectiveId,
        /// Offending weight.
        weight: f64,
    },
    /// A veto conflict carried no winner.
    #[error("veto conflict has no vetoing perspective")]
    MissingVetoWinner,
    /// A strategy produced no perspectives.
    #[error("strategy {strategy} produced no perspectives")]
    EmptyOutcome {
        /// Strategy that came up empty.
        strategy: ResolutionStrategy,
    },
    /// Pipeline phases ran out of order.
    #[error("invalid resolution phase transition from {from:?} to {to:?}")]
    InvalidPhaseTransition {
        /// Phase before the attempted transition.
        from: ResolutionPhase,
        /// Requested phase.
        to: ResolutionPhase,
    },
}

/// Convenience alias for resolver results.
pub type ResolveResult<T> = Result<T, ResolveError>;

#[derive(Debug)]
struct NullSink;

impl ConflictSink for NullSink {
    fn record(&self, _entry: ConflictLogEntry) {}
}

/// Builder for [`Resolver`].
pub struct ResolverBuilder {
    matrix: PriorityMatrix,
    catalog: DetectionCatalog,
    weighting: Option<Arc<dyn ContextWeighting>>,
    negotiation: NegotiationEngine,
    sink: Option<Arc<dyn ConflictSink>>,
    config: ResolverConfig,
}

impl ResolverBuilder {
    fn new() -> Self {
        Self {
            matrix: PriorityMatrix::standard(),
            catalog: DetectionCatalog::standard(),
            weighting: None,
            negotiation: NegotiationEngine::standard(),
            sink: None,
            config: ResolverConfig::default(),
        }
    }

    /// Replaces the priority matrix.
    #[must_use]
    pub fn with_matrix(mut self, matrix: PriorityMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Replaces the detection tables.
    #[must_use]
    pub fn with_catalog(mut self, catalog: DetectionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Installs a custom weighting source.
    #[must_use]
    pub fn with_weighting(mut self, weighting: Arc<dyn ContextWeighting>) -> Self {
        self.weighting = Some(weighting);
        self
    }

    /// Uses a [`ContextAnalyzer`] over the supplied rules.
    #[must_use]
    pub fn with_context_rules(self, rules: ContextRules) -> Self {
        self.with_weighting(Arc::new(ContextAnalyzer::new(rules)))
    }

    /// Replaces the negotiation engine.
    #[must_use]
    pub fn with_negotiation(mut self, negotiation: NegotiationEngine) -> Self {
        self.negotiation = negotiation;
        self
    }

    /// Installs the sink that receives one entry per resolution.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ConflictSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replaces the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the [`Resolver`].
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidConfig`] when the configuration fails
    /// validation.
    pub fn build(self) -> ResolveResult<Resolver> {
        self.config.validate()?;
        Ok(Resolver {
            matrix: Arc::new(self.matrix),
            catalog: Arc::new(self.catalog),
            weighting: self
                .weighting
                .unwrap_or_else(|| Arc::new(ContextAnalyzer::standard())),
            negotiation: Arc::new(self.negotiation),
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            config: self.config,
        })
    }
}

/// Arbitrates between active perspectives.
///
/// Cheap to clone; all tables are shared and immutable, so concurrent calls
/// only contend on the sink.
#[derive(Clone)]
pub struct Resolver {
    matrix: Arc<PriorityMatrix>,
    catalog: Arc<DetectionCatalog>,
    weighting: Arc<dyn ContextWeighting>,
    negotiation: Arc<NegotiationEngine>,
    sink: Arc<dyn ConflictSink>,
    config: ResolverConfig,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("perspectives", &self.matrix.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Starts a builder preloaded with the standard tables.
    #[must_use]
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Returns the priority matrix.
    #[must_use]
    pub fn matrix(&self) -> &PriorityMatrix {
        &self.matrix
    }

    /// Returns the detection tables.
    #[must_use]
    pub fn catalog(&self) -> &DetectionCatalog {
        &self.catalog
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> ResolverConfig {
        self.config
    }

    /// Resolves the active perspectives for `operation` into one decision.
    ///
    /// Never fails. Inactive and duplicate perspectives are dropped before
    /// anything else, so the identity decision for at most one active
    /// perspective lists only active ids; `[qa.inactive()]` yields `[]`. Internal
    /// failures degrade to the single highest-priority perspective with the
    /// error text attached.
    #[must_use]
    pub fn resolve(
        &self,
        operation: &str,
        perspectives: &[Perspective],
        context: &ExecutionContext,
    ) -> ResolvedDecision {
        let started = Instant::now();
        let active = active_perspectives(perspectives);

        if active.len() <= 1 {
            let mut decision =
                ResolvedDecision::identity(active.iter().map(|p| p.id().clone()).collect());
            decision.resolution_time_ms = millis(started.elapsed());
            return decision;
        }

        let context = if context.operation() == operation {
            Cow::Borrowed(context)
        } else {
            Cow::Owned(context.clone().with_operation(operation))
        };

        let mut tracker = PhaseTracker::new();
        let mut decision = match self.run(&active, &context, &mut tracker, started) {
            Ok(decision) => decision,
            Err(err) => {
                let failed = tracker.fail();
                let winner = self.highest_priority(&active);
                warn!(
                    %err,
                    phase = ?failed,
                    operation,
                    fallback = ?winner.as_ref().map(PerspectiveId::as_str),
                    "resolution failed; falling back to highest priority perspective"
                );
                ResolvedDecision::fallback(winner, err.to_string())
            }
        };
        decision.resolution_time_ms = millis(started.elapsed());
        decision
    }

    fn run(
        &self,
        active: &[&Perspective],
        context: &ExecutionContext,
        tracker: &mut PhaseTracker,
        started: Instant,
    ) -> ResolveResult<ResolvedDecision> {
        tracker.advance(ResolutionPhase::Detection)?;
        let ids: Vec<PerspectiveId> = active.iter().map(|p| p.id().clone()).collect();
        let conflicts = ConflictDetector::new(&self.matrix, &self.catalog).detect(&ids, context);
        if conflicts.is_empty() {
            tracker.advance(ResolutionPhase::Done)?;
            return Ok(ResolvedDecision::identity(ids));
        }
        debug!(conflicts = conflicts.len(), "conflicts detected");

        tracker.advance(ResolutionPhase::Weighting)?;
        let weights = self.weighting.analyze(context);
        validate_weights(&weights)?;

        tracker.advance(ResolutionPhase::Selection)?;
        let priorities: BTreeMap<PerspectiveId, i32> = active
            .iter()
            .map(|p| {
                let id = p.id().clone();
                let priority = p
                    .priority_override()
                    .unwrap_or_else(|| self.matrix.priority(&id));
                (id, priority)
            })
            .collect();
        let strategy = self.select(&conflicts, &priorities);
        debug!(%strategy, "strategy selected");

        tracker.advance(ResolutionPhase::Application)?;
        let decision = self.apply(strategy, conflicts, &priorities, &weights, context)?;

        tracker.advance(ResolutionPhase::Logging)?;
        let elapsed = started.elapsed();
        self.sink.record(ConflictLogEntry::new(
            context.operation(),
            decision.conflicts.clone(),
            decision.perspectives.clone(),
            strategy,
            elapsed,
        ));

        tracker.advance(ResolutionPhase::Done)?;
        info!(
            %strategy,
            perspectives = decision.perspectives.len(),
            conflicts = decision.conflicts.len(),
            elapsed_ms = millis(elapsed),
            "conflict resolved"
        );
        Ok(decision)
    }

    fn select(
        &self,
        conflicts: &[Conflict],
        priorities: &BTreeMap<PerspectiveId, i32>,
    ) -> ResolutionStrategy {
        if conflicts.iter().any(|c| c.kind() == ConflictType::Veto) {
            return ResolutionStrategy::VetoOverride;
        }

        let involved: Vec<i32> = participants(conflicts)
            .iter()
            .map(|id| priorities.get(*id).copied().unwrap_or(0))
            .collect();
        // Overrides may sit anywhere in the i32 range.
        let spread = match (involved.iter().max(), involved.iter().min()) {
            (Some(max), Some(min)) => i64::from(*max) - i64::from(*min),
            _ => 0,
        };
        if spread > i64::from(self.config.priority_spread_threshold) {
            return ResolutionStrategy::PriorityBased;
        }

        if conflicts.iter().any(|c| c.kind() == ConflictType::Negotiable) {
            ResolutionStrategy::Negotiation
        } else if conflicts.iter().all(|c| c.kind() == ConflictType::Resource) {
            ResolutionStrategy::SequentialAccess
        } else {
            ResolutionStrategy::WeightedConsensus
        }
    }

    fn apply(
        &self,
        strategy: ResolutionStrategy,
        conflicts: Vec<Conflict>,
        priorities: &BTreeMap<PerspectiveId, i32>,
        weights: &ContextWeights,
        context: &ExecutionContext,
    ) -> ResolveResult<ResolvedDecision> {
        let involved: Vec<PerspectiveId> = participants(&conflicts).into_iter().cloned().collect();
        let priority = |id: &PerspectiveId| priorities.get(id).copied().unwrap_or(0);
        let weighted = |id: &PerspectiveId| f64::from(priority(id)) * weights.get(id);

        let decision = match strategy {
            ResolutionStrategy::VetoOverride => {
                let winner = conflicts
                    .iter()
                    .find(|c| c.kind() == ConflictType::Veto)
                    .and_then(Conflict::resolution)
                    .map(|resolution| resolution.winner.clone())
                    .ok_or(ResolveError::MissingVetoWinner)?;
                let explanation = format!("{winner} vetoed the operation");
                ResolvedDecision::resolved(vec![winner], conflicts, strategy, explanation)
            }
            ResolutionStrategy::PriorityBased => {
                let mut ranked: Vec<(PerspectiveId, f64)> = involved
                    .iter()
                    .map(|id| (id.clone(), weighted(id)))
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                let explanation = format!(
                    "ordered by weighted priority: {}",
                    ranked
                        .iter()
                        .map(|(id, score)| format!("{id} ({score:.2})"))
                        .collect::<Vec<_>>()
                        .join(" -> ")
                );
                let mut decision = ResolvedDecision::resolved(
                    ranked.iter().map(|(id, _)| id.clone()).collect(),
                    conflicts,
                    strategy,
                    explanation,
                );
                decision.scores = Some(ranked.into_iter().collect());
                decision
            }
            ResolutionStrategy::Negotiation => {
                let negotiable: Vec<Conflict> = conflicts
                    .iter()
                    .filter(|c| c.kind() == ConflictType::Negotiable)
                    .cloned()
                    .collect();
                let outcome = self.negotiation.negotiate(&negotiable, context, weights);
                let mut decision = ResolvedDecision::resolved(
                    outcome.agreed.clone(),
                    conflicts,
                    strategy,
                    outcome.explanation.clone(),
                );
                decision.negotiation = Some(outcome);
                decision
            }
            ResolutionStrategy::SequentialAccess => {
                let mut access_order: BTreeMap<String, Vec<PerspectiveId>> = BTreeMap::new();
                for conflict in conflicts.iter().filter(|c| c.kind() == ConflictType::Resource) {
                    let resource = conflict.resource().unwrap_or_else(|| conflict.description());
                    let order = access_order.entry(resource.to_owned()).or_default();
                    for id in conflict.participants() {
                        if !order.contains(id) {
                            order.push(id.clone());
                        }
                    }
                }
                for order in access_order.values_mut() {
                    order.sort_by_key(|id| std::cmp::Reverse(priority(id)));
                }
                let explanation = format!(
                    "sequential access: {}",
                    access_order
                        .iter()
                        .map(|(resource, order)| format!(
                            "{resource} [{}]",
                            order
                                .iter()
                                .map(PerspectiveId::as_str)
                                .collect::<Vec<_>>()
                                .join(" -> ")
                        ))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                let mut decision =
                    ResolvedDecision::resolved(involved, conflicts, strategy, explanation);
                decision.access_order = Some(access_order);
                decision
            }
            ResolutionStrategy::WeightedConsensus => {
                let candidates: Vec<(PerspectiveId, f64)> = involved
                    .iter()
                    .map(|id| {
                        let appearances = conflicts.iter().filter(|c| c.involves(id)).count();
                        (id.clone(), weighted(id) - CONFLICT_PENALTY * count_f64(appearances))
                    })
                    .collect();
                let survivors = weighted_consensus(&candidates);
                let explanation = format!(
                    "weighted consensus kept {} of {} perspectives",
                    survivors.len(),
                    candidates.len()
                );
                let mut decision =
                    ResolvedDecision::resolved(survivors, conflicts, strategy, explanation);
                decision.scores = Some(candidates.into_iter().collect());
                decision
            }
        };

        if decision.perspectives.is_empty() {
            return Err(ResolveError::EmptyOutcome { strategy });
        }
        Ok(decision)
    }

    fn highest_priority(&self, active: &[&Perspective]) -> Option<PerspectiveId> {
        let mut best: Option<(&PerspectiveId, i32)> = None;
        for perspective in active {
            let id = perspective.id();
            let priority = perspective
                .priority_override()
                .unwrap_or_else(|| self.matrix.priority(id));
            if best.is_none_or(|(_, current)| priority > current) {
                best = Some((id, priority));
            }
        }
        best.map(|(id, _)| id.clone())
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            matrix: Arc::new(PriorityMatrix::standard()),
            catalog: Arc::new(DetectionCatalog::standard()),
            weighting: Arc::new(ContextAnalyzer::standard()),
            negotiation: Arc::new(NegotiationEngine::standard()),
            sink: Arc::new(NullSink),
            config: ResolverConfig::default(),
        }
    }
}

/// Keeps active perspectives, first occurrence of each id.
fn active_perspectives(perspectives: &[Perspective]) -> Vec<&Perspective> {
    let mut active: Vec<&Perspective> = Vec::with_capacity(perspectives.len());
    for perspective in perspectives.iter().filter(|p| p.is_active()) {
        if !active.iter().any(|seen| seen.id() == perspective.id()) {
            active.push(perspective);
        }
    }
    active
}

/// Distinct conflict participants in first-seen order.
fn participants(conflicts: &[Conflict]) -> Vec<&PerspectiveId> {
    let mut seen: Vec<&PerspectiveId> = Vec::new();
    for id in conflicts.iter().flat_map(Conflict::participants) {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

fn validate_weights(weights: &ContextWeights) -> ResolveResult<()> {
    for (id, weight) in weights.iter() {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ResolveError::InvalidWeight {
                perspective: id.clone(),
                weight,
            });
        }
    }
    Ok(())
}

/// Keeps candidates whose weight reaches 75% of the mean, ordered by weight.
///
/// When nobody reaches the threshold the single heaviest candidate survives.
fn weighted_consensus(candidates: &[(PerspectiveId, f64)]) -> Vec<PerspectiveId> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let mean = candidates.iter().map(|(_, w)| w).sum::<f64>() / count_f64(candidates.len());
    let threshold = CONSENSUS_THRESHOLD_RATIO * mean;

    let mut survivors: Vec<&(PerspectiveId, f64)> =
        candidates.iter().filter(|(_, w)| *w >= threshold).collect();
    if survivors.is_empty() {
        survivors.extend(
            candidates
                .iter()
                .reduce(|best, next| if next.1 > best.1 { next } else { best }),
        );
    }
    survivors.sort_by(|a, b| b.1.total_cmp(&a.1));
    survivors.into_iter().map(|(id, _)| id.clone()).collect()
}

#[allow(clippy::cast_precision_loss)]
fn count_f64(count: usize) -> f64 {
    count as f64
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_journal::RecordingSink;

    fn id(raw: &str) -> PerspectiveId {
        PerspectiveId::new(raw).unwrap()
    }

    struct FixedWeights(ContextWeights);

    impl ContextWeighting for FixedWeights {
        fn analyze(&self, _context: &ExecutionContext) -> ContextWeights {
            self.0.clone()
        }
    }

    #[test]
    fn config_validation() {
        assert!(ResolverConfig::default().validate().is_ok());
        let err = Resolver::builder()
            .with_config(ResolverConfig::new().with_priority_spread_threshold(-1))
            .build()
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidConfig(_)));
    }

    #[test]
    fn consensus_threshold_arithmetic() {
        let survivors = weighted_consensus(&[
            (id("low"), 2.0),
            (id("high"), 10.0),
            (id("mid"), 6.0),
        ]);
        assert_eq!(survivors, [id("high"), id("mid")]);
    }

    #[test]
    fn consensus_never_empties() {
        let survivors = weighted_consensus(&[(id("a"), -2.0), (id("b"), -2.0)]);
        assert_eq!(survivors, [id("a")]);
    }

    #[test]
    fn inactive_and_duplicate_perspectives_are_ignored() {
        let resolver = Resolver::default();
        let perspectives = vec![
            Perspective::named("qa").unwrap(),
            Perspective::named("QA").unwrap(),
            Perspective::named("performance").unwrap().inactive(),
        ];
        let decision = resolver.resolve("test", &perspectives, &ExecutionContext::default());
        assert_eq!(decision.perspectives(), [id("qa")]);
        assert!(decision.conflicts().is_empty());
        assert!(decision.strategy().is_none());
    }

    #[test]
    fn lone_inactive_perspective_yields_empty_identity() {
        let resolver = Resolver::default();
        let perspectives = [Perspective::named("qa").unwrap().inactive()];
        let decision = resolver.resolve("test", &perspectives, &ExecutionContext::default());

        assert!(decision.perspectives().is_empty());
        assert!(decision.conflicts().is_empty());
        assert!(decision.strategy().is_none());
        assert!(!decision.is_degraded());
    }

    #[test]
    fn invalid_weights_fall_back_without_logging() {
        let mut weights = BTreeMap::new();
        weights.insert(id("performance"), f64::NAN);
        let sink = RecordingSink::new();
        let resolver = Resolver::builder()
            .with_weighting(Arc::new(FixedWeights(ContextWeights::new(weights))))
            .with_sink(sink.clone())
            .build()
            .unwrap();

        let perspectives = Perspective::parse_list(["performance", "security"]).unwrap();
        let decision = resolver.resolve("review", &perspectives, &ExecutionContext::default());

        assert!(decision.is_degraded());
        assert_eq!(decision.perspectives(), [id("security")]);
        assert!(decision.error().unwrap().contains("performance"));
        assert!(decision.resolution_time_ms() >= 0.0);
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn extreme_priority_overrides_do_not_overflow() {
        let resolver = Resolver::default();
        let perspectives = vec![
            Perspective::named("security").unwrap().with_priority(i32::MAX),
            Perspective::named("performance").unwrap().with_priority(i32::MIN),
        ];
        let decision = resolver.resolve("review", &perspectives, &ExecutionContext::default());

        assert!(!decision.is_degraded());
        assert_eq!(decision.strategy(), Some(ResolutionStrategy::PriorityBased));
        assert_eq!(decision.perspectives(), [id("security"), id("performance")]);
    }

    #[test]
    fn fallback_respects_overrides_and_ties() {
        let resolver = Resolver::default();
        let perspectives = vec![
            Perspective::named("qa").unwrap(),
            Perspective::named("performance").unwrap(),
            Perspective::named("scribe").unwrap().with_priority(7),
        ];
        let refs: Vec<&Perspective> = perspectives.iter().collect();
        assert_eq!(resolver.highest_priority(&refs), Some(id("qa")));

        let boosted = [
            Perspective::named("scribe").unwrap().with_priority(11),
            Perspective::named("security").unwrap(),
        ];
        let refs: Vec<&Perspective> = boosted.iter().collect();
        assert_eq!(resolver.highest_priority(&refs), Some(id("scribe")));
    }
}
