//! Arbitration between simultaneously active perspectives.
//!
//! A [`Resolver`] takes the operation text, the active perspectives, and an
//! [`ExecutionContext`](arbiter_primitives::ExecutionContext), then runs
//! detection, weighting, strategy selection, and strategy application before
//! recording the outcome through a
//! [`ConflictSink`](arbiter_journal::ConflictSink). Every call returns a
//! [`ResolvedDecision`]; internal failures degrade to a fallback decision
//! carrying the error text.

#![warn(missing_docs, clippy::pedantic)]

pub mod context;
pub mod decision;
pub mod detection;
pub mod matrix;
pub mod negotiation;
pub mod phase;
pub mod resolver;

pub use context::{
    ContextAnalyzer, ContextRules, ContextWeighting, ContextWeights, LargeChangeRule, MatchRule,
    Multipliers, TimeRules,
};
pub use decision::ResolvedDecision;
pub use detection::{ConflictDetector, DetectionCatalog, GoalProfile, OperationKind};
pub use matrix::{PriorityMatrix, PriorityProfile};
pub use negotiation::{
    Compromise, ConditionalRule, NegotiationEngine, NegotiationOutcome, NegotiationTables,
    RulePriority, RuleTemplate, RuleTrigger,
};
pub use phase::{PhaseTracker, ResolutionPhase};
pub use resolver::{ResolveError, ResolveResult, Resolver, ResolverBuilder, ResolverConfig};
