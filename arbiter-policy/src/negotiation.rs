//! Compromise synthesis for perspectives that must negotiate.
//!
//! The engine never drops a participant. It only reorders them (time
//! sequencing), partitions responsibility (feature splitting), or annotates
//! the outcome with conditional priorities.

use std::collections::BTreeMap;

use arbiter_primitives::{Conflict, ConflictType, ExecutionContext, PerspectiveId};
use serde::{Deserialize, Serialize};

use crate::context::ContextWeights;

const BASE_SATISFACTION: f64 = 0.5;
const SATISFACTION_STEP: f64 = 0.2;
const MAX_SATISFACTION: f64 = 1.0;

/// Priority attached to a conditional rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePriority {
    /// Takes precedence over every other rule.
    Highest,
    /// Takes precedence over medium rules.
    High,
    /// Default precedence.
    Medium,
}

impl RulePriority {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Medium => "medium",
        }
    }
}

/// When a conditional rule holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "on", content = "value", rename_all = "snake_case")]
pub enum RuleTrigger {
    /// The context runs in the named environment.
    Environment(String),
    /// The named context flag is enabled.
    Flag(String),
    /// The operation text contains the substring.
    Operation(String),
}

impl RuleTrigger {
    fn holds(&self, context: &ExecutionContext) -> bool {
        match self {
            Self::Environment(env) if env == "production" => context.is_production(),
            Self::Environment(env) => context.environment() == env,
            Self::Flag(flag) => context.flag_enabled(flag),
            Self::Operation(needle) => context
                .operation()
                .to_lowercase()
                .contains(needle.to_lowercase().as_str()),
        }
    }
}

/// Configured conditional priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTemplate {
    /// Human-readable condition label.
    pub condition: String,
    /// Trigger evaluated against the context.
    pub trigger: RuleTrigger,
    /// Perspective the rule favours.
    pub perspective: PerspectiveId,
    /// Priority granted when the condition holds.
    pub priority: RulePriority,
}

/// Conditional priority emitted in a negotiation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalRule {
    /// Human-readable condition label.
    pub condition: String,
    /// Perspective the rule favours.
    pub perspective: PerspectiveId,
    /// Priority granted when the condition holds.
    pub priority: RulePriority,
    /// Whether the condition holds for the current context.
    pub holds: bool,
}

/// Structured accommodation produced by negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Compromise {
    /// Perspectives act one after another; earlier means sooner.
    TimeSequence {
        /// Execution order.
        order: Vec<PerspectiveId>,
    },
    /// Perspectives own disjoint responsibility areas.
    FeatureSplit {
        /// Responsibility areas per perspective.
        assignments: BTreeMap<PerspectiveId, Vec<String>>,
    },
    /// Perspectives take precedence under stated conditions.
    Conditional {
        /// Rules naming involved perspectives.
        rules: Vec<ConditionalRule>,
    },
}

/// Result of a negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationOutcome {
    /// Every involved perspective, in agreed order.
    pub agreed: Vec<PerspectiveId>,
    /// Human-readable summary.
    pub explanation: String,
    /// Compromises that apply.
    pub compromises: Vec<Compromise>,
    /// Satisfaction per perspective in `[0.5, 1.0]`.
    pub satisfaction: BTreeMap<PerspectiveId, f64>,
    /// Requirements each involved perspective brings to the table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requirements: BTreeMap<PerspectiveId, Vec<String>>,
}

/// Static tables consulted by [`NegotiationEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationTables {
    /// Flexibility per perspective; `0.1` is rigid, `0.9` flexible.
    pub flexibility: BTreeMap<PerspectiveId, f64>,
    /// Flexibility of perspectives missing from the table.
    pub default_flexibility: f64,
    /// Requirements reported for each perspective.
    pub requirements: BTreeMap<PerspectiveId, Vec<String>>,
    /// Responsibility areas used by feature splitting.
    pub responsibilities: BTreeMap<PerspectiveId, Vec<String>>,
    /// Conditional priorities.
    pub conditions: Vec<RuleTemplate>,
}

impl Default for NegotiationTables {
    fn default() -> Self {
        Self {
            flexibility: BTreeMap::new(),
            default_flexibility: 0.5,
            requirements: BTreeMap::new(),
            responsibilities: BTreeMap::new(),
            conditions: Vec::new(),
        }
    }
}

impl NegotiationTables {
    /// Returns the compiled-in tables.
    #[must_use]
    pub fn standard() -> Self {
        let flexibility = [
            ("security", 0.1),
            ("qa", 0.3),
            ("architect", 0.3),
            ("devops", 0.4),
            ("performance", 0.5),
            ("backend", 0.5),
            ("frontend", 0.6),
            ("analyzer", 0.6),
            ("refactorer", 0.7),
            ("mentor", 0.9),
            ("scribe", 0.9),
        ]
        .into_iter()
        .filter_map(|(id, value)| PerspectiveId::new(id).ok().map(|id| (id, value)))
        .collect();

        let requirements = lists(&[
            ("security", &["input validation", "least privilege", "audit trail"][..]),
            ("performance", &["latency budget", "resource efficiency"][..]),
            ("qa", &["test coverage", "regression safety"][..]),
            ("frontend", &["accessibility", "responsive layout"][..]),
            ("backend", &["data integrity", "api stability"][..]),
            ("architect", &["clear boundaries", "long-term maintainability"][..]),
            ("devops", &["repeatable deploys", "observability"][..]),
        ]);

        let responsibilities = lists(&[
            ("security", &["authentication", "cryptography"][..]),
            ("frontend", &["user interface"][..]),
            ("backend", &["api", "data layer"][..]),
            ("performance", &["optimization", "caching"][..]),
        ]);

        let conditions = [
            (
                "production environment",
                RuleTrigger::Environment("production".into()),
                "security",
                RulePriority::Highest,
            ),
            (
                "large user count",
                RuleTrigger::Flag("large_user_count".into()),
                "performance",
                RulePriority::High,
            ),
            (
                "user-facing feature",
                RuleTrigger::Flag("user_facing".into()),
                "frontend",
                RulePriority::High,
            ),
            (
                "data migration",
                RuleTrigger::Flag("data_migration".into()),
                "backend",
                RulePriority::High,
            ),
            (
                "release operation",
                RuleTrigger::Operation("release".into()),
                "qa",
                RulePriority::High,
            ),
        ]
        .into_iter()
        .filter_map(|(condition, trigger, id, priority)| {
            PerspectiveId::new(id).ok().map(|perspective| RuleTemplate {
                condition: condition.to_owned(),
                trigger,
                perspective,
                priority,
            })
        })
        .collect();

        Self {
            flexibility,
            default_flexibility: 0.5,
            requirements,
            responsibilities,
            conditions,
        }
    }

    /// Returns the flexibility of `id`.
    #[must_use]
    pub fn flexibility(&self, id: &PerspectiveId) -> f64 {
        self.flexibility
            .get(id)
            .copied()
            .unwrap_or(self.default_flexibility)
    }
}

/// Synthesises compromises between negotiating perspectives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NegotiationEngine {
    tables: NegotiationTables,
}

impl NegotiationEngine {
    /// Creates an engine over the supplied tables.
    #[must_use]
    pub fn new(tables: NegotiationTables) -> Self {
        Self { tables }
    }

    /// Creates an engine over [`NegotiationTables::standard`].
    #[must_use]
    pub fn standard() -> Self {
        Self::new(NegotiationTables::standard())
    }

    /// Returns the tables in use.
    #[must_use]
    pub fn tables(&self) -> &NegotiationTables {
        &self.tables
    }

    /// Negotiates between every perspective named in `conflicts`.
    ///
    /// Never fails: when no compromise form applies the outcome carries the
    /// full participant set and a generic explanation.
    #[must_use]
    pub fn negotiate(
        &self,
        conflicts: &[Conflict],
        context: &ExecutionContext,
        weights: &ContextWeights,
    ) -> NegotiationOutcome {
        let involved = involved(conflicts);
        let mut satisfaction: BTreeMap<PerspectiveId, f64> = involved
            .iter()
            .map(|id| (id.clone(), BASE_SATISFACTION))
            .collect();
        let mut compromises = Vec::new();
        let mut notes = Vec::new();
        let mut agreed = involved.clone();

        if conflicts.iter().any(|c| c.kind() == ConflictType::Resource) {
            let order = self.time_sequence(&involved, weights);
            let front = order.len();
            for (position, id) in order.iter().enumerate() {
                if 2 * position < front {
                    reward(&mut satisfaction, id);
                }
            }
            notes.push(format!("time sequencing: {}", join(&order, " -> ")));
            agreed.clone_from(&order);
            compromises.push(Compromise::TimeSequence { order });
        }

        if conflicts
            .iter()
            .any(|c| c.kind() == ConflictType::Goal && !c.goals().is_empty())
        {
            let assignments: BTreeMap<PerspectiveId, Vec<String>> = involved
                .iter()
                .filter_map(|id| {
                    self.tables
                        .responsibilities
                        .get(id)
                        .filter(|areas| !areas.is_empty())
                        .map(|areas| (id.clone(), areas.clone()))
                })
                .collect();
            for id in assignments.keys() {
                reward(&mut satisfaction, id);
            }
            notes.push(format!(
                "feature split: {}",
                assignments
                    .iter()
                    .map(|(id, areas)| format!("{id} owns {}", areas.join(", ")))
                    .collect::<Vec<_>>()
                    .join("; ")
            ));
            compromises.push(Compromise::FeatureSplit { assignments });
        }

        if conflicts.len() > 2 {
            let rules: Vec<ConditionalRule> = self
                .tables
                .conditions
                .iter()
                .filter(|template| involved.contains(&template.perspective))
                .map(|template| ConditionalRule {
                    condition: template.condition.clone(),
                    perspective: template.perspective.clone(),
                    priority: template.priority,
                    holds: template.trigger.holds(context),
                })
                .collect();
            if !rules.is_empty() {
                for rule in &rules {
                    reward(&mut satisfaction, &rule.perspective);
                }
                notes.push(format!(
                    "conditional rules: {}",
                    rules
                        .iter()
                        .map(|rule| format!(
                            "{} -> {} ({})",
                            rule.condition,
                            rule.perspective,
                            rule.priority.as_str()
                        ))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
                compromises.push(Compromise::Conditional { rules });
            }
        }

        let explanation = if notes.is_empty() {
            format!(
                "no compromise form applies; {} proceed together",
                join(&agreed, ", ")
            )
        } else {
            format!("negotiated between {}: {}", join(&involved, ", "), notes.join("; "))
        };

        let requirements = involved
            .iter()
            .filter_map(|id| {
                self.tables
                    .requirements
                    .get(id)
                    .map(|reqs| (id.clone(), reqs.clone()))
            })
            .collect();

        NegotiationOutcome {
            agreed,
            explanation,
            compromises,
            satisfaction,
            requirements,
        }
    }

    fn time_sequence(
        &self,
        involved: &[PerspectiveId],
        weights: &ContextWeights,
    ) -> Vec<PerspectiveId> {
        let mut ranked: Vec<(PerspectiveId, f64)> = involved
            .iter()
            .map(|id| (id.clone(), weights.get(id) * (1.0 - self.tables.flexibility(id))))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.into_iter().map(|(id, _)| id).collect()
    }
}

fn involved(conflicts: &[Conflict]) -> Vec<PerspectiveId> {
    let mut seen = Vec::new();
    for id in conflicts.iter().flat_map(Conflict::participants) {
        if !seen.contains(id) {
            seen.push(id.clone());
        }
    }
    seen
}

fn reward(satisfaction: &mut BTreeMap<PerspectiveId, f64>, id: &PerspectiveId) {
    if let Some(score) = satisfaction.get_mut(id) {
        *score = (*score + SATISFACTION_STEP).min(MAX_SATISFACTION);
    }
}

fn join(ids: &[PerspectiveId], separator: &str) -> String {
    ids.iter()
        .map(PerspectiveId::as_str)
        .collect::<Vec<_>>()
        .join(separator)
}

fn lists(entries: &[(&str, &[&str])]) -> BTreeMap<PerspectiveId, Vec<String>> {
    entries
        .iter()
        .filter_map(|(id, items)| {
            PerspectiveId::new(id)
                .ok()
                .map(|id| (id, items.iter().map(|item| (*item).to_owned()).collect()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> PerspectiveId {
        PerspectiveId::new(raw).unwrap()
    }

    fn negotiable(a: &str, b: &str) -> Conflict {
        Conflict::new(ConflictType::Negotiable, vec![id(a), id(b)], "negotiate")
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn no_applicable_form_keeps_everyone() {
        let engine = NegotiationEngine::standard();
        let outcome = engine.negotiate(
            &[negotiable("qa", "performance")],
            &ExecutionContext::new("test"),
            &ContextWeights::default(),
        );

        assert_eq!(outcome.agreed, [id("qa"), id("performance")]);
        assert!(outcome.compromises.is_empty());
        assert!(outcome.explanation.starts_with("no compromise form applies"));
        assert_close(outcome.satisfaction[&id("qa")], 0.5);
        assert_eq!(outcome.requirements[&id("qa")], ["test coverage", "regression safety"]);
    }

    #[test]
    fn time_sequence_orders_by_rigidity() {
        let engine = NegotiationEngine::standard();
        let conflicts = [
            Conflict::new(
                ConflictType::Resource,
                vec![id("mentor"), id("performance"), id("security")],
                "shared access to src",
            )
            .with_resource("src"),
        ];
        let outcome = engine.negotiate(
            &conflicts,
            &ExecutionContext::new("x"),
            &ContextWeights::default(),
        );

        // security 0.9, performance 0.5, mentor 0.1
        assert_eq!(outcome.agreed, [id("security"), id("performance"), id("mentor")]);
        assert_close(outcome.satisfaction[&id("security")], 0.7);
        assert_close(outcome.satisfaction[&id("performance")], 0.7);
        assert_close(outcome.satisfaction[&id("mentor")], 0.5);
        assert!(matches!(outcome.compromises[0], Compromise::TimeSequence { .. }));
    }

    #[test]
    fn weights_shift_the_sequence() {
        let engine = NegotiationEngine::standard();
        let conflicts = [Conflict::new(
            ConflictType::Resource,
            vec![id("security"), id("scribe")],
            "shared access to docs",
        )];
        let mut weights = BTreeMap::new();
        weights.insert(id("scribe"), 10.0);
        let outcome = engine.negotiate(
            &conflicts,
            &ExecutionContext::new("x"),
            &ContextWeights::new(weights),
        );
        assert_eq!(outcome.agreed, [id("scribe"), id("security")]);
    }

    #[test]
    fn feature_split_and_conditions_combine() {
        let engine = NegotiationEngine::standard();
        let conflicts = [
            negotiable("backend", "frontend"),
            negotiable("frontend", "performance"),
            Conflict::new(ConflictType::Goal, vec![id("frontend"), id("performance")], "goals")
                .with_goals(["feature_velocity", "speed"]),
        ];
        let ctx = ExecutionContext::new("ship").with_flag("user_facing", true);
        let outcome = engine.negotiate(&conflicts, &ctx, &ContextWeights::default());

        assert_eq!(outcome.compromises.len(), 2);
        let Compromise::Conditional { rules } = &outcome.compromises[1] else {
            panic!("expected conditional compromise");
        };
        let frontend_rule = rules.iter().find(|r| r.perspective == id("frontend")).unwrap();
        assert!(frontend_rule.holds);
        assert!(rules.iter().any(|r| r.perspective == id("backend") && !r.holds));

        // Each gains once from the split and once from a rule.
        assert_close(outcome.satisfaction[&id("frontend")], 0.9);
        assert_close(outcome.satisfaction[&id("backend")], 0.9);
        assert_close(outcome.satisfaction[&id("performance")], 0.9);
        assert_eq!(outcome.agreed.len(), 3);
    }

    #[test]
    fn satisfaction_is_capped() {
        let mut satisfaction = BTreeMap::from([(id("qa"), 0.9)]);
        reward(&mut satisfaction, &id("qa"));
        reward(&mut satisfaction, &id("qa"));
        assert_close(satisfaction[&id("qa")], 1.0);
    }
}
