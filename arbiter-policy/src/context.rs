//! Context-sensitive weight multipliers.
//!
//! [`ContextAnalyzer`] folds every matching rule of a [`ContextRules`] table
//! into one multiplier per perspective. Rules never short-circuit; a
//! perspective touched by no rule keeps the neutral weight `1.0`.

use std::collections::BTreeMap;

use arbiter_primitives::{ExecutionContext, PerspectiveId};
use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Multiplier per perspective.
pub type Multipliers = BTreeMap<PerspectiveId, f64>;

/// Weight neutral to every rule.
pub const NEUTRAL_WEIGHT: f64 = 1.0;

/// Computed weights for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextWeights(Multipliers);

impl ContextWeights {
    /// Wraps precomputed multipliers.
    #[must_use]
    pub fn new(weights: Multipliers) -> Self {
        Self(weights)
    }

    /// Returns the weight for `id`, `1.0` when no rule touched it.
    #[must_use]
    pub fn get(&self, id: &PerspectiveId) -> f64 {
        self.0.get(id).copied().unwrap_or(NEUTRAL_WEIGHT)
    }

    /// Iterates over perspectives that at least one rule touched.
    pub fn iter(&self) -> impl Iterator<Item = (&PerspectiveId, f64)> {
        self.0.iter().map(|(id, weight)| (id, *weight))
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Multipliers {
        &self.0
    }

    fn scale(&mut self, multipliers: &Multipliers) {
        for (id, factor) in multipliers {
            *self.0.entry(id.clone()).or_insert(NEUTRAL_WEIGHT) *= factor;
        }
    }
}

/// Source of per-perspective weights for an execution context.
///
/// The resolver depends on this trait rather than on [`ContextAnalyzer`] so
/// tests and tenants can substitute their own weighting.
pub trait ContextWeighting: Send + Sync {
    /// Computes the weights for `context`.
    fn analyze(&self, context: &ExecutionContext) -> ContextWeights;
}

/// Applies `multipliers` when any of `matches` is found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    /// Substrings, flag names, or patterns depending on where the rule sits.
    pub matches: Vec<String>,
    /// Factors applied when the rule fires.
    pub multipliers: Multipliers,
}

impl MatchRule {
    fn new(matches: &[&str], multipliers: &[(&str, f64)]) -> Self {
        Self {
            matches: matches.iter().map(|m| (*m).to_owned()).collect(),
            multipliers: multipliers_from(multipliers),
        }
    }

    fn fires_on(&self, haystack: &str) -> bool {
        self.matches
            .iter()
            .any(|needle| haystack.contains(needle.to_lowercase().as_str()))
    }
}

/// Time-of-day and day-of-week heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRules {
    /// First hour (inclusive) counted as late night.
    pub late_night_from: u32,
    /// Hour (exclusive) at which late night ends.
    pub late_night_until: u32,
    /// Factors applied during late-night hours.
    pub late_night: Multipliers,
    /// Factors applied on Fridays.
    pub friday: Multipliers,
    /// Hour (exclusive) at which Monday morning ends.
    pub monday_morning_until: u32,
    /// Factors applied on Monday mornings.
    pub monday_morning: Multipliers,
}

impl Default for TimeRules {
    fn default() -> Self {
        Self {
            late_night_from: 22,
            late_night_until: 6,
            late_night: multipliers_from(&[("security", 1.2), ("qa", 1.2)]),
            friday: multipliers_from(&[("qa", 1.3), ("security", 1.2), ("devops", 1.2)]),
            monday_morning_until: 12,
            monday_morning: multipliers_from(&[("performance", 1.2), ("analyzer", 1.2)]),
        }
    }
}

/// Rule for changes that touch many resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LargeChangeRule {
    /// Target count above which the change counts as large.
    pub resource_threshold: usize,
    /// Flag that marks a change as large regardless of target count.
    pub flag: String,
    /// Factors applied to large changes.
    pub multipliers: Multipliers,
}

impl Default for LargeChangeRule {
    fn default() -> Self {
        Self {
            resource_threshold: 10,
            flag: "large".to_owned(),
            multipliers: multipliers_from(&[("performance", 1.2), ("architect", 1.3)]),
        }
    }
}

/// Rule tables consulted by [`ContextAnalyzer`].
///
/// Deserializing an empty object yields an analyzer that leaves every weight
/// neutral; [`ContextRules::standard`] returns the compiled-in tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextRules {
    /// Factors keyed by environment tag.
    pub environments: BTreeMap<String, Multipliers>,
    /// Rules keyed on substrings of the operation text.
    pub operations: Vec<MatchRule>,
    /// Rules that fire when any listed flag is enabled.
    pub flags: Vec<MatchRule>,
    /// Time heuristics.
    pub time: TimeRules,
    /// Rules keyed on substrings of target names, each applied at most once.
    pub targets: Vec<MatchRule>,
    /// Large-change heuristic.
    pub large_change: LargeChangeRule,
}

impl Default for ContextRules {
    fn default() -> Self {
        Self {
            environments: BTreeMap::new(),
            operations: Vec::new(),
            flags: Vec::new(),
            time: TimeRules {
                late_night: Multipliers::new(),
                friday: Multipliers::new(),
                monday_morning: Multipliers::new(),
                ..TimeRules::default()
            },
            targets: Vec::new(),
            large_change: LargeChangeRule {
                multipliers: Multipliers::new(),
                ..LargeChangeRule::default()
            },
        }
    }
}

impl ContextRules {
    /// Returns the compiled-in rule tables.
    #[must_use]
    pub fn standard() -> Self {
        let environments = [
            (
                "production",
                multipliers_from(&[
                    ("security", 1.5),
                    ("qa", 1.3),
                    ("devops", 1.4),
                    ("performance", 0.8),
                    ("frontend", 0.8),
                ]),
            ),
            (
                "development",
                multipliers_from(&[
                    ("frontend", 1.2),
                    ("refactorer", 1.3),
                    ("security", 0.8),
                    ("qa", 0.8),
                ]),
            ),
            (
                "staging",
                multipliers_from(&[
                    ("qa", 1.3),
                    ("performance", 1.2),
                    ("security", 1.2),
                    ("devops", 1.2),
                ]),
            ),
        ]
        .into_iter()
        .map(|(env, multipliers)| (env.to_owned(), multipliers))
        .collect();

        Self {
            environments,
            operations: vec![
                MatchRule::new(&["deploy"], &[("devops", 1.5), ("security", 1.3), ("qa", 1.2)]),
                MatchRule::new(
                    &["design"],
                    &[("architect", 1.5), ("frontend", 1.2), ("backend", 1.2)],
                ),
            ],
            flags: vec![MatchRule::new(
                &["urgent", "hotfix"],
                &[("performance", 1.3), ("devops", 1.4), ("qa", 0.7)],
            )],
            time: TimeRules::default(),
            targets: vec![
                MatchRule::new(&["auth", "security", "crypto"], &[("security", 1.3)]),
                MatchRule::new(
                    &["ui", "component", ".tsx", ".jsx", ".vue", ".css", "view"],
                    &[("frontend", 1.3)],
                ),
                MatchRule::new(&["api", "server", "route", "endpoint"], &[("backend", 1.3)]),
                MatchRule::new(
                    &["config", ".yaml", ".yml", ".json", ".toml"],
                    &[("devops", 1.2), ("security", 1.1)],
                ),
                MatchRule::new(&["test", "spec"], &[("qa", 1.3)]),
            ],
            large_change: LargeChangeRule::default(),
        }
    }

    fn environment(&self, context: &ExecutionContext) -> Option<&Multipliers> {
        let key = if context.is_production() && self.environments.contains_key("production") {
            "production"
        } else {
            context.environment()
        };
        self.environments.get(key)
    }
}

/// Rule-table implementation of [`ContextWeighting`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContextAnalyzer {
    rules: ContextRules,
}

impl ContextAnalyzer {
    /// Creates an analyzer over the supplied rules.
    #[must_use]
    pub fn new(rules: ContextRules) -> Self {
        Self { rules }
    }

    /// Creates an analyzer over [`ContextRules::standard`].
    #[must_use]
    pub fn standard() -> Self {
        Self::new(ContextRules::standard())
    }

    /// Returns the rule tables.
    #[must_use]
    pub fn rules(&self) -> &ContextRules {
        &self.rules
    }

    fn apply_time(&self, context: &ExecutionContext, weights: &mut ContextWeights) {
        let time = &self.rules.time;
        let timestamp = context.timestamp();
        let hour = timestamp.hour();

        if hour >= time.late_night_from || hour < time.late_night_until {
            weights.scale(&time.late_night);
        }
        match timestamp.weekday() {
            Weekday::Fri => weights.scale(&time.friday),
            Weekday::Mon if hour < time.monday_morning_until => {
                weights.scale(&time.monday_morning);
            }
            _ => {}
        }
    }

    fn apply_targets(&self, context: &ExecutionContext, weights: &mut ContextWeights) {
        let targets: Vec<String> = context
            .targets()
            .iter()
            .map(|target| target.to_lowercase())
            .collect();

        for rule in &self.rules.targets {
            if targets.iter().any(|target| rule.fires_on(target)) {
                weights.scale(&rule.multipliers);
            }
        }

        let large = &self.rules.large_change;
        if targets.len() > large.resource_threshold || context.flag_enabled(&large.flag) {
            weights.scale(&large.multipliers);
        }
    }
}

impl Default for ContextAnalyzer {
    fn default() -> Self {
        Self::standard()
    }
}

impl ContextWeighting for ContextAnalyzer {
    fn analyze(&self, context: &ExecutionContext) -> ContextWeights {
        let mut weights = ContextWeights::default();

        if let Some(multipliers) = self.rules.environment(context) {
            weights.scale(multipliers);
        }

        let operation = context.operation().to_lowercase();
        for rule in &self.rules.operations {
            if rule.fires_on(&operation) {
                weights.scale(&rule.multipliers);
            }
        }

        for rule in &self.rules.flags {
            if rule.matches.iter().any(|flag| context.flag_enabled(flag)) {
                weights.scale(&rule.multipliers);
            }
        }

        self.apply_time(context, &mut weights);
        self.apply_targets(context, &mut weights);
        weights
    }
}

fn multipliers_from(pairs: &[(&str, f64)]) -> Multipliers {
    pairs
        .iter()
        .filter_map(|(id, factor)| PerspectiveId::new(id).ok().map(|id| (id, *factor)))
        .collect()
}
