//! Conflict detection between active perspectives.

use std::collections::BTreeMap;

use arbiter_primitives::{Conflict, ConflictType, ExecutionContext, PerspectiveId};
use serde::{Deserialize, Serialize};

use crate::matrix::PriorityMatrix;

/// Coarse category of the requested operation, inferred from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Building or implementing features.
    Build,
    /// Running or writing tests.
    Test,
    /// Deploying or releasing.
    Deploy,
    /// Designing components or interfaces.
    Design,
    /// Analysing, reviewing, or auditing.
    Analyze,
    /// Improving, optimising, or refactoring.
    Improve,
    /// Anything else.
    General,
}

impl OperationKind {
    const KEYWORDS: [(Self, &'static [&'static str]); 6] = [
        (Self::Deploy, &["deploy", "release"]),
        (Self::Test, &["test"]),
        (Self::Design, &["design"]),
        (Self::Build, &["build", "implement"]),
        (Self::Analyze, &["analyze", "review", "audit"]),
        (Self::Improve, &["improve", "optimize", "refactor"]),
    ];

    /// Infers the kind from operation text by substring match.
    #[must_use]
    pub fn classify(operation: &str) -> Self {
        let operation = operation.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| operation.contains(kw)))
            .map_or(Self::General, |(kind, _)| *kind)
    }
}

/// Goal a perspective pursues, with per-operation overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalProfile {
    /// Goal used when no operation-specific goal is configured.
    pub default: String,
    /// Goals for specific operation kinds.
    pub by_operation: BTreeMap<OperationKind, String>,
}

impl GoalProfile {
    fn new(default: &str) -> Self {
        Self {
            default: default.to_owned(),
            by_operation: BTreeMap::new(),
        }
    }

    fn with(mut self, kind: OperationKind, goal: &str) -> Self {
        self.by_operation.insert(kind, goal.to_owned());
        self
    }

    fn goal(&self, kind: OperationKind) -> &str {
        self.by_operation.get(&kind).unwrap_or(&self.default)
    }
}

/// Static tables consulted during detection.
///
/// Kept apart from [`ConflictDetector`] so the tables can be replaced without
/// touching the detection logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionCatalog {
    resource_areas: BTreeMap<PerspectiveId, Vec<String>>,
    goals: BTreeMap<PerspectiveId, GoalProfile>,
    incompatible_goals: Vec<(String, String)>,
    unsafe_markers: Vec<String>,
    credential_markers: Vec<String>,
    unsafe_flags: Vec<String>,
}

impl DetectionCatalog {
    /// Returns the compiled-in tables.
    #[must_use]
    pub fn standard() -> Self {
        let resource_areas = keyed(vec![
            ("backend", vec!["api", "server", "database"]),
            ("frontend", vec!["ui", "components", "styles"]),
            ("devops", vec![".github", "deploy", "infrastructure"]),
            ("security", vec!["auth", "crypto"]),
            ("qa", vec!["tests"]),
            ("performance", vec!["cache", "database"]),
            ("architect", vec!["architecture", "interfaces"]),
            ("analyzer", vec!["logs"]),
            ("refactorer", vec!["src"]),
            ("mentor", vec!["docs"]),
            ("scribe", vec!["docs"]),
        ])
        .map(|(id, areas)| (id, areas.into_iter().map(str::to_owned).collect()))
        .collect();

        let goals = keyed(vec![
            ("security", GoalProfile::new("safety")),
            (
                "performance",
                GoalProfile::new("speed").with(OperationKind::Improve, "optimization"),
            ),
            (
                "qa",
                GoalProfile::new("thoroughness").with(OperationKind::Deploy, "stability"),
            ),
            (
                "frontend",
                GoalProfile::new("user_experience").with(OperationKind::Build, "feature_velocity"),
            ),
            (
                "backend",
                GoalProfile::new("reliability").with(OperationKind::Design, "scalability"),
            ),
            ("architect", GoalProfile::new("maintainability")),
            ("devops", GoalProfile::new("automation")),
            ("refactorer", GoalProfile::new("simplicity")),
            ("analyzer", GoalProfile::new("insight")),
            ("mentor", GoalProfile::new("understanding")),
            ("scribe", GoalProfile::new("clarity")),
        ])
        .collect();

        Self {
            resource_areas,
            goals,
            incompatible_goals: [
                ("speed", "thoroughness"),
                ("speed", "safety"),
                ("feature_velocity", "stability"),
                ("feature_velocity", "maintainability"),
                ("optimization", "simplicity"),
                ("automation", "thoroughness"),
            ]
            .iter()
            .map(|(a, b)| ((*a).to_owned(), (*b).to_owned()))
            .collect(),
            unsafe_markers: owned(&[
                "skip-validation",
                "skip_validation",
                "--force",
                "--no-verify",
            ]),
            credential_markers: owned(&[
                "credential",
                "secret",
                ".env",
                "password",
                "private_key",
                "token",
            ]),
            unsafe_flags: owned(&["skip_validation", "unsafe", "force"]),
        }
    }

    /// Resource areas a perspective claims on every request.
    #[must_use]
    pub fn default_resource_areas(&self, id: &PerspectiveId) -> &[String] {
        self.resource_areas.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Goal pursued by `id` for the given kind of operation.
    #[must_use]
    pub fn goal_for(&self, id: &PerspectiveId, kind: OperationKind) -> Option<&str> {
        self.goals.get(id).map(|profile| profile.goal(kind))
    }

    /// Goal pairs that cannot both be satisfied.
    #[must_use]
    pub fn incompatible_goal_pairs(&self) -> &[(String, String)] {
        &self.incompatible_goals
    }

    /// Returns `true` when the two goals are listed as incompatible in either order.
    #[must_use]
    pub fn goals_conflict(&self, a: &str, b: &str) -> bool {
        self.incompatible_goals
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    /// Operation-text markers of unsafe execution.
    #[must_use]
    pub fn unsafe_markers(&self) -> &[String] {
        &self.unsafe_markers
    }

    /// Target-name markers of credential material.
    #[must_use]
    pub fn credential_markers(&self) -> &[String] {
        &self.credential_markers
    }

    /// Context flags that request unsafe execution.
    #[must_use]
    pub fn unsafe_flags(&self) -> &[String] {
        &self.unsafe_flags
    }

    fn requests_unsafe(&self, context: &ExecutionContext) -> bool {
        let operation = context.operation().to_lowercase();
        self.unsafe_markers
            .iter()
            .any(|marker| operation.contains(marker.as_str()))
            || self.unsafe_flags.iter().any(|flag| context.flag_enabled(flag))
    }

    fn exposes_credentials(&self, context: &ExecutionContext) -> bool {
        context.targets().iter().any(|target| {
            let target = target.to_lowercase();
            self.credential_markers
                .iter()
                .any(|marker| target.contains(marker.as_str()))
        })
    }
}

type PairClassifier = fn(
    &ConflictDetector<'_>,
    &PerspectiveId,
    &PerspectiveId,
    &ExecutionContext,
) -> Option<Conflict>;

/// Pairwise classifiers in precedence order; the first match wins.
const PAIR_CLASSIFIERS: [PairClassifier; 3] = [classify_veto, classify_direct, classify_negotiable];

/// Finds conflicts among a set of perspectives for one request.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector<'a> {
    matrix: &'a PriorityMatrix,
    catalog: &'a DetectionCatalog,
}

impl<'a> ConflictDetector<'a> {
    /// Creates a detector over the supplied tables.
    #[must_use]
    pub fn new(matrix: &'a PriorityMatrix, catalog: &'a DetectionCatalog) -> Self {
        Self { matrix, catalog }
    }

    /// Detects every conflict among `perspectives`.
    ///
    /// Pairwise conflicts come first in pair order, then one resource
    /// conflict per shared resource (by resource name), then goal conflicts.
    #[must_use]
    pub fn detect(
        &self,
        perspectives: &[PerspectiveId],
        context: &ExecutionContext,
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for (i, a) in perspectives.iter().enumerate() {
            for b in &perspectives[i + 1..] {
                conflicts.extend(self.classify_pair(a, b, context));
            }
        }
        conflicts.extend(self.resource_conflicts(perspectives, context));
        conflicts.extend(self.goal_conflicts(perspectives, context));
        conflicts
    }

    /// Classifies one pair as Veto, Direct, or Negotiable, in that precedence.
    #[must_use]
    pub fn classify_pair(
        &self,
        a: &PerspectiveId,
        b: &PerspectiveId,
        context: &ExecutionContext,
    ) -> Option<Conflict> {
        PAIR_CLASSIFIERS
            .iter()
            .find_map(|classify| classify(self, a, b, context))
    }

    /// Returns `true` when one of `id`'s veto triggers matches the request.
    #[must_use]
    pub fn vetoes(&self, id: &PerspectiveId, context: &ExecutionContext) -> bool {
        self.matrix
            .veto_triggers(id)
            .iter()
            .any(|trigger| self.trigger_matches(trigger, context))
    }

    fn trigger_matches(&self, trigger: &str, context: &ExecutionContext) -> bool {
        match trigger {
            "unsafe_operations" | "skip_validation" => self.catalog.requests_unsafe(context),
            "credential_exposure" => self.catalog.exposes_credentials(context),
            "production_changes" => context.is_production(),
            _ => false,
        }
    }

    fn resource_conflicts(
        &self,
        perspectives: &[PerspectiveId],
        context: &ExecutionContext,
    ) -> Vec<Conflict> {
        let mut claims: BTreeMap<&str, Vec<&PerspectiveId>> = BTreeMap::new();
        for id in perspectives {
            let mut resources: Vec<&str> = context
                .targets()
                .iter()
                .chain(self.catalog.default_resource_areas(id))
                .map(String::as_str)
                .collect();
            resources.sort_unstable();
            resources.dedup();
            for resource in resources {
                claims.entry(resource).or_default().push(id);
            }
        }

        claims
            .into_iter()
            .filter(|(_, claimants)| claimants.len() > 1)
            .map(|(resource, claimants)| {
                Conflict::new(
                    ConflictType::Resource,
                    claimants.into_iter().cloned().collect(),
                    format!("shared access to {resource}"),
                )
                .with_resource(resource)
            })
            .collect()
    }

    fn goal_conflicts(
        &self,
        perspectives: &[PerspectiveId],
        context: &ExecutionContext,
    ) -> Vec<Conflict> {
        let kind = OperationKind::classify(context.operation());
        let goals: Vec<(&PerspectiveId, &str)> = perspectives
            .iter()
            .filter_map(|id| self.catalog.goal_for(id, kind).map(|goal| (id, goal)))
            .collect();

        let mut conflicts = Vec::new();
        for (i, (a, goal_a)) in goals.iter().enumerate() {
            for (b, goal_b) in &goals[i + 1..] {
                if self.catalog.goals_conflict(goal_a, goal_b) {
                    conflicts.push(
                        Conflict::new(
                            ConflictType::Goal,
                            vec![(*a).clone(), (*b).clone()],
                            format!("{a} pursues {goal_a} while {b} pursues {goal_b}"),
                        )
                        .with_goals([*goal_a, *goal_b]),
                    );
                }
            }
        }
        conflicts
    }
}

fn classify_veto(
    detector: &ConflictDetector<'_>,
    a: &PerspectiveId,
    b: &PerspectiveId,
    context: &ExecutionContext,
) -> Option<Conflict> {
    let vetoer = [a, b]
        .into_iter()
        .find(|id| detector.vetoes(id, context))?;
    Some(
        Conflict::new(
            ConflictType::Veto,
            vec![a.clone(), b.clone()],
            format!("{vetoer} vetoes the operation"),
        )
        .resolved_by(vetoer.clone(), "veto"),
    )
}

fn classify_direct(
    detector: &ConflictDetector<'_>,
    a: &PerspectiveId,
    b: &PerspectiveId,
    _context: &ExecutionContext,
) -> Option<Conflict> {
    let (winner, loser) = if detector.matrix.can_override(a, b) {
        (a, b)
    } else if detector.matrix.can_override(b, a) {
        (b, a)
    } else {
        return None;
    };
    Some(
        Conflict::new(
            ConflictType::Direct,
            vec![a.clone(), b.clone()],
            format!("{winner} overrides {loser}"),
        )
        .resolved_by(winner.clone(), "priority_override"),
    )
}

fn classify_negotiable(
    detector: &ConflictDetector<'_>,
    a: &PerspectiveId,
    b: &PerspectiveId,
    _context: &ExecutionContext,
) -> Option<Conflict> {
    detector.matrix.needs_negotiation(a, b).then(|| {
        Conflict::new(
            ConflictType::Negotiable,
            vec![a.clone(), b.clone()],
            format!("{a} and {b} must negotiate"),
        )
    })
}

fn keyed<T>(entries: Vec<(&str, T)>) -> impl Iterator<Item = (PerspectiveId, T)> {
    entries
        .into_iter()
        .filter_map(|(id, value)| PerspectiveId::new(id).ok().map(|id| (id, value)))
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_primitives::Severity;

    fn id(raw: &str) -> PerspectiveId {
        PerspectiveId::new(raw).unwrap()
    }

    fn ids(raw: &[&str]) -> Vec<PerspectiveId> {
        raw.iter().map(|r| id(r)).collect()
    }

    fn tables() -> (PriorityMatrix, DetectionCatalog) {
        (PriorityMatrix::standard(), DetectionCatalog::standard())
    }

    #[test]
    fn operation_kinds() {
        assert_eq!(OperationKind::classify("Deploy to prod"), OperationKind::Deploy);
        assert_eq!(OperationKind::classify("cut a release"), OperationKind::Deploy);
        assert_eq!(OperationKind::classify("run tests"), OperationKind::Test);
        assert_eq!(OperationKind::classify("design api"), OperationKind::Design);
        assert_eq!(OperationKind::classify("implement login"), OperationKind::Build);
        assert_eq!(OperationKind::classify("audit deps"), OperationKind::Analyze);
        assert_eq!(OperationKind::classify("refactor module"), OperationKind::Improve);
        assert_eq!(OperationKind::classify("update docs"), OperationKind::General);
    }

    #[test]
    fn veto_takes_precedence_over_override() {
        let (matrix, catalog) = tables();
        let detector = ConflictDetector::new(&matrix, &catalog);
        let ctx = ExecutionContext::new("deploy --skip-validation");

        let conflict = detector
            .classify_pair(&id("security"), &id("performance"), &ctx)
            .unwrap();
        assert_eq!(conflict.kind(), ConflictType::Veto);
        assert_eq!(conflict.severity(), Severity::Critical);
        assert_eq!(conflict.resolution().unwrap().winner, id("security"));
    }

    #[test]
    fn pair_classification_is_order_independent() {
        let (matrix, catalog) = tables();
        let detector = ConflictDetector::new(&matrix, &catalog);
        let ctx = ExecutionContext::new("design");
        let pairs = [
            ("architect", "frontend"),
            ("qa", "performance"),
            ("security", "frontend"),
            ("analyzer", "frontend"),
            ("mentor", "data-steward"),
        ];

        for (a, b) in pairs {
            let forward = detector.classify_pair(&id(a), &id(b), &ctx);
            let backward = detector.classify_pair(&id(b), &id(a), &ctx);
            assert_eq!(
                forward.as_ref().map(|c| (c.kind(), c.severity())),
                backward.as_ref().map(|c| (c.kind(), c.severity())),
                "{a}/{b}"
            );
            assert_eq!(
                forward.and_then(|c| c.resolution().cloned()),
                backward.and_then(|c| c.resolution().cloned())
            );
        }
    }

    #[test]
    fn veto_triggers() {
        let (matrix, catalog) = tables();
        let detector = ConflictDetector::new(&matrix, &catalog);

        let forced = ExecutionContext::new("push --force");
        assert!(detector.vetoes(&id("security"), &forced));
        assert!(!detector.vetoes(&id("qa"), &ExecutionContext::new("push")));

        let flagged = ExecutionContext::new("push").with_flag("skip_validation", true);
        assert!(detector.vetoes(&id("qa"), &flagged));

        let secrets = ExecutionContext::new("edit").with_target("config/.env.local");
        assert!(detector.vetoes(&id("security"), &secrets));

        let prod = ExecutionContext::new("restart").with_environment("production");
        assert!(detector.vetoes(&id("devops"), &prod));
        assert!(!detector.vetoes(&id("security"), &prod));
    }

    #[test]
    fn unknown_triggers_never_match() {
        let matrix = PriorityMatrix::default().with_profile(
            id("compliance"),
            crate::PriorityProfile::new(5).with_veto_triggers(["full_moon"]),
        );
        let catalog = DetectionCatalog::standard();
        let detector = ConflictDetector::new(&matrix, &catalog);
        let ctx = ExecutionContext::new("deploy --force").with_environment("production");
        assert!(!detector.vetoes(&id("compliance"), &ctx));
    }

    #[test]
    fn one_resource_conflict_per_shared_resource() {
        let (matrix, catalog) = tables();
        let detector = ConflictDetector::new(&matrix, &catalog);
        let ctx = ExecutionContext::new("update").with_target("src/lib.rs");

        let conflicts = detector.detect(&ids(&["backend", "performance", "mentor"]), &ctx);
        let resources: Vec<_> = conflicts
            .iter()
            .filter(|c| c.kind() == ConflictType::Resource)
            .map(|c| (c.resource().unwrap(), c.participants().len()))
            .collect();
        assert_eq!(resources, [("database", 2), ("src/lib.rs", 3)]);
    }

    #[test]
    fn goal_conflicts_use_operation_specific_goals() {
        let (matrix, catalog) = tables();
        let detector = ConflictDetector::new(&matrix, &catalog);

        let pair = ids(&["frontend", "architect"]);
        let build = detector.detect(&pair, &ExecutionContext::new("build"));
        let goal = build
            .iter()
            .find(|c| c.kind() == ConflictType::Goal)
            .unwrap();
        assert_eq!(goal.goals(), ["feature_velocity", "maintainability"]);
        assert_eq!(goal.severity(), Severity::Low);

        let review = detector.detect(&pair, &ExecutionContext::new("review"));
        assert!(review.iter().all(|c| c.kind() != ConflictType::Goal));
    }

    #[test]
    fn unrelated_perspectives_produce_nothing() {
        let (matrix, catalog) = tables();
        let detector = ConflictDetector::new(&matrix, &catalog);
        let conflicts = detector.detect(
            &ids(&["data-steward", "qa"]),
            &ExecutionContext::new("inspect"),
        );
        assert!(conflicts.is_empty());
    }
}
