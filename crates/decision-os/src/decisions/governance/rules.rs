use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::decisions::catalog::ConfidenceBand;
use crate::decisions::domain::DecisionMetadata;
use crate::decisions::explanation::Explanation;
use crate::decisions::scoring::ScoreResult;

/// Roles held by whoever is asking for approval.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApproverRoles(BTreeSet<String>);

impl ApproverRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a readiness rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessContext<'a> {
    pub score: &'a ScoreResult,
    pub explanation: &'a Explanation,
    pub expected_criteria: usize,
    pub metadata: &'a DecisionMetadata,
    pub roles: &'a ApproverRoles,
    pub tolerance: f64,
}

/// Pass/fail plus what was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub passed: bool,
    pub detail: String,
}

impl RuleOutcome {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }

    fn check(passed: bool, detail: impl Into<String>) -> Self {
        Self {
            passed,
            detail: detail.into(),
        }
    }
}

/// Single evaluation contract shared by every readiness predicate.
pub trait ReadinessCheck {
    fn evaluate(&self, context: &ReadinessContext<'_>) -> RuleOutcome;
}

/// Declarative readiness predicates understood by the governance gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessRule {
    MinimumScore { threshold: f64 },
    ExplanationCompleteness { threshold: f64 },
    RolePresent { role: String },
    OwnerAssigned,
    AccountabilityConfirmed,
    RisksDocumented {
        #[serde(default)]
        irreversible_only: bool,
    },
    MetadataCompleteness { threshold: f64 },
    /// Confident scores must be backed by documented assumptions, and high ones by risks.
    NoOverconfidence,
    /// Score floor that only binds decisions of one type.
    SeverityFloor {
        decision_type: String,
        #[serde(default)]
        one_way_only: bool,
        threshold: f64,
    },
}

impl ReadinessRule {
    pub fn threshold(&self) -> Option<f64> {
        match self {
            ReadinessRule::MinimumScore { threshold }
            | ReadinessRule::ExplanationCompleteness { threshold }
            | ReadinessRule::MetadataCompleteness { threshold }
            | ReadinessRule::SeverityFloor { threshold, .. } => Some(*threshold),
            _ => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            ReadinessRule::MinimumScore { threshold } => {
                format!("total score at least {threshold:.3}")
            }
            ReadinessRule::ExplanationCompleteness { threshold } => {
                format!("explanation completeness at least {threshold:.3}")
            }
            ReadinessRule::RolePresent { role } => format!("approver holds role '{role}'"),
            ReadinessRule::OwnerAssigned => "decision owner assigned".to_string(),
            ReadinessRule::AccountabilityConfirmed => "owner confirmed accountability".to_string(),
            ReadinessRule::RisksDocumented { irreversible_only } => {
                if *irreversible_only {
                    "risks documented for one-way decisions".to_string()
                } else {
                    "risks documented".to_string()
                }
            }
            ReadinessRule::MetadataCompleteness { threshold } => {
                format!("decision brief completeness at least {threshold:.3}")
            }
            ReadinessRule::NoOverconfidence => {
                "confidence backed by documented risks and assumptions".to_string()
            }
            ReadinessRule::SeverityFloor {
                decision_type,
                one_way_only,
                threshold,
            } => {
                let scope = if *one_way_only { "one-way " } else { "" };
                format!("{scope}{decision_type} decisions score at least {threshold:.3}")
            }
        }
    }
}

impl ReadinessCheck for ReadinessRule {
    fn evaluate(&self, context: &ReadinessContext<'_>) -> RuleOutcome {
        match self {
            ReadinessRule::MinimumScore { threshold } => {
                let total = context.score.total_score;
                RuleOutcome::check(
                    total >= *threshold,
                    format!("total score {total:.4} against threshold {threshold:.4}"),
                )
            }
            ReadinessRule::ExplanationCompleteness { threshold } => {
                let completeness = context
                    .explanation
                    .completeness(context.expected_criteria, context.tolerance);
                RuleOutcome::check(
                    completeness >= *threshold,
                    format!("explanation completeness {completeness:.4} against {threshold:.4}"),
                )
            }
            ReadinessRule::RolePresent { role } => {
                if context.roles.contains(role) {
                    RuleOutcome::pass(format!("role '{role}' present"))
                } else {
                    RuleOutcome::fail(format!("role '{role}' missing"))
                }
            }
            ReadinessRule::OwnerAssigned => {
                if context.metadata.has_owner() {
                    RuleOutcome::pass(format!("owner '{}'", context.metadata.owner.trim()))
                } else {
                    RuleOutcome::fail("no owner assigned")
                }
            }
            ReadinessRule::AccountabilityConfirmed => RuleOutcome::check(
                context.metadata.responsibility_confirmed,
                if context.metadata.responsibility_confirmed {
                    "accountability confirmed"
                } else {
                    "accountability not confirmed"
                },
            ),
            ReadinessRule::RisksDocumented { irreversible_only } => {
                let class = context.metadata.decision_class;
                if *irreversible_only && !class.is_irreversible() {
                    RuleOutcome::pass(format!("not required for {} decisions", class.label()))
                } else if context.metadata.has_risks() {
                    RuleOutcome::pass(format!("{} risk(s) documented", context.metadata.risks.len()))
                } else {
                    RuleOutcome::fail(format!("no risks documented for {} decision", class.label()))
                }
            }
            ReadinessRule::MetadataCompleteness { threshold } => {
                let completeness = context.metadata.completeness();
                let missing = context.metadata.missing_fields();
                let detail = if missing.is_empty() {
                    format!("brief completeness {completeness:.3}")
                } else {
                    format!(
                        "brief completeness {completeness:.3}; missing {}",
                        missing.join(", ")
                    )
                };
                RuleOutcome::check(completeness >= *threshold, detail)
            }
            ReadinessRule::NoOverconfidence => {
                let band = context.score.confidence();
                let metadata = context.metadata;
                let has_assumptions = metadata
                    .assumptions
                    .iter()
                    .any(|assumption| !assumption.trim().is_empty());
                match band {
                    ConfidenceBand::High if !metadata.has_risks() => RuleOutcome::fail(
                        "high confidence without documented risks suggests overconfidence",
                    ),
                    ConfidenceBand::High | ConfidenceBand::Medium if !has_assumptions => {
                        RuleOutcome::fail(format!(
                            "{} confidence is not backed by explicit assumptions",
                            band.label().to_lowercase()
                        ))
                    }
                    _ => RuleOutcome::pass(format!(
                        "{} confidence is backed by the brief",
                        band.label().to_lowercase()
                    )),
                }
            }
            ReadinessRule::SeverityFloor {
                decision_type,
                one_way_only,
                threshold,
            } => {
                let metadata = context.metadata;
                let type_matches = metadata
                    .decision_type
                    .trim()
                    .eq_ignore_ascii_case(decision_type.trim());
                let class_matches =
                    !*one_way_only || metadata.decision_class.is_irreversible();
                if !(type_matches && class_matches) {
                    return RuleOutcome::pass(format!(
                        "not required for {} {} decisions",
                        metadata.decision_class.label(),
                        if metadata.decision_type.trim().is_empty() {
                            "untyped"
                        } else {
                            metadata.decision_type.trim()
                        }
                    ));
                }
                let total = context.score.total_score;
                RuleOutcome::check(
                    total >= *threshold,
                    format!("total score {total:.4} against {decision_type} floor {threshold:.4}"),
                )
            }
        }
    }
}
