//! Governance lifecycle for decisions.
//!
//! `Draft -> UnderReview -> {Approved, Rejected}`, `Approved -> Locked`, `Rejected -> Draft`.
//! Every attempted transition, refused or not, produces exactly one [`TransitionRecord`]
//! which is appended to the decision's history before any error is handed back.

pub mod config;
pub mod rules;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::criteria::{CriteriaModel, DEFAULT_TOLERANCE};
use super::domain::{Decision, DecisionId};
use super::explanation::ExplanationBuilder;
use super::history::{EntryPayload, HistoryError, Verification};

pub use config::{NamedRule, RuleBook, RuleSet, RuleSetError};
pub use rules::{ApproverRoles, ReadinessCheck, ReadinessContext, ReadinessRule, RuleOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceState {
    Draft,
    UnderReview,
    Approved,
    Rejected,
    Locked,
}

impl GovernanceState {
    pub fn label(self) -> &'static str {
        match self {
            GovernanceState::Draft => "draft",
            GovernanceState::UnderReview => "under_review",
            GovernanceState::Approved => "approved",
            GovernanceState::Rejected => "rejected",
            GovernanceState::Locked => "locked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    SubmitForReview,
    EvaluateReadiness,
    Lock,
    Reopen,
}

impl Transition {
    /// The only state this transition may start from.
    pub fn source(self) -> GovernanceState {
        match self {
            Transition::SubmitForReview => GovernanceState::Draft,
            Transition::EvaluateReadiness => GovernanceState::UnderReview,
            Transition::Lock => GovernanceState::Approved,
            Transition::Reopen => GovernanceState::Rejected,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Transition::SubmitForReview => "submit_for_review",
            Transition::EvaluateReadiness => "evaluate_readiness",
            Transition::Lock => "lock",
            Transition::Reopen => "reopen",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied,
    Refused { reason: String },
}

/// Result of a single readiness rule, as recorded in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Audit payload for one attempted transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub transition: Transition,
    pub from: GovernanceState,
    pub to: GovernanceState,
    pub outcome: TransitionOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<RuleVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_set: Option<String>,
    /// Input hash of the score the transition was judged against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_hash: Option<String>,
}

impl TransitionRecord {
    fn applied(transition: Transition, from: GovernanceState, to: GovernanceState) -> Self {
        Self {
            transition,
            from,
            to,
            outcome: TransitionOutcome::Applied,
            failed_rules: Vec::new(),
            verdicts: Vec::new(),
            rule_set: None,
            score_hash: None,
        }
    }

    fn refused(transition: Transition, state: GovernanceState, reason: String) -> Self {
        Self {
            transition,
            from: state,
            to: state,
            outcome: TransitionOutcome::Refused { reason },
            failed_rules: Vec::new(),
            verdicts: Vec::new(),
            rule_set: None,
            score_hash: None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, TransitionOutcome::Applied)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("decision has no recorded score")]
    NoScoreRecorded,
    #[error("decision {0} is locked")]
    DecisionLocked(DecisionId),
    #[error("cannot {} from state {}", .transition.label(), .from.label())]
    InvalidTransition {
        transition: Transition,
        from: GovernanceState,
    },
    #[error("readiness rules failed: {}", .0.join(", "))]
    GovernanceRuleFailure(Vec<String>),
    #[error("history integrity violated at sequence {sequence}")]
    HistoryIntegrityViolation { sequence: u64 },
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Outcome of an all-or-nothing readiness evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub approved: bool,
    pub state: GovernanceState,
    pub failed_rules: Vec<String>,
    pub verdicts: Vec<RuleVerdict>,
}

impl ReadinessReport {
    pub fn from_transition(record: &TransitionRecord) -> Self {
        Self {
            approved: record.to == GovernanceState::Approved,
            state: record.to,
            failed_rules: record.failed_rules.clone(),
            verdicts: record.verdicts.clone(),
        }
    }

    /// Turn a rejection into [`GovernanceError::GovernanceRuleFailure`].
    pub fn into_result(self) -> Result<ReadinessReport, GovernanceError> {
        if self.approved {
            Ok(self)
        } else {
            Err(GovernanceError::GovernanceRuleFailure(self.failed_rules))
        }
    }
}

/// A transition that has been judged but not yet recorded.
#[derive(Debug)]
pub struct TransitionAttempt {
    pub record: TransitionRecord,
    pub refusal: Option<GovernanceError>,
}

impl TransitionAttempt {
    fn accept(record: TransitionRecord) -> Self {
        Self {
            record,
            refusal: None,
        }
    }

    fn refuse(transition: Transition, state: GovernanceState, error: GovernanceError) -> Self {
        let record = TransitionRecord::refused(transition, state, error.to_string());
        Self {
            record,
            refusal: Some(error),
        }
    }

    pub fn payload(&self) -> EntryPayload {
        EntryPayload::GovernanceTransition(self.record.clone())
    }

    /// The recorded outcome, or the refusal once the record has been persisted.
    pub fn into_result(self) -> Result<TransitionRecord, GovernanceError> {
        match self.refusal {
            Some(error) => Err(error),
            None => Ok(self.record),
        }
    }
}

/// Stateless judge of governance transitions.
#[derive(Debug, Clone, Copy)]
pub struct GovernanceGate {
    tolerance: f64,
}

impl Default for GovernanceGate {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl GovernanceGate {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn precondition(&self, decision: &Decision, transition: Transition) -> Option<GovernanceError> {
        let state = decision.state();
        if state == GovernanceState::Locked {
            Some(GovernanceError::DecisionLocked(decision.id().clone()))
        } else if state != transition.source() {
            Some(GovernanceError::InvalidTransition {
                transition,
                from: state,
            })
        } else {
            None
        }
    }

    fn integrity(&self, decision: &Decision) -> Option<GovernanceError> {
        match decision.history().verify() {
            Verification::Intact { .. } => None,
            Verification::Broken { sequence, fault } => {
                warn!(
                    decision_id = %decision.id(),
                    sequence,
                    fault = fault.describe(),
                    "history integrity violation halts approval"
                );
                Some(GovernanceError::HistoryIntegrityViolation { sequence })
            }
        }
    }

    pub fn plan_submit(&self, decision: &Decision) -> TransitionAttempt {
        let transition = Transition::SubmitForReview;
        let state = decision.state();
        if let Some(error) = self.precondition(decision, transition) {
            return TransitionAttempt::refuse(transition, state, error);
        }
        let Some(score) = decision.latest_score() else {
            return TransitionAttempt::refuse(transition, state, GovernanceError::NoScoreRecorded);
        };

        let mut record = TransitionRecord::applied(transition, state, GovernanceState::UnderReview);
        record.score_hash = Some(score.input_hash.clone());
        TransitionAttempt::accept(record)
    }

    /// Evaluate every rule against the latest score; approval only if all pass.
    pub fn plan_readiness(
        &self,
        decision: &Decision,
        model: &CriteriaModel,
        rule_set: &RuleSet,
        roles: &ApproverRoles,
    ) -> TransitionAttempt {
        let transition = Transition::EvaluateReadiness;
        let state = decision.state();
        if let Some(error) = self
            .precondition(decision, transition)
            .or_else(|| self.integrity(decision))
        {
            return TransitionAttempt::refuse(transition, state, error);
        }
        let Some(score) = decision.latest_score() else {
            return TransitionAttempt::refuse(transition, state, GovernanceError::NoScoreRecorded);
        };

        let explanation = ExplanationBuilder::new().explain(score);
        let context = ReadinessContext {
            score,
            explanation: &explanation,
            expected_criteria: model.len(),
            metadata: decision.metadata(),
            roles,
            tolerance: self.tolerance,
        };

        let verdicts: Vec<RuleVerdict> = rule_set
            .rules()
            .iter()
            .map(|named| {
                let outcome = named.rule.evaluate(&context);
                RuleVerdict {
                    name: named.name.clone(),
                    passed: outcome.passed,
                    detail: outcome.detail,
                }
            })
            .collect();
        let failed_rules: Vec<String> = verdicts
            .iter()
            .filter(|verdict| !verdict.passed)
            .map(|verdict| verdict.name.clone())
            .collect();

        let to = if failed_rules.is_empty() {
            GovernanceState::Approved
        } else {
            GovernanceState::Rejected
        };
        let mut record = TransitionRecord::applied(transition, state, to);
        record.verdicts = verdicts;
        record.failed_rules = failed_rules;
        record.rule_set = Some(rule_set.name().to_string());
        record.score_hash = Some(score.input_hash.clone());
        TransitionAttempt::accept(record)
    }

    pub fn plan_lock(&self, decision: &Decision) -> TransitionAttempt {
        let transition = Transition::Lock;
        let state = decision.state();
        match self
            .precondition(decision, transition)
            .or_else(|| self.integrity(decision))
        {
            Some(error) => TransitionAttempt::refuse(transition, state, error),
            None => TransitionAttempt::accept(TransitionRecord::applied(
                transition,
                state,
                GovernanceState::Locked,
            )),
        }
    }

    pub fn plan_reopen(&self, decision: &Decision) -> TransitionAttempt {
        let transition = Transition::Reopen;
        let state = decision.state();
        match self.precondition(decision, transition) {
            Some(error) => TransitionAttempt::refuse(transition, state, error),
            None => TransitionAttempt::accept(TransitionRecord::applied(
                transition,
                state,
                GovernanceState::Draft,
            )),
        }
    }

    /// Record an attempt on an in-memory decision and surface its outcome.
    pub fn record(
        &self,
        decision: &mut Decision,
        attempt: TransitionAttempt,
    ) -> Result<TransitionRecord, GovernanceError> {
        decision.append(attempt.payload())?;
        log_transition(decision.id(), &attempt.record);
        attempt.into_result()
    }

    pub fn submit_for_review(
        &self,
        decision: &mut Decision,
    ) -> Result<TransitionRecord, GovernanceError> {
        let attempt = self.plan_submit(decision);
        self.record(decision, attempt)
    }

    /// Failing rules still move the decision to rejected; the report is returned either
    /// way so callers can decide whether a rejection is an error for them.
    pub fn evaluate_readiness(
        &self,
        decision: &mut Decision,
        model: &CriteriaModel,
        rule_set: &RuleSet,
        roles: &ApproverRoles,
    ) -> Result<ReadinessReport, GovernanceError> {
        let attempt = self.plan_readiness(decision, model, rule_set, roles);
        let record = self.record(decision, attempt)?;
        Ok(ReadinessReport::from_transition(&record))
    }

    pub fn lock(&self, decision: &mut Decision) -> Result<TransitionRecord, GovernanceError> {
        let attempt = self.plan_lock(decision);
        self.record(decision, attempt)
    }

    pub fn reopen(&self, decision: &mut Decision) -> Result<TransitionRecord, GovernanceError> {
        let attempt = self.plan_reopen(decision);
        self.record(decision, attempt)
    }
}

pub(crate) fn log_transition(decision_id: &DecisionId, record: &TransitionRecord) {
    match &record.outcome {
        TransitionOutcome::Applied => info!(
            decision_id = %decision_id,
            transition = record.transition.label(),
            from = record.from.label(),
            to = record.to.label(),
            failed_rules = ?record.failed_rules,
            "governance transition applied"
        ),
        TransitionOutcome::Refused { reason } => warn!(
            decision_id = %decision_id,
            transition = record.transition.label(),
            state = record.from.label(),
            reason = %reason,
            "governance transition refused"
        ),
    }
}
