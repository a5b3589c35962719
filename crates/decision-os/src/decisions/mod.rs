//! Decision scoring, explanation, governance, stress testing, and the audit ledger.
//!
//! The engines (`scoring`, `explanation`, `scenario`) are pure functions of their inputs.
//! `history` and `governance` hold the only mutable state, which `service` serializes
//! per decision before handing it to a [`DecisionRepository`].

pub mod analytics;
pub mod catalog;
pub mod criteria;
pub mod domain;
pub mod explanation;
pub mod governance;
mod hashing;
pub mod history;
pub mod playbook;
pub mod registry;
pub mod repository;
pub mod router;
pub mod scenario;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use analytics::{
    AccuracyMetrics, Calibration, DecisionSnapshot, PortfolioMetrics, Prediction, WeakCriterion,
};
pub use catalog::{builtin_template, builtin_templates, ConfidenceBand};
pub use criteria::{
    CriteriaModel, CriteriaModelError, Criterion, Direction, ModelVersion, OutcomeBand, Scale,
    DEFAULT_TOLERANCE,
};
pub use domain::{
    Decision, DecisionClass, DecisionHeader, DecisionId, DecisionMetadata, DecisionView,
    FollowUp, FollowUpOutcome, ValidityContract,
};
pub use explanation::{Explanation, ExplanationBuilder, ExplanationEntry};
pub use governance::{
    ApproverRoles, GovernanceError, GovernanceGate, GovernanceState, NamedRule,
    ReadinessReport, ReadinessRule, RuleBook, RuleSet, RuleSetError, RuleVerdict, Transition,
    TransitionOutcome, TransitionRecord,
};
pub use hashing::GENESIS_HASH;
pub use history::{
    DecisionHistory, EntryKind, EntryPayload, HistoryEntry, HistoryError, IntegrityFault,
    Verification,
};
pub use playbook::{FocusArea, Playbook};
pub use registry::{Admission, ModelRegistry, RegistryError};
pub use repository::{DecisionRepository, RepositoryError};
pub use router::decision_router;
pub use scenario::{
    Delta, Perturbation, PerturbationTarget, RankShift, ScenarioEngine, ScenarioError,
    ScenarioKind, ScenarioRun, ScoreDelta, SensitivityReport, StressTest,
};
pub use scoring::{Alternative, Contribution, ScoreResult, ScoringEngine, ScoringError};
pub use service::{DecisionService, DecisionServiceError};
