use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::analytics::{DecisionSnapshot, PortfolioMetrics};
use super::criteria::{CriteriaModel, CriteriaModelError, ModelVersion};
use super::domain::{
    Decision, DecisionHeader, DecisionId, DecisionMetadata, DecisionView, FollowUp,
    FollowUpOutcome, ValidityContract,
};
use super::explanation::{Explanation, ExplanationBuilder};
use super::governance::{
    log_transition, ApproverRoles, GovernanceError, GovernanceGate, GovernanceState,
    ReadinessReport, RuleBook, RuleSet, TransitionAttempt, TransitionRecord,
};
use super::history::{EntryPayload, HistoryEntry, HistoryError, Verification};
use super::playbook::Playbook;
use super::registry::{Admission, ModelRegistry, RegistryError};
use super::repository::{DecisionRepository, RepositoryError};
use super::scenario::{Perturbation, ScenarioEngine, ScenarioError, SensitivityReport};
use super::scoring::{Alternative, ScoreResult, ScoringEngine, ScoringError};

type DecisionHandle = Arc<Mutex<Decision>>;

/// Service composing the engines, the model registry, and the repository.
///
/// Writes to one decision are serialized through that decision's mutex; every entry is
/// persisted before the in-memory ledger advances. Models registered through the service
/// are persisted before they become visible in the registry.
pub struct DecisionService<R> {
    repository: Arc<R>,
    registry: Arc<ModelRegistry>,
    scoring: ScoringEngine,
    explanations: ExplanationBuilder,
    gate: GovernanceGate,
    scenarios: ScenarioEngine,
    decisions: Mutex<HashMap<DecisionId, DecisionHandle>>,
    registrations: Mutex<()>,
}

impl<R> DecisionService<R>
where
    R: DecisionRepository + 'static,
{
    pub fn new(repository: Arc<R>, registry: Arc<ModelRegistry>, tolerance: f64) -> Self {
        Self {
            repository,
            registry,
            scoring: ScoringEngine::new(),
            explanations: ExplanationBuilder::new(),
            gate: GovernanceGate::new(tolerance),
            scenarios: ScenarioEngine::new(tolerance),
            decisions: Mutex::new(HashMap::new()),
            registrations: Mutex::new(()),
        }
    }

    /// Build the service and register every model the repository has stored.
    pub fn open(
        repository: Arc<R>,
        registry: Arc<ModelRegistry>,
        tolerance: f64,
    ) -> Result<Self, DecisionServiceError> {
        let service = Self::new(repository, registry, tolerance);
        service.restore_models()?;
        Ok(service)
    }

    /// Register persisted models with the registry, returning how many were stored.
    pub fn restore_models(&self) -> Result<usize, DecisionServiceError> {
        let models = self.repository.models()?;
        let count = models.len();
        for model in models {
            self.registry.register(model)?;
        }
        if count > 0 {
            info!(models = count, "restored persisted criteria models");
        }
        Ok(count)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Register and persist a model. Identical re-registration is a no-op.
    pub fn register_model(
        &self,
        model: CriteriaModel,
    ) -> Result<ModelVersion, DecisionServiceError> {
        let _registration = self.registrations.lock().map_err(|_| poisoned())?;
        let version = model.version_ref();
        if self.registry.admit(&model)? == Admission::AlreadyRegistered {
            return Ok(version);
        }
        self.repository.insert_model(&model)?;
        Ok(self.registry.register(model)?)
    }

    pub fn model(&self, version: &ModelVersion) -> Result<Arc<CriteriaModel>, DecisionServiceError> {
        self.registry
            .get(version)?
            .ok_or_else(|| DecisionServiceError::UnknownModel(version.clone()))
    }

    pub fn create(
        &self,
        model: ModelVersion,
        metadata: DecisionMetadata,
    ) -> Result<DecisionView, DecisionServiceError> {
        self.model(&model)?;
        let header = self.repository.insert(DecisionHeader::new(model, metadata))?;
        info!(decision_id = %header.id, model = %header.model, "decision created");
        self.adopt(Decision::new(header))
    }

    /// Start a new revision linked to `id`. The source decision is left untouched.
    pub fn revise(
        &self,
        id: &DecisionId,
        model: Option<ModelVersion>,
    ) -> Result<DecisionView, DecisionServiceError> {
        let source = self.load(id)?;
        let source_header = lock_decision(&source)?.header().clone();
        let model = model.unwrap_or_else(|| source_header.model.clone());
        self.model(&model)?;

        let header = self
            .repository
            .insert(source_header.next_revision(model, source_header.metadata.clone()))?;
        info!(
            decision_id = %header.id,
            parent_id = %source_header.id,
            revision = header.revision,
            "decision revised"
        );
        self.adopt(Decision::new(header))
    }

    pub fn get(&self, id: &DecisionId) -> Result<DecisionView, DecisionServiceError> {
        let handle = self.load(id)?;
        let decision = lock_decision(&handle)?;
        self.view(&decision)
    }

    /// Score an alternative and record the result. Invalid input is never recorded.
    pub fn score(
        &self,
        id: &DecisionId,
        alternative: Alternative,
    ) -> Result<ScoreResult, DecisionServiceError> {
        self.with_decision(id, |decision| {
            let model = self.model(&decision.header().model)?;
            let result = self.scoring.evaluate(&model, &alternative)?;
            self.persist(decision, EntryPayload::ScoreComputed(result.clone()))?;
            Ok(result)
        })
    }

    pub fn explain(&self, id: &DecisionId) -> Result<Explanation, DecisionServiceError> {
        self.with_decision(id, |decision| {
            let score = decision
                .latest_score()
                .ok_or(GovernanceError::NoScoreRecorded)?;
            Ok(self.explanations.explain(score))
        })
    }

    pub fn submit_for_review(
        &self,
        id: &DecisionId,
    ) -> Result<TransitionRecord, DecisionServiceError> {
        self.with_decision(id, |decision| {
            let attempt = self.gate.plan_submit(decision);
            self.record_transition(decision, attempt)
        })
    }

    /// All-or-nothing readiness check. A rejection is a normal outcome and is returned
    /// as a report; use [`ReadinessReport::into_result`] to treat it as an error.
    pub fn evaluate_readiness(
        &self,
        id: &DecisionId,
        rule_set: &RuleSet,
        roles: &ApproverRoles,
    ) -> Result<ReadinessReport, DecisionServiceError> {
        self.with_decision(id, |decision| self.judge(decision, rule_set, roles))
    }

    /// Readiness under the rule set `rules` assigns to the decision's type.
    pub fn evaluate_readiness_with(
        &self,
        id: &DecisionId,
        rules: &RuleBook,
        roles: &ApproverRoles,
    ) -> Result<ReadinessReport, DecisionServiceError> {
        self.with_decision(id, |decision| {
            let rule_set = rules.for_decision_type(&decision.metadata().decision_type);
            self.judge(decision, rule_set, roles)
        })
    }

    fn judge(
        &self,
        decision: &mut Decision,
        rule_set: &RuleSet,
        roles: &ApproverRoles,
    ) -> Result<ReadinessReport, DecisionServiceError> {
        let model = self.model(&decision.header().model)?;
        let attempt = self.gate.plan_readiness(decision, &model, rule_set, roles);
        let record = self.record_transition(decision, attempt)?;
        Ok(ReadinessReport::from_transition(&record))
    }

    pub fn lock(&self, id: &DecisionId) -> Result<TransitionRecord, DecisionServiceError> {
        self.with_decision(id, |decision| {
            let attempt = self.gate.plan_lock(decision);
            self.record_transition(decision, attempt)
        })
    }

    pub fn reopen(&self, id: &DecisionId) -> Result<TransitionRecord, DecisionServiceError> {
        self.with_decision(id, |decision| {
            let attempt = self.gate.plan_reopen(decision);
            self.record_transition(decision, attempt)
        })
    }

    /// Stress-test the latest scored alternative and record every run, bounding runs
    /// included.
    ///
    /// Runs are persisted one at a time. If the repository fails after some runs were
    /// written, those stay in the ledger and the error reports how many made it.
    pub fn stress_test(
        &self,
        id: &DecisionId,
        perturbations: &[Perturbation],
    ) -> Result<SensitivityReport, DecisionServiceError> {
        self.with_decision(id, |decision| {
            if decision.state() == GovernanceState::Locked {
                return Err(HistoryError::DecisionLocked(decision.id().clone()).into());
            }
            let baseline = decision
                .latest_score()
                .cloned()
                .ok_or(GovernanceError::NoScoreRecorded)?;
            let model = self.model(&decision.header().model)?;

            let report = self
                .scenarios
                .stress_test_from(&model, baseline, perturbations)
                .report()?;
            let total = report.all_runs().count();
            for (recorded, run) in report.all_runs().enumerate() {
                if let Err(source) =
                    self.persist(decision, EntryPayload::ScenarioExecuted(run.clone()))
                {
                    if recorded == 0 {
                        return Err(source);
                    }
                    warn!(
                        decision_id = %decision.id(),
                        recorded,
                        total,
                        error = %source,
                        "stress test interrupted"
                    );
                    return Err(DecisionServiceError::StressTestInterrupted {
                        recorded,
                        total,
                        source: Box::new(source),
                    });
                }
            }
            info!(
                decision_id = %decision.id(),
                perturbations = perturbations.len(),
                spread = ?report.spread,
                "stress test recorded"
            );
            Ok(report)
        })
    }

    /// Record what happened after a locked decision was carried out.
    pub fn record_outcome(
        &self,
        id: &DecisionId,
        outcome: FollowUpOutcome,
        notes: impl Into<String>,
    ) -> Result<FollowUp, DecisionServiceError> {
        let follow_up = FollowUp::new(outcome, notes);
        self.with_decision(id, |decision| {
            self.persist(decision, EntryPayload::OutcomeRecorded(follow_up.clone()))?;
            Ok(follow_up)
        })
    }

    pub fn playbook(&self, id: &DecisionId) -> Result<Playbook, DecisionServiceError> {
        self.with_decision(id, |decision| {
            let score = decision
                .latest_score()
                .ok_or(GovernanceError::NoScoreRecorded)?;
            let model = self.model(&decision.header().model)?;
            Ok(Playbook::build(&self.explanations.explain(score), &model))
        })
    }

    pub fn validity_contract(
        &self,
        id: &DecisionId,
    ) -> Result<ValidityContract, DecisionServiceError> {
        self.with_decision(id, |decision| {
            Ok(ValidityContract::for_metadata(decision.metadata()))
        })
    }

    /// Aggregate every stored decision. Reads only; nothing is appended.
    pub fn portfolio_metrics(&self) -> Result<PortfolioMetrics, DecisionServiceError> {
        let mut headers = self.repository.headers()?;
        headers.sort_by(|left, right| left.id.cmp(&right.id));

        let mut snapshots = Vec::with_capacity(headers.len());
        for header in headers {
            let snapshot = self.with_decision(&header.id, |decision| {
                let model = self.model(&decision.header().model)?;
                Ok(DecisionSnapshot::capture(decision, &model))
            })?;
            snapshots.push(snapshot);
        }
        Ok(PortfolioMetrics::compute(&snapshots))
    }

    pub fn history(&self, id: &DecisionId) -> Result<Vec<HistoryEntry>, DecisionServiceError> {
        self.with_decision(id, |decision| Ok(decision.history().entries().to_vec()))
    }

    pub fn verify(&self, id: &DecisionId) -> Result<Verification, DecisionServiceError> {
        self.with_decision(id, |decision| {
            let verification = decision.history().verify();
            if let Verification::Broken { sequence, fault } = &verification {
                warn!(
                    decision_id = %decision.id(),
                    sequence,
                    fault = fault.describe(),
                    "history integrity violation"
                );
            }
            Ok(verification)
        })
    }

    fn view(&self, decision: &Decision) -> Result<DecisionView, DecisionServiceError> {
        let mut view = decision.view();
        if let Some(total) = view.total_score {
            let model = self.model(&decision.header().model)?;
            view.outcome = model.outcome_for(total).map(str::to_string);
        }
        Ok(view)
    }

    fn record_transition(
        &self,
        decision: &mut Decision,
        attempt: TransitionAttempt,
    ) -> Result<TransitionRecord, DecisionServiceError> {
        self.persist(decision, attempt.payload())?;
        log_transition(decision.id(), &attempt.record);
        Ok(attempt.into_result()?)
    }

    /// Write to the repository first, then advance the in-memory ledger.
    fn persist(
        &self,
        decision: &mut Decision,
        payload: EntryPayload,
    ) -> Result<u64, DecisionServiceError> {
        let entry = decision.stage(payload)?;
        let kind = entry.kind();
        self.repository.append(&entry)?;
        let sequence = decision.commit(entry)?;
        info!(
            decision_id = %decision.id(),
            sequence,
            kind = kind.label(),
            "history entry appended"
        );
        Ok(sequence)
    }

    fn adopt(&self, decision: Decision) -> Result<DecisionView, DecisionServiceError> {
        let view = self.view(&decision)?;
        let mut decisions = self.decisions.lock().map_err(|_| poisoned())?;
        decisions.insert(decision.id().clone(), Arc::new(Mutex::new(decision)));
        Ok(view)
    }

    /// Cached handle, or a decision rehydrated from the repository.
    fn load(&self, id: &DecisionId) -> Result<DecisionHandle, DecisionServiceError> {
        if let Some(handle) = self
            .decisions
            .lock()
            .map_err(|_| poisoned())?
            .get(id)
            .cloned()
        {
            return Ok(handle);
        }

        let header = self
            .repository
            .fetch(id)?
            .ok_or_else(|| DecisionServiceError::DecisionNotFound(id.clone()))?;
        let entries = self.repository.entries(id)?;
        let decision = Decision::rehydrate(header, entries);
        info!(
            decision_id = %id,
            entries = decision.history().len(),
            state = decision.state().label(),
            "decision rehydrated"
        );

        let mut decisions = self.decisions.lock().map_err(|_| poisoned())?;
        Ok(Arc::clone(
            decisions
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(decision))),
        ))
    }

    fn with_decision<T>(
        &self,
        id: &DecisionId,
        action: impl FnOnce(&mut Decision) -> Result<T, DecisionServiceError>,
    ) -> Result<T, DecisionServiceError> {
        let handle = self.load(id)?;
        let mut decision = lock_decision(&handle)?;
        action(&mut decision)
    }
}

fn lock_decision(
    handle: &DecisionHandle,
) -> Result<std::sync::MutexGuard<'_, Decision>, DecisionServiceError> {
    handle.lock().map_err(|_| poisoned())
}

fn poisoned() -> DecisionServiceError {
    RepositoryError::Unavailable("decision lock poisoned".to_string()).into()
}

/// Error raised by the decision service.
#[derive(Debug, thiserror::Error)]
pub enum DecisionServiceError {
    #[error("decision {0} not found")]
    DecisionNotFound(DecisionId),
    #[error("criteria model {0} is not registered")]
    UnknownModel(ModelVersion),
    #[error(transparent)]
    Model(#[from] CriteriaModelError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Governance(#[from] GovernanceError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("stress test stopped after recording {recorded} of {total} runs: {source}")]
    StressTestInterrupted {
        recorded: usize,
        total: usize,
        #[source]
        source: Box<DecisionServiceError>,
    },
}
