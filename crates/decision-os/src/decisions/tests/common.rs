use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::decisions::criteria::{CriteriaModel, Criterion, ModelVersion, DEFAULT_TOLERANCE};
use crate::decisions::domain::{
    Decision, DecisionClass, DecisionHeader, DecisionId, DecisionMetadata,
};
use crate::decisions::governance::{NamedRule, ReadinessRule, RuleSet};
use crate::decisions::history::{EntryPayload, HistoryEntry};
use crate::decisions::registry::ModelRegistry;
use crate::decisions::repository::{DecisionRepository, RepositoryError};
use crate::decisions::scoring::{Alternative, ScoreResult, ScoringEngine};
use crate::decisions::service::DecisionService;

pub(super) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

/// Cost is minimized on [0, 100] at weight 0.6; quality maximized on [0, 10] at 0.4.
pub(super) fn vendor_model() -> CriteriaModel {
    CriteriaModel::new(
        "vendor",
        1,
        "Vendor selection",
        vec![
            Criterion::minimize("cost", 0.6, 0.0, 100.0),
            Criterion::maximize("quality", 0.4, 0.0, 10.0),
        ],
    )
    .expect("vendor model is valid")
}

pub(super) fn vendor_alternative() -> Alternative {
    Alternative::new("acme")
        .with_value("cost", 40.0)
        .with_value("quality", 8.0)
}

pub(super) fn scored(model: &CriteriaModel, alternative: &Alternative) -> ScoreResult {
    ScoringEngine::new()
        .evaluate_at(model, alternative, fixed_time())
        .expect("alternative scores")
}

pub(super) fn complete_metadata() -> DecisionMetadata {
    DecisionMetadata {
        title: "Pick a logistics vendor".to_string(),
        context: "Current contract expires in Q3".to_string(),
        decision_type: "procurement".to_string(),
        decision_class: DecisionClass::OneWay,
        owner: "Dana Ortiz".to_string(),
        stakeholders: vec!["Finance".to_string(), "Operations".to_string()],
        assumptions: vec!["Volumes stay flat".to_string()],
        risks: vec!["Migration downtime".to_string()],
        review_date: NaiveDate::from_ymd_opt(2025, 9, 1),
        responsibility_confirmed: true,
    }
}

pub(super) fn decision_with(metadata: DecisionMetadata) -> Decision {
    Decision::new(DecisionHeader {
        id: DecisionId::from("dec_fixture"),
        parent_id: None,
        revision: 1,
        model: ModelVersion::new("vendor", 1),
        metadata,
        created_at: fixed_time(),
    })
}

/// Draft decision with one recorded vendor score.
pub(super) fn scored_decision() -> Decision {
    let mut decision = decision_with(complete_metadata());
    decision
        .append(EntryPayload::ScoreComputed(scored(
            &vendor_model(),
            &vendor_alternative(),
        )))
        .expect("score recorded");
    decision
}

pub(super) fn strict_rules(threshold: f64) -> RuleSet {
    RuleSet::new(
        "strict",
        vec![
            NamedRule::new(
                "score-floor",
                ReadinessRule::MinimumScore { threshold },
            ),
            NamedRule::new(
                "explained",
                ReadinessRule::ExplanationCompleteness { threshold: 1.0 },
            ),
            NamedRule::new(
                "approver",
                ReadinessRule::RolePresent {
                    role: "approver".to_string(),
                },
            ),
            NamedRule::new("owner", ReadinessRule::OwnerAssigned),
        ],
    )
    .expect("rule set valid")
}

pub(super) fn registry() -> Arc<ModelRegistry> {
    let registry = ModelRegistry::new();
    registry.register(vendor_model()).expect("vendor registers");
    Arc::new(registry)
}

pub(super) fn build_service() -> (DecisionService<MemoryRepository>, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::default());
    let service = DecisionService::new(repository.clone(), registry(), DEFAULT_TOLERANCE);
    (service, repository)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) headers: Arc<Mutex<HashMap<DecisionId, DecisionHeader>>>,
    pub(super) entries: Arc<Mutex<HashMap<DecisionId, Vec<HistoryEntry>>>>,
    pub(super) models: Arc<Mutex<Vec<CriteriaModel>>>,
}

impl MemoryRepository {
    /// Rewrite a stored entry in place, bypassing the ledger.
    pub(super) fn tamper(&self, id: &DecisionId, sequence: usize, edit: impl FnOnce(&mut HistoryEntry)) {
        let mut guard = self.entries.lock().expect("repository mutex poisoned");
        let entries = guard.get_mut(id).expect("decision has entries");
        edit(&mut entries[sequence]);
    }
}

impl DecisionRepository for MemoryRepository {
    fn insert(&self, header: DecisionHeader) -> Result<DecisionHeader, RepositoryError> {
        let mut guard = self.headers.lock().expect("repository mutex poisoned");
        if guard.contains_key(&header.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(header.id.clone(), header.clone());
        Ok(header)
    }

    fn fetch(&self, id: &DecisionId) -> Result<Option<DecisionHeader>, RepositoryError> {
        let guard = self.headers.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn headers(&self) -> Result<Vec<DecisionHeader>, RepositoryError> {
        let guard = self.headers.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn append(&self, entry: &HistoryEntry) -> Result<(), RepositoryError> {
        let mut guard = self.entries.lock().expect("repository mutex poisoned");
        let entries = guard.entry(entry.decision_id.clone()).or_default();
        if entry.sequence != entries.len() as u64 {
            return Err(RepositoryError::Conflict);
        }
        entries.push(entry.clone());
        Ok(())
    }

    fn entries(&self, id: &DecisionId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned().unwrap_or_default())
    }

    fn insert_model(&self, model: &CriteriaModel) -> Result<(), RepositoryError> {
        let mut guard = self.models.lock().expect("repository mutex poisoned");
        if guard
            .iter()
            .any(|stored| stored.version_ref() == model.version_ref())
        {
            return Err(RepositoryError::Conflict);
        }
        guard.push(model.clone());
        Ok(())
    }

    fn models(&self) -> Result<Vec<CriteriaModel>, RepositoryError> {
        Ok(self.models.lock().expect("repository mutex poisoned").clone())
    }
}

/// Accepts headers but refuses every append.
#[derive(Default)]
pub(super) struct ReadOnlyRepository {
    inner: MemoryRepository,
}

impl DecisionRepository for ReadOnlyRepository {
    fn insert(&self, header: DecisionHeader) -> Result<DecisionHeader, RepositoryError> {
        self.inner.insert(header)
    }

    fn fetch(&self, id: &DecisionId) -> Result<Option<DecisionHeader>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn headers(&self) -> Result<Vec<DecisionHeader>, RepositoryError> {
        self.inner.headers()
    }

    fn append(&self, _entry: &HistoryEntry) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }

    fn entries(&self, id: &DecisionId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        self.inner.entries(id)
    }

    fn insert_model(&self, _model: &CriteriaModel) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }

    fn models(&self) -> Result<Vec<CriteriaModel>, RepositoryError> {
        self.inner.models()
    }
}

/// Accepts a fixed number of appends, then goes unavailable.
pub(super) struct FailingRepository {
    pub(super) inner: MemoryRepository,
    remaining: Mutex<usize>,
}

impl FailingRepository {
    pub(super) fn after(appends: usize) -> Self {
        Self {
            inner: MemoryRepository::default(),
            remaining: Mutex::new(appends),
        }
    }
}

impl DecisionRepository for FailingRepository {
    fn insert(&self, header: DecisionHeader) -> Result<DecisionHeader, RepositoryError> {
        self.inner.insert(header)
    }

    fn fetch(&self, id: &DecisionId) -> Result<Option<DecisionHeader>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn headers(&self) -> Result<Vec<DecisionHeader>, RepositoryError> {
        self.inner.headers()
    }

    fn append(&self, entry: &HistoryEntry) -> Result<(), RepositoryError> {
        let mut remaining = self.remaining.lock().expect("repository mutex poisoned");
        if *remaining == 0 {
            return Err(RepositoryError::Unavailable("disk full".to_string()));
        }
        *remaining -= 1;
        self.inner.append(entry)
    }

    fn entries(&self, id: &DecisionId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        self.inner.entries(id)
    }

    fn insert_model(&self, model: &CriteriaModel) -> Result<(), RepositoryError> {
        self.inner.insert_model(model)
    }

    fn models(&self) -> Result<Vec<CriteriaModel>, RepositoryError> {
        self.inner.models()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
