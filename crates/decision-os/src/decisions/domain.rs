use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::criteria::ModelVersion;
use super::governance::GovernanceState;
use super::history::{DecisionHistory, EntryPayload, HistoryEntry, HistoryError};
use super::scoring::ScoreResult;

/// Identifier wrapper for decisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub String);

impl DecisionId {
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(format!("dec_{}", &raw[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DecisionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reversibility of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionClass {
    OneWay,
    #[default]
    TwoWay,
    Experimental,
}

impl DecisionClass {
    pub fn label(self) -> &'static str {
        match self {
            DecisionClass::OneWay => "one-way",
            DecisionClass::TwoWay => "two-way",
            DecisionClass::Experimental => "experimental",
        }
    }

    pub fn is_irreversible(self) -> bool {
        matches!(self, DecisionClass::OneWay)
    }
}

/// Decision brief captured alongside the scoring inputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionMetadata {
    pub title: String,
    pub context: String,
    pub decision_type: String,
    pub decision_class: DecisionClass,
    pub owner: String,
    pub stakeholders: Vec<String>,
    pub assumptions: Vec<String>,
    pub risks: Vec<String>,
    pub review_date: Option<NaiveDate>,
    pub responsibility_confirmed: bool,
}

impl DecisionMetadata {
    pub fn has_owner(&self) -> bool {
        !self.owner.trim().is_empty()
    }

    pub fn has_risks(&self) -> bool {
        self.risks.iter().any(|risk| !risk.trim().is_empty())
    }

    /// Brief fields that are still blank, in a fixed order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let filled = |value: &str| !value.trim().is_empty();
        let any_filled = |values: &[String]| values.iter().any(|value| filled(value));
        [
            ("title", filled(&self.title)),
            ("context", filled(&self.context)),
            ("owner", filled(&self.owner)),
            ("responsibility_confirmed", self.responsibility_confirmed),
            ("stakeholders", any_filled(&self.stakeholders)),
            ("assumptions", any_filled(&self.assumptions)),
            ("risks", any_filled(&self.risks)),
            ("review_date", self.review_date.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, present)| (!present).then_some(field))
        .collect()
    }

    /// Share of brief fields filled in, in [0, 1].
    pub fn completeness(&self) -> f64 {
        const FIELDS: f64 = 8.0;
        (FIELDS - self.missing_fields().len() as f64) / FIELDS
    }
}

/// Conditions under which a decision's recommendation holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityContract {
    pub valid_if: Vec<String>,
    pub invalidates_if: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_on: Option<NaiveDate>,
    pub cadence: String,
}

const CONTRACT_ITEMS: usize = 6;

const STANDING_TRIGGERS: [&str; 2] = [
    "A material change occurs in budget, timeline, or compliance constraints",
    "New stakeholder constraints emerge that were not consulted during evaluation",
];

impl ValidityContract {
    /// Assumptions become the conditions the decision relies on; documented risks, plus
    /// the standing governance triggers, become the conditions that void it.
    pub fn for_metadata(metadata: &DecisionMetadata) -> Self {
        let listed = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .take(CONTRACT_ITEMS)
                .map(str::to_string)
                .collect()
        };

        let mut invalidates_if = listed(&metadata.risks);
        invalidates_if.extend(STANDING_TRIGGERS.iter().map(|trigger| trigger.to_string()));

        let cadence = match metadata.decision_class {
            DecisionClass::Experimental => "Revisit within 30 days",
            DecisionClass::OneWay | DecisionClass::TwoWay => "Revisit at the set review date",
        };

        Self {
            valid_if: listed(&metadata.assumptions),
            invalidates_if,
            review_on: metadata.review_date,
            cadence: cadence.to_string(),
        }
    }
}

/// What actually happened after a decision was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpOutcome {
    Success,
    PartialSuccess,
    Failure,
}

impl FollowUpOutcome {
    pub fn label(self) -> &'static str {
        match self {
            FollowUpOutcome::Success => "success",
            FollowUpOutcome::PartialSuccess => "partial_success",
            FollowUpOutcome::Failure => "failure",
        }
    }
}

/// Post-decision review recorded against a locked decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub outcome: FollowUpOutcome,
    #[serde(default)]
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

impl FollowUp {
    pub fn new(outcome: FollowUpOutcome, notes: impl Into<String>) -> Self {
        Self {
            outcome,
            notes: notes.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Immutable identity of a decision revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionHeader {
    pub id: DecisionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<DecisionId>,
    pub revision: u32,
    pub model: ModelVersion,
    pub metadata: DecisionMetadata,
    pub created_at: DateTime<Utc>,
}

impl DecisionHeader {
    pub fn new(model: ModelVersion, metadata: DecisionMetadata) -> Self {
        Self {
            id: DecisionId::generate(),
            parent_id: None,
            revision: 1,
            model,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Header for the next revision; the new decision links back to this one.
    pub fn next_revision(&self, model: ModelVersion, metadata: DecisionMetadata) -> Self {
        Self {
            id: DecisionId::generate(),
            parent_id: Some(self.id.clone()),
            revision: self.revision + 1,
            model,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// A decision and its ledger. Governance state is always derived from the ledger.
#[derive(Debug, Clone)]
pub struct Decision {
    header: DecisionHeader,
    state: GovernanceState,
    history: DecisionHistory,
}

impl Decision {
    pub fn new(header: DecisionHeader) -> Self {
        let history = DecisionHistory::new(header.id.clone());
        Self {
            header,
            state: GovernanceState::Draft,
            history,
        }
    }

    /// Rebuild a decision from persisted entries without trusting them; call
    /// [`DecisionHistory::verify`] to check integrity.
    pub fn rehydrate(header: DecisionHeader, entries: Vec<HistoryEntry>) -> Self {
        let history = DecisionHistory::from_entries(header.id.clone(), entries);
        let state = history.derived_state();
        Self {
            header,
            state,
            history,
        }
    }

    pub fn id(&self) -> &DecisionId {
        &self.header.id
    }

    pub fn header(&self) -> &DecisionHeader {
        &self.header
    }

    pub fn metadata(&self) -> &DecisionMetadata {
        &self.header.metadata
    }

    pub fn state(&self) -> GovernanceState {
        self.state
    }

    pub fn history(&self) -> &DecisionHistory {
        &self.history
    }

    pub fn latest_score(&self) -> Option<&ScoreResult> {
        self.history.latest_score()
    }

    pub fn latest_follow_up(&self) -> Option<&FollowUp> {
        self.history.latest_follow_up()
    }

    /// Seal the next entry without recording it.
    pub fn stage(&self, payload: EntryPayload) -> Result<HistoryEntry, HistoryError> {
        self.history.seal(self.state, payload)
    }

    /// Record a sealed entry and advance the governance state it carries.
    /// Returns the entry's sequence number.
    pub fn commit(&mut self, entry: HistoryEntry) -> Result<u64, HistoryError> {
        let next_state = match &entry.payload {
            EntryPayload::GovernanceTransition(record) if record.is_applied() => Some(record.to),
            _ => None,
        };
        let sequence = self.history.push(entry)?;
        if let Some(state) = next_state {
            self.state = state;
        }
        Ok(sequence)
    }

    pub fn append(&mut self, payload: EntryPayload) -> Result<u64, HistoryError> {
        let entry = self.stage(payload)?;
        self.commit(entry)
    }

    pub fn view(&self) -> DecisionView {
        let latest = self.latest_score();
        DecisionView {
            id: self.header.id.clone(),
            parent_id: self.header.parent_id.clone(),
            revision: self.header.revision,
            model: self.header.model.clone(),
            state: self.state,
            metadata: self.header.metadata.clone(),
            history_len: self.history.len(),
            total_score: latest.map(|score| score.total_score),
            input_hash: latest.map(|score| score.input_hash.clone()),
            outcome: None,
            follow_up: self.latest_follow_up().cloned(),
            created_at: self.header.created_at,
        }
    }
}

/// Sanitized representation returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionView {
    pub id: DecisionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<DecisionId>,
    pub revision: u32,
    pub model: ModelVersion,
    pub state: GovernanceState,
    pub metadata: DecisionMetadata,
    pub history_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUp>,
    pub created_at: DateTime<Utc>,
}
