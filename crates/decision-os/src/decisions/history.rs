//! Append-only, hash-chained decision ledger.
//!
//! Every entry commits to its payload, its sequence number, the decision it belongs to,
//! and the hash of the entry before it. Altering or removing any persisted entry breaks
//! the chain from that point on, which [`DecisionHistory::verify`] reports.

use serde::{Deserialize, Serialize};

use super::domain::{DecisionId, FollowUp};
use super::governance::{GovernanceState, TransitionRecord};
use super::hashing::{history_entry_hash, GENESIS_HASH};
use super::scenario::ScenarioRun;
use super::scoring::ScoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    ScoreComputed,
    GovernanceTransition,
    ScenarioExecuted,
    OutcomeRecorded,
}

impl EntryKind {
    pub fn label(self) -> &'static str {
        match self {
            EntryKind::ScoreComputed => "score_computed",
            EntryKind::GovernanceTransition => "governance_transition",
            EntryKind::ScenarioExecuted => "scenario_executed",
            EntryKind::OutcomeRecorded => "outcome_recorded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EntryPayload {
    ScoreComputed(ScoreResult),
    GovernanceTransition(TransitionRecord),
    ScenarioExecuted(ScenarioRun),
    OutcomeRecorded(FollowUp),
}

impl EntryPayload {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryPayload::ScoreComputed(_) => EntryKind::ScoreComputed,
            EntryPayload::GovernanceTransition(_) => EntryKind::GovernanceTransition,
            EntryPayload::ScenarioExecuted(_) => EntryKind::ScenarioExecuted,
            EntryPayload::OutcomeRecorded(_) => EntryKind::OutcomeRecorded,
        }
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub decision_id: DecisionId,
    /// Zero-based and always equal to the entry's position in the ledger.
    pub sequence: u64,
    pub payload: EntryPayload,
    pub previous_hash: String,
    pub content_hash: String,
}

impl HistoryEntry {
    pub fn kind(&self) -> EntryKind {
        self.payload.kind()
    }

    /// Recompute this entry's hash from its current contents.
    pub fn recompute_hash(&self) -> Result<String, HistoryError> {
        let payload = self.payload.canonical_bytes()?;
        Ok(history_entry_hash(
            self.decision_id.as_str(),
            self.sequence,
            &self.previous_hash,
            &payload,
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("decision {0} is locked; only governance transitions and outcomes may be recorded")]
    DecisionLocked(DecisionId),
    #[error("decision {0} is not locked; outcomes are recorded after the decision is final")]
    OutcomeBeforeLock(DecisionId),
    #[error("entry does not extend the ledger (expected sequence {expected}, got {found})")]
    SequenceMismatch { expected: u64, found: u64 },
    #[error("entry previous hash does not match the ledger head")]
    BrokenLink,
    #[error("entry belongs to decision {found}, not {expected}")]
    ForeignEntry { expected: DecisionId, found: DecisionId },
    #[error("failed to encode history payload: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Why verification stopped at a given entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityFault {
    SequenceGap,
    ForeignEntry,
    PreviousHashMismatch,
    ContentHashMismatch,
    Unencodable,
}

impl IntegrityFault {
    pub fn describe(&self) -> &'static str {
        match self {
            IntegrityFault::SequenceGap => "sequence number out of order",
            IntegrityFault::ForeignEntry => "entry belongs to another decision",
            IntegrityFault::PreviousHashMismatch => "previous hash does not match prior entry",
            IntegrityFault::ContentHashMismatch => "content hash does not match entry contents",
            IntegrityFault::Unencodable => "entry payload could not be encoded",
        }
    }
}

/// Outcome of replaying a ledger's hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Intact { entries: usize },
    Broken { sequence: u64, fault: IntegrityFault },
}

impl Verification {
    pub fn is_intact(&self) -> bool {
        matches!(self, Verification::Intact { .. })
    }

    pub fn first_divergent(&self) -> Option<u64> {
        match self {
            Verification::Intact { .. } => None,
            Verification::Broken { sequence, .. } => Some(*sequence),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionHistory {
    decision_id: DecisionId,
    entries: Vec<HistoryEntry>,
}

impl DecisionHistory {
    pub fn new(decision_id: DecisionId) -> Self {
        Self {
            decision_id,
            entries: Vec::new(),
        }
    }

    /// Wrap persisted entries as-is. Nothing is checked until [`Self::verify`].
    pub fn from_entries(decision_id: DecisionId, entries: Vec<HistoryEntry>) -> Self {
        Self {
            decision_id,
            entries,
        }
    }

    pub fn decision_id(&self) -> &DecisionId {
        &self.decision_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, sequence: u64) -> Option<&HistoryEntry> {
        usize::try_from(sequence)
            .ok()
            .and_then(|index| self.entries.get(index))
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn head_hash(&self) -> &str {
        self.entries
            .last()
            .map(|entry| entry.content_hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    /// Build the entry that would extend this ledger next. `state` is the decision's
    /// current governance state; locked decisions only accept governance transitions and
    /// follow-up outcomes, and outcomes are only accepted once locked.
    pub fn seal(
        &self,
        state: GovernanceState,
        payload: EntryPayload,
    ) -> Result<HistoryEntry, HistoryError> {
        let locked = state == GovernanceState::Locked;
        match payload.kind() {
            EntryKind::GovernanceTransition => {}
            EntryKind::OutcomeRecorded if !locked => {
                return Err(HistoryError::OutcomeBeforeLock(self.decision_id.clone()));
            }
            EntryKind::OutcomeRecorded => {}
            EntryKind::ScoreComputed | EntryKind::ScenarioExecuted if locked => {
                return Err(HistoryError::DecisionLocked(self.decision_id.clone()));
            }
            EntryKind::ScoreComputed | EntryKind::ScenarioExecuted => {}
        }

        let sequence = self.entries.len() as u64;
        let previous_hash = self.head_hash().to_string();
        let mut entry = HistoryEntry {
            decision_id: self.decision_id.clone(),
            sequence,
            payload,
            previous_hash,
            content_hash: String::new(),
        };
        entry.content_hash = entry.recompute_hash()?;
        Ok(entry)
    }

    /// Attach a sealed entry to the head of the ledger, returning its sequence.
    pub fn push(&mut self, entry: HistoryEntry) -> Result<u64, HistoryError> {
        let expected = self.entries.len() as u64;
        if entry.decision_id != self.decision_id {
            return Err(HistoryError::ForeignEntry {
                expected: self.decision_id.clone(),
                found: entry.decision_id,
            });
        }
        if entry.sequence != expected {
            return Err(HistoryError::SequenceMismatch {
                expected,
                found: entry.sequence,
            });
        }
        if entry.previous_hash != self.head_hash() {
            return Err(HistoryError::BrokenLink);
        }
        self.entries.push(entry);
        Ok(expected)
    }

    pub fn append(
        &mut self,
        state: GovernanceState,
        payload: EntryPayload,
    ) -> Result<u64, HistoryError> {
        let entry = self.seal(state, payload)?;
        self.push(entry)
    }

    /// Replay the chain from genesis and report the first entry that does not check out.
    pub fn verify(&self) -> Verification {
        let mut previous = GENESIS_HASH;
        for (index, entry) in self.entries.iter().enumerate() {
            let position = index as u64;
            let fault = if entry.sequence != position {
                Some(IntegrityFault::SequenceGap)
            } else if entry.decision_id != self.decision_id {
                Some(IntegrityFault::ForeignEntry)
            } else if entry.previous_hash != previous {
                Some(IntegrityFault::PreviousHashMismatch)
            } else {
                match entry.recompute_hash() {
                    Ok(hash) if hash == entry.content_hash => None,
                    Ok(_) => Some(IntegrityFault::ContentHashMismatch),
                    Err(_) => Some(IntegrityFault::Unencodable),
                }
            };

            if let Some(fault) = fault {
                return Verification::Broken {
                    sequence: position,
                    fault,
                };
            }
            previous = &entry.content_hash;
        }

        Verification::Intact {
            entries: self.entries.len(),
        }
    }

    pub fn is_intact(&self) -> bool {
        self.verify().is_intact()
    }

    pub fn latest_score(&self) -> Option<&ScoreResult> {
        self.entries.iter().rev().find_map(|entry| match &entry.payload {
            EntryPayload::ScoreComputed(score) => Some(score),
            _ => None,
        })
    }

    pub fn transitions(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.entries.iter().filter_map(|entry| match &entry.payload {
            EntryPayload::GovernanceTransition(record) => Some(record),
            _ => None,
        })
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &ScenarioRun> {
        self.entries.iter().filter_map(|entry| match &entry.payload {
            EntryPayload::ScenarioExecuted(run) => Some(run),
            _ => None,
        })
    }

    pub fn latest_follow_up(&self) -> Option<&FollowUp> {
        self.entries.iter().rev().find_map(|entry| match &entry.payload {
            EntryPayload::OutcomeRecorded(follow_up) => Some(follow_up),
            _ => None,
        })
    }

    pub fn count(&self, kind: EntryKind) -> usize {
        self.entries.iter().filter(|entry| entry.kind() == kind).count()
    }

    /// Governance state implied by the applied transitions, starting from draft.
    pub fn derived_state(&self) -> GovernanceState {
        self.transitions()
            .filter(|record| record.is_applied())
            .last()
            .map(|record| record.to)
            .unwrap_or(GovernanceState::Draft)
    }
}
