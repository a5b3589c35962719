use sha2::{Digest, Sha256};

use super::criteria::{CriteriaModel, Direction};
use super::scoring::Alternative;

/// Previous-hash value carried by the first entry of every history.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const SCORE_INPUT_DOMAIN: &str = "decision-os/score-input/v1";
const HISTORY_ENTRY_DOMAIN: &str = "decision-os/history-entry/v1";

/// Length-prefixed writer so adjacent fields can never alias each other.
struct FieldHasher(Sha256);

impl FieldHasher {
    fn new(domain: &str) -> Self {
        let mut hasher = Self(Sha256::new());
        hasher.text(domain);
        hasher
    }

    fn text(&mut self, value: &str) {
        self.bytes(value.as_bytes());
    }

    fn bytes(&mut self, value: &[u8]) {
        self.0.update((value.len() as u64).to_be_bytes());
        self.0.update(value);
    }

    fn number(&mut self, value: f64) {
        // -0.0 and 0.0 score identically and must hash identically.
        let canonical = if value == 0.0 { 0.0_f64 } else { value };
        self.0.update(canonical.to_bits().to_be_bytes());
    }

    fn integer(&mut self, value: u64) {
        self.0.update(value.to_be_bytes());
    }

    fn finish(self) -> String {
        format!("{:x}", self.0.finalize())
    }
}

/// Hash of everything that determines a score: the model's criteria and the raw inputs.
///
/// Inputs are visited in the model's ascending criterion order, so the digest does not
/// depend on how the caller assembled the alternative.
pub(crate) fn score_input_hash(model: &CriteriaModel, alternative: &Alternative) -> String {
    let mut hasher = FieldHasher::new(SCORE_INPUT_DOMAIN);
    hasher.text(model.id());
    hasher.integer(u64::from(model.version()));
    hasher.text(model.version_ref().variant.as_deref().unwrap_or_default());
    hasher.text(&alternative.id);
    hasher.integer(model.len() as u64);
    for criterion in model.criteria() {
        hasher.text(&criterion.id);
        hasher.number(criterion.weight);
        hasher.integer(match criterion.direction {
            Direction::Maximize => 0,
            Direction::Minimize => 1,
        });
        hasher.number(criterion.scale.min);
        hasher.number(criterion.scale.max);
        hasher.number(alternative.values.get(&criterion.id).copied().unwrap_or(f64::NAN));
    }
    hasher.finish()
}

/// Digest linking one history entry to its predecessor.
pub(crate) fn history_entry_hash(
    decision_id: &str,
    sequence: u64,
    previous_hash: &str,
    canonical_payload: &[u8],
) -> String {
    let mut hasher = FieldHasher::new(HISTORY_ENTRY_DOMAIN);
    hasher.text(decision_id);
    hasher.integer(sequence);
    hasher.text(previous_hash);
    hasher.bytes(canonical_payload);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decisions::criteria::Criterion;

    fn model() -> CriteriaModel {
        CriteriaModel::new(
            "vendor",
            1,
            "",
            vec![
                Criterion::minimize("cost", 0.6, 0.0, 100.0),
                Criterion::maximize("quality", 0.4, 0.0, 10.0),
            ],
        )
        .expect("valid model")
    }

    #[test]
    fn input_hash_ignores_insertion_order() {
        let first = Alternative::new("a")
            .with_value("cost", 40.0)
            .with_value("quality", 8.0);
        let second = Alternative::new("a")
            .with_value("quality", 8.0)
            .with_value("cost", 40.0);

        assert_eq!(
            score_input_hash(&model(), &first),
            score_input_hash(&model(), &second)
        );
    }

    #[test]
    fn input_hash_tracks_values_and_zero_sign() {
        let base = Alternative::new("a")
            .with_value("cost", 0.0)
            .with_value("quality", 8.0);
        let negative_zero = Alternative::new("a")
            .with_value("cost", -0.0)
            .with_value("quality", 8.0);
        let changed = Alternative::new("a")
            .with_value("cost", 0.0)
            .with_value("quality", 8.5);

        let hash = score_input_hash(&model(), &base);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, score_input_hash(&model(), &negative_zero));
        assert_ne!(hash, score_input_hash(&model(), &changed));
    }

    #[test]
    fn entry_hash_binds_every_field() {
        let base = history_entry_hash("dec_1", 0, GENESIS_HASH, b"{}");
        assert_ne!(base, history_entry_hash("dec_2", 0, GENESIS_HASH, b"{}"));
        assert_ne!(base, history_entry_hash("dec_1", 1, GENESIS_HASH, b"{}"));
        assert_ne!(base, history_entry_hash("dec_1", 0, &base, b"{}"));
        assert_ne!(base, history_entry_hash("dec_1", 0, GENESIS_HASH, b"[]"));
    }
}
