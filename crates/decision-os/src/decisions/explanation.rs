use serde::{Deserialize, Serialize};

use super::criteria::ModelVersion;
use super::scoring::{contribution_order, ScoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationEntry {
    pub rank: usize,
    pub criterion_id: String,
    pub weight: f64,
    pub normalized_value: f64,
    pub contribution: f64,
    /// Fraction of the total score carried by this criterion; zero when the total is zero.
    pub share: f64,
    /// Weight left on the table: `weight - contribution`.
    pub shortfall: f64,
}

/// Ranked, human-readable breakdown of a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub alternative_id: String,
    pub model: ModelVersion,
    pub input_hash: String,
    pub total_score: f64,
    /// Ordered by descending absolute contribution, ties by ascending criterion id.
    pub entries: Vec<ExplanationEntry>,
}

impl Explanation {
    pub fn contribution_sum(&self) -> f64 {
        self.entries.iter().map(|entry| entry.contribution).sum()
    }

    /// True when the listed contributions add back up to the reported total.
    pub fn reproduces_total(&self, tolerance: f64) -> bool {
        (self.contribution_sum() - self.total_score).abs() <= tolerance
    }

    /// Fraction of the model's criteria covered by finite entries, or 0 if the
    /// breakdown no longer reproduces the total.
    pub fn completeness(&self, expected_criteria: usize, tolerance: f64) -> f64 {
        if expected_criteria == 0 || !self.reproduces_total(tolerance) {
            return 0.0;
        }
        let covered = self
            .entries
            .iter()
            .filter(|entry| entry.contribution.is_finite() && entry.normalized_value.is_finite())
            .count();
        (covered.min(expected_criteria)) as f64 / expected_criteria as f64
    }

    pub fn strongest(&self, count: usize) -> &[ExplanationEntry] {
        &self.entries[..count.min(self.entries.len())]
    }

    /// The `count` smallest contributors, smallest first.
    pub fn weakest(&self, count: usize) -> Vec<&ExplanationEntry> {
        self.entries.iter().rev().take(count).collect()
    }

    /// The `count` entries with the highest normalized value, ties by ascending id.
    pub fn highest_normalized(&self, count: usize) -> Vec<&ExplanationEntry> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|left, right| {
            right
                .normalized_value
                .total_cmp(&left.normalized_value)
                .then_with(|| left.criterion_id.cmp(&right.criterion_id))
        });
        entries.truncate(count);
        entries
    }

    pub fn lowest_normalized(&self, count: usize) -> Vec<&ExplanationEntry> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|left, right| {
            left.normalized_value
                .total_cmp(&right.normalized_value)
                .then_with(|| left.criterion_id.cmp(&right.criterion_id))
        });
        entries.truncate(count);
        entries
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplanationBuilder;

impl ExplanationBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn explain(&self, score: &ScoreResult) -> Explanation {
        let mut ranked: Vec<_> = score.contributions.iter().collect();
        ranked.sort_by(|left, right| {
            contribution_order(
                &left.criterion_id,
                left.contribution,
                &right.criterion_id,
                right.contribution,
            )
        });

        let entries = ranked
            .into_iter()
            .enumerate()
            .map(|(position, contribution)| ExplanationEntry {
                rank: position + 1,
                criterion_id: contribution.criterion_id.clone(),
                weight: contribution.weight,
                normalized_value: contribution.normalized_value,
                contribution: contribution.contribution,
                share: if score.total_score == 0.0 {
                    0.0
                } else {
                    contribution.contribution / score.total_score
                },
                shortfall: contribution.weight - contribution.contribution,
            })
            .collect();

        Explanation {
            alternative_id: score.alternative_id.clone(),
            model: score.model.clone(),
            input_hash: score.input_hash.clone(),
            total_score: score.total_score,
            entries,
        }
    }
}
