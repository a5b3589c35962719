use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::criteria::{CriteriaModel, ModelVersion};
use super::hashing::score_input_hash;

/// A candidate option with one raw value per criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub id: String,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl Alternative {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, criterion: impl Into<String>, value: f64) -> Self {
        self.values.insert(criterion.into(), value);
        self
    }

    pub fn value(&self, criterion: &str) -> Option<f64> {
        self.values.get(criterion).copied()
    }
}

/// Per-criterion breakdown of a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub criterion_id: String,
    pub weight: f64,
    pub normalized_value: f64,
    pub contribution: f64,
    /// 1-based position by descending contribution, ties broken by criterion id.
    pub rank: usize,
}

/// Immutable outcome of scoring one alternative against one model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub alternative_id: String,
    pub model: ModelVersion,
    pub total_score: f64,
    /// Ordered by ascending criterion id.
    pub contributions: Vec<Contribution>,
    pub inputs: BTreeMap<String, f64>,
    pub computed_at: DateTime<Utc>,
    pub input_hash: String,
}

impl ScoreResult {
    pub fn contribution(&self, criterion_id: &str) -> Option<&Contribution> {
        self.contributions
            .iter()
            .find(|contribution| contribution.criterion_id == criterion_id)
    }

    pub fn contribution_sum(&self) -> f64 {
        self.contributions
            .iter()
            .map(|contribution| contribution.contribution)
            .sum()
    }

    /// Criterion ids in rank order.
    pub fn ranking(&self) -> Vec<&str> {
        let mut ranked: Vec<&Contribution> = self.contributions.iter().collect();
        ranked.sort_by_key(|contribution| contribution.rank);
        ranked
            .into_iter()
            .map(|contribution| contribution.criterion_id.as_str())
            .collect()
    }

    /// The alternative this result was computed from.
    pub fn alternative(&self) -> Alternative {
        Alternative {
            id: self.alternative_id.clone(),
            values: self.inputs.clone(),
        }
    }

    /// Confidence band derived from the total score.
    pub fn confidence(&self) -> super::catalog::ConfidenceBand {
        super::catalog::ConfidenceBand::for_score(self.total_score)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("alternative '{alternative}' has no value for criterion '{criterion}'")]
    MissingCriterionInput {
        alternative: String,
        criterion: String,
    },
    #[error("value {value} for criterion '{criterion}' is outside [{min}, {max}]")]
    InputOutOfRange {
        criterion: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("alternative '{alternative}' supplies '{criterion}' which the model does not define")]
    UnknownCriterionInput {
        alternative: String,
        criterion: String,
    },
}

/// Ordering used for ranks everywhere: larger magnitude first, then ascending id.
pub(crate) fn contribution_order(
    left_id: &str,
    left_value: f64,
    right_id: &str,
    right_value: f64,
) -> Ordering {
    right_value
        .abs()
        .total_cmp(&left_value.abs())
        .then_with(|| left_id.cmp(right_id))
}

/// Stateless weighted-sum scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        model: &CriteriaModel,
        alternative: &Alternative,
    ) -> Result<ScoreResult, ScoringError> {
        self.evaluate_at(model, alternative, Utc::now())
    }

    /// Score with an explicit timestamp. Every other field depends only on the inputs.
    pub fn evaluate_at(
        &self,
        model: &CriteriaModel,
        alternative: &Alternative,
        computed_at: DateTime<Utc>,
    ) -> Result<ScoreResult, ScoringError> {
        self.validate(model, alternative)?;

        let mut contributions: Vec<Contribution> = model
            .criteria()
            .iter()
            .map(|criterion| {
                let raw = alternative.values[&criterion.id];
                let normalized_value = criterion.normalize(raw);
                Contribution {
                    criterion_id: criterion.id.clone(),
                    weight: criterion.weight,
                    normalized_value,
                    contribution: criterion.weight * normalized_value,
                    rank: 0,
                }
            })
            .collect();

        let total_score = contributions
            .iter()
            .map(|contribution| contribution.contribution)
            .sum();

        let mut order: Vec<usize> = (0..contributions.len()).collect();
        order.sort_by(|&left, &right| {
            contribution_order(
                &contributions[left].criterion_id,
                contributions[left].contribution,
                &contributions[right].criterion_id,
                contributions[right].contribution,
            )
        });
        for (position, index) in order.into_iter().enumerate() {
            contributions[index].rank = position + 1;
        }

        Ok(ScoreResult {
            alternative_id: alternative.id.clone(),
            model: model.version_ref(),
            total_score,
            contributions,
            inputs: alternative.values.clone(),
            computed_at,
            input_hash: score_input_hash(model, alternative),
        })
    }

    fn validate(&self, model: &CriteriaModel, alternative: &Alternative) -> Result<(), ScoringError> {
        for criterion in model.criteria() {
            let value = alternative.value(&criterion.id).ok_or_else(|| {
                ScoringError::MissingCriterionInput {
                    alternative: alternative.id.clone(),
                    criterion: criterion.id.clone(),
                }
            })?;
            if !criterion.scale.contains(value) {
                return Err(ScoringError::InputOutOfRange {
                    criterion: criterion.id.clone(),
                    value,
                    min: criterion.scale.min,
                    max: criterion.scale.max,
                });
            }
        }

        if let Some(unknown) = alternative
            .values
            .keys()
            .find(|criterion| model.criterion(criterion).is_none())
        {
            return Err(ScoringError::UnknownCriterionInput {
                alternative: alternative.id.clone(),
                criterion: unknown.clone(),
            });
        }

        Ok(())
    }
}
