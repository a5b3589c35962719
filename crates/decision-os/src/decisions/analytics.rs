//! Read-only aggregation across every stored decision: outcome mix, weak criteria, and
//! how well predictions held up against recorded follow-ups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::ConfidenceBand;
use super::criteria::CriteriaModel;
use super::domain::{Decision, DecisionId, FollowUpOutcome};
use super::explanation::ExplanationBuilder;

const WEAK_CRITERIA_PER_DECISION: usize = 3;
const WEAK_CRITERIA_REPORTED: usize = 10;

/// Polarity of a decision's outcome band: the top band is favourable, the bottom band
/// unfavourable, anything between is mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prediction {
    Favourable,
    Mixed,
    Unfavourable,
}

impl Prediction {
    fn for_score(model: &CriteriaModel, total: f64) -> Option<Self> {
        let bands = model.outcome_bands();
        if bands.is_empty() {
            return None;
        }
        let index = bands
            .iter()
            .position(|band| total >= band.min_score)
            .unwrap_or(bands.len() - 1);
        Some(if index == 0 {
            Prediction::Favourable
        } else if index + 1 == bands.len() {
            Prediction::Unfavourable
        } else {
            Prediction::Mixed
        })
    }
}

/// Everything the portfolio metrics need from one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSnapshot {
    pub decision_id: DecisionId,
    pub decision_type: String,
    pub total_score: Option<f64>,
    pub outcome: Option<String>,
    pub prediction: Option<Prediction>,
    pub confidence: Option<ConfidenceBand>,
    /// Criteria with the lowest normalized values in the latest score.
    pub weakest: Vec<String>,
    pub follow_up: Option<FollowUpOutcome>,
}

impl DecisionSnapshot {
    pub fn capture(decision: &Decision, model: &CriteriaModel) -> Self {
        let score = decision.latest_score();
        let weakest = score
            .map(|score| {
                ExplanationBuilder::new()
                    .explain(score)
                    .lowest_normalized(WEAK_CRITERIA_PER_DECISION)
                    .into_iter()
                    .map(|entry| entry.criterion_id.clone())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            decision_id: decision.id().clone(),
            decision_type: decision.metadata().decision_type.trim().to_string(),
            total_score: score.map(|score| score.total_score),
            outcome: score
                .and_then(|score| model.outcome_for(score.total_score))
                .map(str::to_string),
            prediction: score.and_then(|score| Prediction::for_score(model, score.total_score)),
            confidence: score.map(|score| score.confidence()),
            weakest,
            follow_up: decision.latest_follow_up().map(|follow_up| follow_up.outcome),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakCriterion {
    pub criterion_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    pub overconfident: usize,
    pub underconfident: usize,
    pub calibrated: usize,
}

/// Predictions scored against follow-ups. Mixed predictions or partial successes land
/// in `review_bucket` and are left out of `accuracy`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub follow_ups: usize,
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
    pub review_bucket: usize,
    pub accuracy: Option<f64>,
    pub calibration: Calibration,
}

impl AccuracyMetrics {
    pub fn compute(snapshots: &[DecisionSnapshot]) -> Self {
        let mut metrics = Self::default();
        for snapshot in snapshots {
            let Some(actual) = snapshot.follow_up else {
                continue;
            };
            metrics.follow_ups += 1;

            let actual_positive = match actual {
                FollowUpOutcome::Success => Some(true),
                FollowUpOutcome::Failure => Some(false),
                FollowUpOutcome::PartialSuccess => None,
            };
            let predicted_positive = match snapshot.prediction {
                Some(Prediction::Favourable) => Some(true),
                Some(Prediction::Unfavourable) => Some(false),
                Some(Prediction::Mixed) | None => None,
            };

            match (predicted_positive, actual_positive) {
                (Some(true), Some(true)) => metrics.true_positive += 1,
                (Some(true), Some(false)) => metrics.false_positive += 1,
                (Some(false), Some(false)) => metrics.true_negative += 1,
                (Some(false), Some(true)) => metrics.false_negative += 1,
                _ => metrics.review_bucket += 1,
            }

            if let Some(succeeded) = actual_positive {
                match (snapshot.confidence, succeeded) {
                    (Some(ConfidenceBand::High), false) => metrics.calibration.overconfident += 1,
                    (Some(ConfidenceBand::Low), true) => metrics.calibration.underconfident += 1,
                    _ => metrics.calibration.calibrated += 1,
                }
            }
        }

        let strict = metrics.true_positive
            + metrics.false_positive
            + metrics.true_negative
            + metrics.false_negative;
        if strict > 0 {
            metrics.accuracy =
                Some((metrics.true_positive + metrics.true_negative) as f64 / strict as f64);
        }
        metrics
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub decisions: usize,
    pub scored: usize,
    pub average_score: Option<f64>,
    pub outcomes: BTreeMap<String, usize>,
    pub confidence: BTreeMap<String, usize>,
    pub follow_ups: BTreeMap<String, usize>,
    /// Criteria that most often rank among a decision's weakest, most frequent first.
    pub weak_criteria: Vec<WeakCriterion>,
    pub accuracy: AccuracyMetrics,
}

impl PortfolioMetrics {
    pub fn compute(snapshots: &[DecisionSnapshot]) -> Self {
        let mut outcomes = BTreeMap::new();
        let mut confidence = BTreeMap::new();
        let mut follow_ups = BTreeMap::new();
        let mut weak: BTreeMap<&str, usize> = BTreeMap::new();
        let mut totals = Vec::new();

        for snapshot in snapshots {
            if let Some(total) = snapshot.total_score {
                totals.push(total);
            }
            if let Some(outcome) = &snapshot.outcome {
                *outcomes.entry(outcome.clone()).or_insert(0) += 1;
            }
            if let Some(band) = snapshot.confidence {
                *confidence.entry(band.label().to_string()).or_insert(0) += 1;
            }
            if let Some(follow_up) = snapshot.follow_up {
                *follow_ups.entry(follow_up.label().to_string()).or_insert(0) += 1;
            }
            for criterion in &snapshot.weakest {
                *weak.entry(criterion.as_str()).or_insert(0) += 1;
            }
        }

        let mut weak_criteria: Vec<WeakCriterion> = weak
            .into_iter()
            .map(|(criterion_id, count)| WeakCriterion {
                criterion_id: criterion_id.to_string(),
                count,
            })
            .collect();
        // BTreeMap order already breaks ties by id; the sort is stable.
        weak_criteria.sort_by(|left, right| right.count.cmp(&left.count));
        weak_criteria.truncate(WEAK_CRITERIA_REPORTED);

        let average_score =
            (!totals.is_empty()).then(|| totals.iter().sum::<f64>() / totals.len() as f64);

        Self {
            decisions: snapshots.len(),
            scored: totals.len(),
            average_score,
            outcomes,
            confidence,
            follow_ups,
            weak_criteria,
            accuracy: AccuracyMetrics::compute(snapshots),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        id: &str,
        prediction: Option<Prediction>,
        confidence: Option<ConfidenceBand>,
        follow_up: Option<FollowUpOutcome>,
    ) -> DecisionSnapshot {
        DecisionSnapshot {
            decision_id: DecisionId::from(id),
            decision_type: "procurement".to_string(),
            total_score: None,
            outcome: None,
            prediction,
            confidence,
            weakest: Vec::new(),
            follow_up,
        }
    }

    #[test]
    fn accuracy_separates_strict_and_review_cases() {
        use ConfidenceBand::{High, Low, Medium};
        use FollowUpOutcome::{Failure, PartialSuccess, Success};
        use Prediction::{Favourable, Mixed, Unfavourable};

        let snapshots = vec![
            snapshot("a", Some(Favourable), Some(High), Some(Success)),
            snapshot("b", Some(Favourable), Some(High), Some(Failure)),
            snapshot("c", Some(Unfavourable), Some(Low), Some(Success)),
            snapshot("d", Some(Unfavourable), Some(Low), Some(Failure)),
            snapshot("e", Some(Mixed), Some(Medium), Some(Success)),
            snapshot("f", Some(Favourable), Some(High), Some(PartialSuccess)),
            snapshot("g", Some(Favourable), Some(High), None),
        ];

        let metrics = AccuracyMetrics::compute(&snapshots);
        assert_eq!(metrics.follow_ups, 6);
        assert_eq!(
            (
                metrics.true_positive,
                metrics.false_positive,
                metrics.true_negative,
                metrics.false_negative
            ),
            (1, 1, 1, 1)
        );
        assert_eq!(metrics.review_bucket, 2);
        assert_eq!(metrics.accuracy, Some(0.5));
        assert_eq!(
            metrics.calibration,
            Calibration {
                overconfident: 1,
                underconfident: 1,
                calibrated: 3,
            }
        );
    }

    #[test]
    fn empty_portfolio_has_no_averages() {
        let metrics = PortfolioMetrics::compute(&[]);
        assert_eq!(metrics.decisions, 0);
        assert_eq!(metrics.average_score, None);
        assert_eq!(metrics.accuracy.accuracy, None);
        assert!(metrics.weak_criteria.is_empty());
    }

    #[test]
    fn weak_criteria_are_ranked_by_frequency() {
        let mut first = snapshot("a", None, None, None);
        first.weakest = vec!["risk".to_string(), "urgency".to_string()];
        first.total_score = Some(0.5);
        first.outcome = Some("DO NOT PROCEED".to_string());
        let mut second = snapshot("b", None, None, None);
        second.weakest = vec!["alignment".to_string(), "risk".to_string()];
        second.total_score = Some(0.7);
        second.outcome = Some("REVIEW / REVISE".to_string());

        let metrics = PortfolioMetrics::compute(&[first, second]);
        let ranked: Vec<_> = metrics
            .weak_criteria
            .iter()
            .map(|weak| (weak.criterion_id.as_str(), weak.count))
            .collect();
        assert_eq!(ranked, vec![("risk", 2), ("alignment", 1), ("urgency", 1)]);
        assert_eq!(metrics.scored, 2);
        assert!((metrics.average_score.expect("average") - 0.6).abs() < 1e-12);
        assert_eq!(metrics.outcomes.get("REVIEW / REVISE"), Some(&1));
    }
}
