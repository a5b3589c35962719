//! What-if analysis over a scored alternative.
//!
//! Perturbations are applied one factor at a time against the baseline. Weight changes
//! rescale the remaining weights so the model still sums to one; input changes must stay
//! within the criterion's scale. Scenario results reuse the baseline timestamp, so a
//! stress test is reproducible down to the serialized bytes.

use std::slice;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::criteria::{CriteriaModel, CriteriaModelError, Criterion, DEFAULT_TOLERANCE};
use super::scoring::{Alternative, ScoreResult, ScoringEngine, ScoringError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationTarget {
    Weight(String),
    Input(String),
}

impl PerturbationTarget {
    pub fn criterion_id(&self) -> &str {
        match self {
            PerturbationTarget::Weight(id) | PerturbationTarget::Input(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delta {
    Absolute(f64),
    Percent(f64),
}

impl Delta {
    pub fn apply(self, base: f64) -> f64 {
        match self {
            Delta::Absolute(amount) => base + amount,
            Delta::Percent(percent) => base * (1.0 + percent / 100.0),
        }
    }

    fn with_sign(self, positive: bool) -> Self {
        let signed = |amount: f64| if positive { amount.abs() } else { -amount.abs() };
        match self {
            Delta::Absolute(amount) => Delta::Absolute(signed(amount)),
            Delta::Percent(percent) => Delta::Percent(signed(percent)),
        }
    }
}

/// Named, declarative change to one weight or one input value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perturbation {
    pub name: String,
    pub target: PerturbationTarget,
    pub delta: Delta,
}

impl Perturbation {
    pub fn weight(name: impl Into<String>, criterion: impl Into<String>, delta: Delta) -> Self {
        Self {
            name: name.into(),
            target: PerturbationTarget::Weight(criterion.into()),
            delta,
        }
    }

    pub fn input(name: impl Into<String>, criterion: impl Into<String>, delta: Delta) -> Self {
        Self {
            name: name.into(),
            target: PerturbationTarget::Input(criterion.into()),
            delta,
        }
    }

    fn signed(&self, positive: bool) -> Self {
        Self {
            name: self.name.clone(),
            target: self.target.clone(),
            delta: self.delta.with_sign(positive),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScenarioError {
    #[error("perturbation '{perturbation}' cannot rebalance weight of '{criterion}': {reason}")]
    InvalidWeightPerturbation {
        perturbation: String,
        criterion: String,
        reason: String,
    },
    #[error("perturbation '{perturbation}' targets unknown criterion '{criterion}'")]
    UnknownCriterion {
        perturbation: String,
        criterion: String,
    },
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    OneFactor,
    WorstCase,
    BestCase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankShift {
    pub criterion_id: String,
    pub baseline_rank: usize,
    pub scenario_rank: usize,
}

impl RankShift {
    /// Positive when the criterion climbed.
    pub fn movement(&self) -> i64 {
        self.baseline_rank as i64 - self.scenario_rank as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDelta {
    pub total: f64,
    /// One entry per criterion, ascending id.
    pub rank_shifts: Vec<RankShift>,
    pub reordered: bool,
}

impl ScoreDelta {
    fn between(baseline: &ScoreResult, scenario: &ScoreResult) -> Self {
        let rank_shifts: Vec<RankShift> = baseline
            .contributions
            .iter()
            .filter_map(|before| {
                scenario
                    .contribution(&before.criterion_id)
                    .map(|after| RankShift {
                        criterion_id: before.criterion_id.clone(),
                        baseline_rank: before.rank,
                        scenario_rank: after.rank,
                    })
            })
            .collect();
        let reordered = rank_shifts
            .iter()
            .any(|shift| shift.baseline_rank != shift.scenario_rank);
        Self {
            total: scenario.total_score - baseline.total_score,
            rank_shifts,
            reordered,
        }
    }
}

/// One re-scoring under a set of perturbations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub name: String,
    pub kind: ScenarioKind,
    pub baseline_hash: String,
    pub baseline_total: f64,
    /// Perturbations as applied, with the signs chosen for bounding runs.
    pub perturbations: Vec<Perturbation>,
    pub result: ScoreResult,
    pub delta: ScoreDelta,
}

/// Baseline, one-factor runs, and bounding runs in one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityReport {
    pub baseline: ScoreResult,
    pub runs: Vec<ScenarioRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_case: Option<ScenarioRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_case: Option<ScenarioRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
}

impl SensitivityReport {
    /// Runs in the order they should be recorded: one-factor runs, then worst, then best.
    pub fn all_runs(&self) -> impl Iterator<Item = &ScenarioRun> {
        self.runs
            .iter()
            .chain(self.worst_case.iter())
            .chain(self.best_case.iter())
    }

    /// The one-factor run with the largest absolute total change.
    pub fn most_sensitive(&self) -> Option<&ScenarioRun> {
        self.runs.iter().max_by(|left, right| {
            left.delta
                .total
                .abs()
                .total_cmp(&right.delta.total.abs())
                .then_with(|| right.name.cmp(&left.name))
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScenarioEngine {
    scoring: ScoringEngine,
    tolerance: f64,
}

impl Default for ScenarioEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl ScenarioEngine {
    pub fn new(tolerance: f64) -> Self {
        Self {
            scoring: ScoringEngine::new(),
            tolerance,
        }
    }

    /// Score the baseline and return a lazy sequence of one-factor runs.
    pub fn stress_test<'a>(
        &'a self,
        model: &'a CriteriaModel,
        alternative: &'a Alternative,
        perturbations: &'a [Perturbation],
    ) -> Result<StressTest<'a>, ScenarioError> {
        let baseline = self.scoring.evaluate(model, alternative)?;
        Ok(self.stress_test_from(model, baseline, perturbations))
    }

    /// Like [`Self::stress_test`] but against an already recorded baseline.
    pub fn stress_test_from<'a>(
        &'a self,
        model: &'a CriteriaModel,
        baseline: ScoreResult,
        perturbations: &'a [Perturbation],
    ) -> StressTest<'a> {
        debug!(
            model = %model.version_ref(),
            perturbations = perturbations.len(),
            "starting stress test"
        );
        StressTest {
            engine: self,
            model,
            alternative: baseline.alternative(),
            baseline,
            all: perturbations,
            remaining: perturbations.iter(),
        }
    }

    /// Re-score with every perturbation applied in order.
    fn run(
        &self,
        model: &CriteriaModel,
        alternative: &Alternative,
        baseline: &ScoreResult,
        name: String,
        kind: ScenarioKind,
        perturbations: Vec<Perturbation>,
    ) -> Result<ScenarioRun, ScenarioError> {
        let mut current_model = model.clone();
        let mut current_alternative = alternative.clone();
        for perturbation in &perturbations {
            match &perturbation.target {
                PerturbationTarget::Weight(criterion) => {
                    current_model =
                        self.reweight(&current_model, perturbation, criterion, &name)?;
                }
                PerturbationTarget::Input(criterion) => {
                    self.shift_input(
                        &current_model,
                        &mut current_alternative,
                        perturbation,
                        criterion,
                    )?;
                }
            }
        }

        let result =
            self.scoring
                .evaluate_at(&current_model, &current_alternative, baseline.computed_at)?;
        let delta = ScoreDelta::between(baseline, &result);
        Ok(ScenarioRun {
            name,
            kind,
            baseline_hash: baseline.input_hash.clone(),
            baseline_total: baseline.total_score,
            perturbations,
            result,
            delta,
        })
    }

    fn reweight(
        &self,
        model: &CriteriaModel,
        perturbation: &Perturbation,
        criterion: &str,
        label: &str,
    ) -> Result<CriteriaModel, ScenarioError> {
        let invalid = |reason: String| ScenarioError::InvalidWeightPerturbation {
            perturbation: perturbation.name.clone(),
            criterion: criterion.to_string(),
            reason,
        };

        let current = model
            .criterion(criterion)
            .ok_or_else(|| unknown(perturbation, criterion))?
            .weight;
        let mut target = perturbation.delta.apply(current);
        if !target.is_finite() || target < 0.0 || target > 1.0 + self.tolerance {
            return Err(invalid(format!("resulting weight {target} outside [0, 1]")));
        }
        target = target.min(1.0);

        let others: f64 = model
            .criteria()
            .iter()
            .filter(|other| other.id != criterion)
            .map(|other| other.weight)
            .sum();
        let remaining = 1.0 - target;
        if others <= 0.0 && remaining > self.tolerance {
            return Err(invalid(
                "no other weight available to absorb the change".to_string(),
            ));
        }
        let scale = if others > 0.0 { remaining / others } else { 0.0 };

        let criteria: Vec<Criterion> = model
            .criteria()
            .iter()
            .map(|existing| {
                let mut updated = existing.clone();
                updated.weight = if existing.id == criterion {
                    target
                } else {
                    existing.weight * scale
                };
                updated
            })
            .collect();

        model
            .variant(label, criteria, self.tolerance)
            .map_err(|error: CriteriaModelError| invalid(error.to_string()))
    }

    fn shift_input(
        &self,
        model: &CriteriaModel,
        alternative: &mut Alternative,
        perturbation: &Perturbation,
        criterion: &str,
    ) -> Result<(), ScenarioError> {
        if model.criterion(criterion).is_none() {
            return Err(unknown(perturbation, criterion));
        }
        let current = alternative.value(criterion).ok_or_else(|| {
            ScoringError::MissingCriterionInput {
                alternative: alternative.id.clone(),
                criterion: criterion.to_string(),
            }
        })?;
        alternative
            .values
            .insert(criterion.to_string(), perturbation.delta.apply(current));
        Ok(())
    }

    /// Pick, per perturbation, the sign that pushes the total in the wanted direction,
    /// then apply them all at once.
    fn bound(
        &self,
        model: &CriteriaModel,
        alternative: &Alternative,
        baseline: &ScoreResult,
        perturbations: &[Perturbation],
        kind: ScenarioKind,
    ) -> Result<Option<ScenarioRun>, ScenarioError> {
        if perturbations.is_empty() {
            return Ok(None);
        }

        let mut chosen = Vec::with_capacity(perturbations.len());
        for perturbation in perturbations {
            let run_at = |positive: bool| {
                let signed = perturbation.signed(positive);
                self.run(
                    model,
                    alternative,
                    baseline,
                    signed.name.clone(),
                    ScenarioKind::OneFactor,
                    vec![signed],
                )
                .map(|run| run.result.total_score)
            };

            let pick_positive = match (run_at(true), run_at(false)) {
                (Ok(up), Ok(down)) => match kind {
                    ScenarioKind::WorstCase => up <= down,
                    _ => up >= down,
                },
                (Ok(_), Err(_)) => true,
                (Err(_), Ok(_)) => false,
                (Err(error), Err(_)) => return Err(error),
            };
            chosen.push(perturbation.signed(pick_positive));
        }

        let name = match kind {
            ScenarioKind::WorstCase => "worst-case",
            ScenarioKind::BestCase => "best-case",
            ScenarioKind::OneFactor => "combined",
        };
        self.run(model, alternative, baseline, name.to_string(), kind, chosen)
            .map(Some)
    }
}

fn unknown(perturbation: &Perturbation, criterion: &str) -> ScenarioError {
    ScenarioError::UnknownCriterion {
        perturbation: perturbation.name.clone(),
        criterion: criterion.to_string(),
    }
}

/// Lazy one-factor stress test. Each `next` performs exactly one re-score.
pub struct StressTest<'a> {
    engine: &'a ScenarioEngine,
    model: &'a CriteriaModel,
    alternative: Alternative,
    baseline: ScoreResult,
    all: &'a [Perturbation],
    remaining: slice::Iter<'a, Perturbation>,
}

impl<'a> StressTest<'a> {
    pub fn baseline(&self) -> &ScoreResult {
        &self.baseline
    }

    pub fn worst_case(&self) -> Result<Option<ScenarioRun>, ScenarioError> {
        self.engine.bound(
            self.model,
            &self.alternative,
            &self.baseline,
            self.all,
            ScenarioKind::WorstCase,
        )
    }

    pub fn best_case(&self) -> Result<Option<ScenarioRun>, ScenarioError> {
        self.engine.bound(
            self.model,
            &self.alternative,
            &self.baseline,
            self.all,
            ScenarioKind::BestCase,
        )
    }

    /// Drain the remaining one-factor runs and add the bounding runs.
    pub fn report(mut self) -> Result<SensitivityReport, ScenarioError> {
        let runs = self.by_ref().collect::<Result<Vec<_>, _>>()?;
        let worst_case = self.worst_case()?;
        let best_case = self.best_case()?;
        let spread = match (&worst_case, &best_case) {
            (Some(worst), Some(best)) => Some(best.result.total_score - worst.result.total_score),
            _ => None,
        };
        Ok(SensitivityReport {
            baseline: self.baseline,
            runs,
            worst_case,
            best_case,
            spread,
        })
    }
}

impl<'a> Iterator for StressTest<'a> {
    type Item = Result<ScenarioRun, ScenarioError>;

    fn next(&mut self) -> Option<Self::Item> {
        let perturbation = self.remaining.next()?;
        Some(self.engine.run(
            self.model,
            &self.alternative,
            &self.baseline,
            perturbation.name.clone(),
            ScenarioKind::OneFactor,
            vec![perturbation.clone()],
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.remaining.size_hint()
    }
}

impl<'a> ExactSizeIterator for StressTest<'a> {}
