use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance applied to weight sums and contribution round-trips unless configured otherwise.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Largest tolerance the engine accepts; anything looser hides real weighting mistakes.
pub const MAX_TOLERANCE: f64 = 1e-2;

/// Optimization direction of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Maximize => "maximize",
            Direction::Minimize => "minimize",
        }
    }
}

/// Declared bounds for raw input values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub min: f64,
    pub max: f64,
}

impl Scale {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// A named, weighted axis of evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub weight: f64,
    pub direction: Direction,
    pub scale: Scale,
}

impl Criterion {
    pub fn new(id: impl Into<String>, weight: f64, direction: Direction, scale: Scale) -> Self {
        Self {
            id: id.into(),
            weight,
            direction,
            scale,
        }
    }

    pub fn maximize(id: impl Into<String>, weight: f64, min: f64, max: f64) -> Self {
        Self::new(id, weight, Direction::Maximize, Scale::new(min, max))
    }

    pub fn minimize(id: impl Into<String>, weight: f64, min: f64, max: f64) -> Self {
        Self::new(id, weight, Direction::Minimize, Scale::new(min, max))
    }

    /// Map a raw value onto [0, 1], inverted for minimized criteria.
    ///
    /// The caller is responsible for checking the value lies within the scale.
    pub fn normalize(&self, value: f64) -> f64 {
        let normalized = (value - self.scale.min) / self.scale.range();
        match self.direction {
            Direction::Maximize => normalized,
            Direction::Minimize => 1.0 - normalized,
        }
    }
}

/// Score band mapping a minimum total score to an outcome label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeBand {
    pub min_score: f64,
    pub label: String,
}

impl OutcomeBand {
    pub fn new(min_score: f64, label: impl Into<String>) -> Self {
        Self {
            min_score,
            label: label.into(),
        }
    }
}

/// Stable reference to one immutable revision of a criteria model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelVersion {
    pub model_id: String,
    pub version: u32,
    /// Set for scenario-derived models that were never registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl ModelVersion {
    pub fn new(model_id: impl Into<String>, version: u32) -> Self {
        Self {
            model_id: model_id.into(),
            version,
            variant: None,
        }
    }

    pub fn is_variant(&self) -> bool {
        self.variant.is_some()
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.model_id, self.version)?;
        if let Some(variant) = &self.variant {
            write!(f, "+{variant}")?;
        }
        Ok(())
    }
}

/// Validation failures raised while building a criteria model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CriteriaModelError {
    #[error("criteria model must define at least one criterion")]
    Empty,
    #[error("criterion ids must not be blank")]
    BlankCriterionId,
    #[error("duplicate criterion id '{0}'")]
    DuplicateCriterion(String),
    #[error("criterion '{criterion}' has invalid weight {weight}")]
    InvalidWeight { criterion: String, weight: f64 },
    #[error("weights must sum to 1.0 (found {sum})")]
    WeightSum { sum: f64 },
    #[error("criterion '{criterion}' has an empty or non-finite scale [{min}, {max}]")]
    InvalidScale { criterion: String, min: f64, max: f64 },
    #[error("outcome band '{label}' has invalid minimum score {min_score}")]
    InvalidOutcomeBand { label: String, min_score: f64 },
    #[error("tolerance {0} must be finite, positive, and at most 1e-2")]
    InvalidTolerance(f64),
}

/// Immutable scoring schema. Each revision is a distinct object with its own version.
///
/// Criteria are kept sorted by ascending id, which is the order every downstream
/// computation iterates in. Deserialization accepts weight sums within [`MAX_TOLERANCE`];
/// the model registry narrows that to its configured tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaModelSpec")]
pub struct CriteriaModel {
    id: String,
    version: u32,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variant: Option<String>,
    criteria: Vec<Criterion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    outcome_bands: Vec<OutcomeBand>,
}

/// Unvalidated wire shape of a criteria model.
#[derive(Debug, Clone, Deserialize)]
pub struct CriteriaModelSpec {
    pub id: String,
    #[serde(default = "first_version")]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub outcome_bands: Vec<OutcomeBand>,
}

fn first_version() -> u32 {
    1
}

impl TryFrom<CriteriaModelSpec> for CriteriaModel {
    type Error = CriteriaModelError;

    fn try_from(spec: CriteriaModelSpec) -> Result<Self, Self::Error> {
        let mut model = CriteriaModel::with_tolerance(
            spec.id,
            spec.version,
            spec.name,
            spec.criteria,
            MAX_TOLERANCE,
        )?
        .with_outcome_bands(spec.outcome_bands)?;
        model.variant = spec.variant;
        Ok(model)
    }
}

impl CriteriaModel {
    pub fn new(
        id: impl Into<String>,
        version: u32,
        name: impl Into<String>,
        criteria: Vec<Criterion>,
    ) -> Result<Self, CriteriaModelError> {
        Self::with_tolerance(id, version, name, criteria, DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(
        id: impl Into<String>,
        version: u32,
        name: impl Into<String>,
        mut criteria: Vec<Criterion>,
        tolerance: f64,
    ) -> Result<Self, CriteriaModelError> {
        validate_tolerance(tolerance)?;
        if criteria.is_empty() {
            return Err(CriteriaModelError::Empty);
        }

        criteria.sort_by(|left, right| left.id.cmp(&right.id));

        let mut seen = BTreeSet::new();
        for criterion in &criteria {
            if criterion.id.trim().is_empty() {
                return Err(CriteriaModelError::BlankCriterionId);
            }
            if !seen.insert(criterion.id.as_str()) {
                return Err(CriteriaModelError::DuplicateCriterion(criterion.id.clone()));
            }
            if !criterion.weight.is_finite() || criterion.weight < 0.0 {
                return Err(CriteriaModelError::InvalidWeight {
                    criterion: criterion.id.clone(),
                    weight: criterion.weight,
                });
            }
            if !criterion.scale.is_valid() {
                return Err(CriteriaModelError::InvalidScale {
                    criterion: criterion.id.clone(),
                    min: criterion.scale.min,
                    max: criterion.scale.max,
                });
            }
        }

        check_weight_sum(&criteria, tolerance)?;

        Ok(Self {
            id: id.into(),
            version,
            name: name.into(),
            variant: None,
            criteria,
            outcome_bands: Vec::new(),
        })
    }

    /// Build a model from raw relative weights, scaling them so they sum to 1.0.
    pub fn from_relative_weights(
        id: impl Into<String>,
        version: u32,
        name: impl Into<String>,
        mut criteria: Vec<Criterion>,
    ) -> Result<Self, CriteriaModelError> {
        criteria.sort_by(|left, right| left.id.cmp(&right.id));
        let sum = weight_sum(&criteria);
        if !sum.is_finite() || sum <= 0.0 {
            return Err(CriteriaModelError::WeightSum { sum });
        }
        for criterion in &mut criteria {
            criterion.weight /= sum;
        }
        Self::new(id, version, name, criteria)
    }

    /// Attach outcome bands; they are stored by descending minimum score.
    pub fn with_outcome_bands(
        mut self,
        mut bands: Vec<OutcomeBand>,
    ) -> Result<Self, CriteriaModelError> {
        if let Some(band) = bands
            .iter()
            .find(|band| !band.min_score.is_finite() || !(0.0..=1.0).contains(&band.min_score))
        {
            return Err(CriteriaModelError::InvalidOutcomeBand {
                label: band.label.clone(),
                min_score: band.min_score,
            });
        }
        bands.sort_by(|left, right| right.min_score.total_cmp(&left.min_score));
        self.outcome_bands = bands;
        Ok(self)
    }

    /// Produce the next version of this model with new criteria. The receiver is untouched.
    pub fn revise(&self, criteria: Vec<Criterion>) -> Result<Self, CriteriaModelError> {
        self.revise_with_tolerance(criteria, DEFAULT_TOLERANCE)
    }

    pub fn revise_with_tolerance(
        &self,
        criteria: Vec<Criterion>,
        tolerance: f64,
    ) -> Result<Self, CriteriaModelError> {
        Self::with_tolerance(
            self.id.clone(),
            self.version + 1,
            self.name.clone(),
            criteria,
            tolerance,
        )?
        .with_outcome_bands(self.outcome_bands.clone())
    }

    /// Unregistered derivative used for what-if scoring; keeps id and version, adds a label.
    pub(crate) fn variant(
        &self,
        label: impl Into<String>,
        criteria: Vec<Criterion>,
        tolerance: f64,
    ) -> Result<Self, CriteriaModelError> {
        let mut model = Self::with_tolerance(
            self.id.clone(),
            self.version,
            self.name.clone(),
            criteria,
            tolerance,
        )?;
        model.variant = Some(label.into());
        model.outcome_bands = self.outcome_bands.clone();
        Ok(model)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version_ref(&self) -> ModelVersion {
        ModelVersion {
            model_id: self.id.clone(),
            version: self.version,
            variant: self.variant.clone(),
        }
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria
            .binary_search_by(|criterion| criterion.id.as_str().cmp(id))
            .ok()
            .map(|index| &self.criteria[index])
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn weight_sum(&self) -> f64 {
        weight_sum(&self.criteria)
    }

    /// Re-check the weight sum against a tighter or looser tolerance than the one the
    /// model was built with.
    pub fn validate_weights(&self, tolerance: f64) -> Result<(), CriteriaModelError> {
        validate_tolerance(tolerance)?;
        check_weight_sum(&self.criteria, tolerance)
    }

    pub fn outcome_bands(&self) -> &[OutcomeBand] {
        &self.outcome_bands
    }

    /// Label of the first band whose minimum is met, falling back to the lowest band.
    pub fn outcome_for(&self, score: f64) -> Option<&str> {
        self.outcome_bands
            .iter()
            .find(|band| score >= band.min_score)
            .or_else(|| self.outcome_bands.last())
            .map(|band| band.label.as_str())
    }
}

pub(crate) fn validate_tolerance(tolerance: f64) -> Result<(), CriteriaModelError> {
    if tolerance.is_finite() && tolerance > 0.0 && tolerance <= MAX_TOLERANCE {
        Ok(())
    } else {
        Err(CriteriaModelError::InvalidTolerance(tolerance))
    }
}

fn weight_sum(criteria: &[Criterion]) -> f64 {
    criteria.iter().map(|criterion| criterion.weight).sum()
}

fn check_weight_sum(criteria: &[Criterion], tolerance: f64) -> Result<(), CriteriaModelError> {
    let sum = weight_sum(criteria);
    if (sum - 1.0).abs() > tolerance {
        return Err(CriteriaModelError::WeightSum { sum });
    }
    Ok(())
}
