//! Built-in decision templates.
//!
//! Every template scores five criteria on a 0-10 scale and maps the normalized total
//! onto three outcome bands.

use serde::{Deserialize, Serialize};

use super::criteria::{CriteriaModel, CriteriaModelError, Criterion, OutcomeBand};

pub const GO_NO_GO: &str = "go_no_go";
pub const RISK_EXPOSURE: &str = "risk_exposure";
pub const CHANGE_IMPACT: &str = "change_impact";

const UPPER_BAND: f64 = 0.75;
const MIDDLE_BAND: f64 = 0.60;

/// Coarse confidence label attached to a total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn for_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceBand::High
        } else if score >= 0.6 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceBand::High => "HIGH",
            ConfidenceBand::Medium => "MEDIUM",
            ConfidenceBand::Low => "LOW",
        }
    }
}

struct TemplateDefinition {
    id: &'static str,
    name: &'static str,
    criteria: [(&'static str, f64); 5],
    bands: [&'static str; 3],
}

const TEMPLATES: [TemplateDefinition; 3] = [
    TemplateDefinition {
        id: GO_NO_GO,
        name: "Go / No-Go Decision",
        criteria: [
            ("value", 0.25),
            ("feasibility", 0.25),
            ("risk", 0.20),
            ("alignment", 0.20),
            ("urgency", 0.10),
        ],
        bands: ["PROCEED", "REVIEW / REVISE", "DO NOT PROCEED"],
    },
    TemplateDefinition {
        id: RISK_EXPOSURE,
        name: "Risk Exposure Assessment",
        criteria: [
            ("financial_risk", 0.30),
            ("operational_risk", 0.25),
            ("compliance_risk", 0.20),
            ("reputational_risk", 0.15),
            ("control_readiness", 0.10),
        ],
        bands: ["LOW RISK", "MODERATE RISK", "HIGH RISK"],
    },
    TemplateDefinition {
        id: CHANGE_IMPACT,
        name: "Change Impact Decision",
        criteria: [
            ("impact_value", 0.30),
            ("change_complexity", 0.25),
            ("team_readiness", 0.20),
            ("resistance_risk", 0.15),
            ("reversibility", 0.10),
        ],
        bands: ["SAFE TO IMPLEMENT", "IMPLEMENT WITH CAUTION", "HIGH IMPACT RISK"],
    },
];

impl TemplateDefinition {
    fn build(&self) -> Result<CriteriaModel, CriteriaModelError> {
        let criteria = self
            .criteria
            .iter()
            .map(|(id, weight)| Criterion::maximize(*id, *weight, 0.0, 10.0))
            .collect();
        let [upper, middle, lower] = self.bands;
        CriteriaModel::new(self.id, 1, self.name, criteria)?.with_outcome_bands(vec![
            OutcomeBand::new(UPPER_BAND, upper),
            OutcomeBand::new(MIDDLE_BAND, middle),
            OutcomeBand::new(0.0, lower),
        ])
    }
}

/// All built-in templates at version 1.
pub fn builtin_templates() -> Result<Vec<CriteriaModel>, CriteriaModelError> {
    TEMPLATES.iter().map(TemplateDefinition::build).collect()
}

pub fn builtin_template(id: &str) -> Option<Result<CriteriaModel, CriteriaModelError>> {
    TEMPLATES
        .iter()
        .find(|template| template.id == id)
        .map(TemplateDefinition::build)
}
