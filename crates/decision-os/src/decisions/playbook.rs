//! Remediation playbook derived from a score explanation.

use serde::{Deserialize, Serialize};

use super::criteria::CriteriaModel;
use super::explanation::Explanation;

const FOCUS_AREAS: usize = 3;

/// Normalized values at or below this are flagged outright.
pub const VERY_LOW_NORMALIZED: f64 = 0.3;

const CHECKLIST: [&str; 5] = [
    "Confirm decision owner and stakeholders",
    "Write assumptions explicitly",
    "Define success metrics",
    "Run a quick validation test",
    "Re-score after fixes",
];

const FALLBACK_ACTIONS: [&str; 3] = [
    "Define what 'good' looks like for this criterion.",
    "Collect evidence to increase confidence.",
    "Create a small test to improve this score.",
];

fn actions_for(criterion_id: &str) -> [&'static str; 3] {
    match criterion_id {
        "value" | "impact_value" => [
            "Clarify measurable business impact (revenue, cost, time saved).",
            "Validate customer pain with 5-10 interviews.",
            "Define success metrics and a 30-day experiment.",
        ],
        "feasibility" | "change_complexity" => [
            "Break into milestones and estimate effort for each.",
            "Identify required skills and tools and fill gaps.",
            "Create a small prototype to reduce uncertainty.",
        ],
        "risk" | "financial_risk" | "operational_risk" | "compliance_risk"
        | "reputational_risk" | "resistance_risk" => [
            "List the top five risks (technical, legal, market, delivery).",
            "Add mitigations and owners for each risk.",
            "Run a pre-mortem: why might this fail?",
        ],
        "urgency" => [
            "Define the deadline and what happens if it slips.",
            "Confirm stakeholder priority against other work.",
            "Set a decision date and a fast validation plan.",
        ],
        _ => FALLBACK_ACTIONS,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusArea {
    pub criterion_id: String,
    pub normalized_value: f64,
    pub contribution: f64,
    pub actions: Vec<String>,
}

/// Where to spend effort before the decision is scored again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub summary: String,
    pub focus: Vec<FocusArea>,
    pub flags: Vec<String>,
    pub checklist: Vec<String>,
}

impl Playbook {
    /// Focus on the criteria with the lowest normalized values. An outcome below the
    /// model's top band is flagged as not yet approvable.
    pub fn build(explanation: &Explanation, model: &CriteriaModel) -> Self {
        let focus: Vec<FocusArea> = explanation
            .lowest_normalized(FOCUS_AREAS)
            .into_iter()
            .map(|entry| FocusArea {
                criterion_id: entry.criterion_id.clone(),
                normalized_value: entry.normalized_value,
                contribution: entry.contribution,
                actions: actions_for(&entry.criterion_id)
                    .iter()
                    .map(|action| action.to_string())
                    .collect(),
            })
            .collect();

        let mut flags: Vec<String> = explanation
            .lowest_normalized(explanation.entries.len())
            .into_iter()
            .take_while(|entry| entry.normalized_value <= VERY_LOW_NORMALIZED)
            .map(|entry| {
                format!(
                    "Very low score on '{}' ({:.2} normalized).",
                    entry.criterion_id, entry.normalized_value
                )
            })
            .collect();

        let bands = model.outcome_bands();
        let outcome = model.outcome_for(explanation.total_score);
        if let (Some(top), Some(outcome)) = (bands.first(), outcome) {
            if bands.len() > 1 && outcome != top.label {
                flags.push(format!(
                    "Outcome '{outcome}' indicates risk; treat as not approved until fixes are done."
                ));
            }
        }

        let summary = if focus.is_empty() {
            "No criteria to focus on".to_string()
        } else {
            let ids: Vec<&str> = focus.iter().map(|area| area.criterion_id.as_str()).collect();
            format!("Top focus areas: {}", ids.join(", "))
        };

        Self {
            summary,
            focus,
            flags,
            checklist: CHECKLIST.iter().map(|item| item.to_string()).collect(),
        }
    }
}
