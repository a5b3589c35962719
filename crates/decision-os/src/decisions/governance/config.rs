use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::rules::ReadinessRule;

/// A readiness rule with the name it is reported under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRule {
    pub name: String,
    pub rule: ReadinessRule,
}

impl NamedRule {
    pub fn new(name: impl Into<String>, rule: ReadinessRule) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }
}

/// Versionable governance configuration evaluated at readiness time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRuleSet")]
pub struct RuleSet {
    name: String,
    rules: Vec<NamedRule>,
}

#[derive(Deserialize)]
struct RawRuleSet {
    name: String,
    rules: Vec<NamedRule>,
}

impl TryFrom<RawRuleSet> for RuleSet {
    type Error = RuleSetError;

    fn try_from(raw: RawRuleSet) -> Result<Self, Self::Error> {
        RuleSet::new(raw.name, raw.rules)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("rule set must contain at least one rule")]
    Empty,
    #[error("rule names must not be blank")]
    BlankName,
    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),
    #[error("rule '{name}' has invalid threshold {threshold}")]
    InvalidThreshold { name: String, threshold: f64 },
    #[error("decision type keys must not be blank")]
    BlankDecisionType,
    #[error("decision type '{0}' is configured more than once")]
    DuplicateDecisionType(String),
    #[error("failed to read rule set {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rule set: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RuleSet {
    pub fn new(name: impl Into<String>, rules: Vec<NamedRule>) -> Result<Self, RuleSetError> {
        if rules.is_empty() {
            return Err(RuleSetError::Empty);
        }
        let mut seen = BTreeSet::new();
        for named in &rules {
            if named.name.trim().is_empty() {
                return Err(RuleSetError::BlankName);
            }
            if !seen.insert(named.name.as_str()) {
                return Err(RuleSetError::DuplicateRule(named.name.clone()));
            }
            if let Some(threshold) = named.rule.threshold() {
                if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
                    return Err(RuleSetError::InvalidThreshold {
                        name: named.name.clone(),
                        threshold,
                    });
                }
            }
        }
        Ok(Self {
            name: name.into(),
            rules,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, RuleSetError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleSetError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| RuleSetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Default gate: score floor, a complete breakdown, and an accountable owner.
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            rules: vec![
                NamedRule::new(
                    "minimum_score",
                    ReadinessRule::MinimumScore { threshold: 0.6 },
                ),
                NamedRule::new(
                    "explanation_complete",
                    ReadinessRule::ExplanationCompleteness { threshold: 1.0 },
                ),
                NamedRule::new("owner_assigned", ReadinessRule::OwnerAssigned),
                NamedRule::new(
                    "accountability_confirmed",
                    ReadinessRule::AccountabilityConfirmed,
                ),
                NamedRule::new(
                    "one_way_risks_documented",
                    ReadinessRule::RisksDocumented {
                        irreversible_only: true,
                    },
                ),
                NamedRule::new("no_overconfidence", ReadinessRule::NoOverconfidence),
                NamedRule::new(
                    "strategic_one_way_floor",
                    ReadinessRule::SeverityFloor {
                        decision_type: "strategic".to_string(),
                        one_way_only: true,
                        threshold: 0.75,
                    },
                ),
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[NamedRule] {
        &self.rules
    }
}

/// Server-side readiness policy: one rule set per decision type plus a fallback.
///
/// Decision types are matched case-insensitively after trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRuleBook")]
pub struct RuleBook {
    default: RuleSet,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    decision_types: BTreeMap<String, RuleSet>,
}

/// A rule book file holds either a single rule set or a default plus per-type sets.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRuleBook {
    Book {
        default: RuleSet,
        #[serde(default)]
        decision_types: BTreeMap<String, RuleSet>,
    },
    Single(RuleSet),
}

impl TryFrom<RawRuleBook> for RuleBook {
    type Error = RuleSetError;

    fn try_from(raw: RawRuleBook) -> Result<Self, Self::Error> {
        match raw {
            RawRuleBook::Single(rules) => Ok(RuleBook::new(rules)),
            RawRuleBook::Book {
                default,
                decision_types,
            } => decision_types
                .into_iter()
                .try_fold(RuleBook::new(default), |book, (decision_type, rules)| {
                    book.with_decision_type(decision_type, rules)
                }),
        }
    }
}

impl From<RuleSet> for RuleBook {
    fn from(rules: RuleSet) -> Self {
        RuleBook::new(rules)
    }
}

impl RuleBook {
    pub fn new(default: RuleSet) -> Self {
        Self {
            default,
            decision_types: BTreeMap::new(),
        }
    }

    pub fn standard() -> Self {
        Self::new(RuleSet::standard())
    }

    /// Bind `rules` to one decision type.
    pub fn with_decision_type(
        mut self,
        decision_type: impl AsRef<str>,
        rules: RuleSet,
    ) -> Result<Self, RuleSetError> {
        let key = normalize_decision_type(decision_type.as_ref());
        if key.is_empty() {
            return Err(RuleSetError::BlankDecisionType);
        }
        if self.decision_types.contains_key(&key) {
            return Err(RuleSetError::DuplicateDecisionType(key));
        }
        self.decision_types.insert(key, rules);
        Ok(self)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, RuleSetError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleSetError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| RuleSetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Rule set governing decisions of `decision_type`.
    pub fn for_decision_type(&self, decision_type: &str) -> &RuleSet {
        self.decision_types
            .get(&normalize_decision_type(decision_type))
            .unwrap_or(&self.default)
    }

    pub fn default_rules(&self) -> &RuleSet {
        &self.default
    }

    pub fn decision_types(&self) -> impl Iterator<Item = &str> {
        self.decision_types.keys().map(String::as_str)
    }
}

fn normalize_decision_type(decision_type: &str) -> String {
    decision_type.trim().to_lowercase()
}
