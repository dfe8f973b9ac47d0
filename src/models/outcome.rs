use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StageKind;

/// Consistency hints optionally carried by a compute-service envelope.
///
/// Every field is optional; absence means the server said nothing about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyHints {
    pub is_current_data: Option<bool>,
    pub is_current_learning_data: Option<bool>,
    pub is_current_rule_set: Option<bool>,
    pub external_data: Option<bool>,
    pub external_rules: Option<bool>,
    pub error_message: Option<String>,
    /// Hints about the classification stage reported by a rules response
    pub classification: Option<ClassificationHints>,
}

/// Nested `validateCurrentData.classification` hints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationHints {
    pub is_current_learning_data: Option<bool>,
    pub is_current_rule_set: Option<bool>,
    pub external_data: Option<bool>,
}

impl ClassificationHints {
    /// Learning-data flag combined with the rule-set flag when both are present
    pub fn is_current(&self) -> Option<bool> {
        combine(self.is_current_learning_data, self.is_current_rule_set)
    }
}

fn combine(learning_data: Option<bool>, rule_set: Option<bool>) -> Option<bool> {
    learning_data.map(|current| current && rule_set.unwrap_or(true))
}

fn flag(object: &Value, key: &str) -> Option<bool> {
    object.get(key).and_then(Value::as_bool)
}

impl ConsistencyHints {
    /// Extract hints from a response envelope by explicit presence checks
    pub fn from_envelope(envelope: &Value) -> Self {
        let classification = envelope
            .get("validateCurrentData")
            .and_then(|v| v.get("classification"))
            .filter(|v| v.is_object())
            .map(|nested| ClassificationHints {
                is_current_learning_data: flag(nested, "isCurrentLearningData"),
                is_current_rule_set: flag(nested, "isCurrentRuleSet"),
                external_data: flag(nested, "externalData"),
            });

        Self {
            is_current_data: flag(envelope, "isCurrentData"),
            is_current_learning_data: flag(envelope, "isCurrentLearningData"),
            is_current_rule_set: flag(envelope, "isCurrentRuleSet"),
            external_data: flag(envelope, "externalData"),
            external_rules: flag(envelope, "externalRules"),
            error_message: envelope
                .get("errorMessage")
                .and_then(Value::as_str)
                .map(str::to_string),
            classification,
        }
    }

    /// Whether the responding stage's input was still current, if the server said so
    pub fn upstream_current(&self, stage: StageKind) -> Option<bool> {
        match stage {
            StageKind::Classification => {
                combine(self.is_current_learning_data, self.is_current_rule_set)
                    .or(self.is_current_data)
            }
            StageKind::Unions | StageKind::Rules => self.is_current_data,
        }
    }
}

/// Structured response of a compute call
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOutcome {
    /// Native result payload of the stage
    pub result: Value,
    pub hints: ConsistencyHints,
}

impl ComputeOutcome {
    pub fn from_envelope(envelope: Value) -> Self {
        let hints = ConsistencyHints::from_envelope(&envelope);
        Self {
            result: envelope,
            hints,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Stage-level alert; at most one is held per stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub title: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_hints_stay_absent() {
        let hints = ConsistencyHints::from_envelope(&json!({"ruleSet": []}));
        assert_eq!(hints, ConsistencyHints::default());
        assert_eq!(hints.upstream_current(StageKind::Rules), None);
    }

    #[test]
    fn test_wrongly_typed_hint_is_ignored() {
        let hints = ConsistencyHints::from_envelope(&json!({"isCurrentData": "no"}));
        assert_eq!(hints.is_current_data, None);
    }

    #[test]
    fn test_classification_combines_flags() {
        let hints = ConsistencyHints::from_envelope(&json!({
            "isCurrentLearningData": true,
            "isCurrentRuleSet": false
        }));
        assert_eq!(hints.upstream_current(StageKind::Classification), Some(false));

        let hints = ConsistencyHints::from_envelope(&json!({"isCurrentRuleSet": false}));
        assert_eq!(hints.upstream_current(StageKind::Classification), None);
    }

    #[test]
    fn test_nested_classification_hints() {
        let outcome = ComputeOutcome::from_envelope(json!({
            "ruleSet": [],
            "externalRules": false,
            "validateCurrentData": {
                "classification": {"isCurrentLearningData": false, "externalData": true},
                "unions": {"isCurrentData": false}
            }
        }));
        let nested = outcome.hints.classification.unwrap();
        assert_eq!(nested.is_current(), Some(false));
        assert_eq!(nested.external_data, Some(true));
        assert_eq!(outcome.hints.external_rules, Some(false));
    }
}
