use std::collections::BTreeMap;

use serde_json::Value;

use super::{
    object_fields, unknown, validate_choice, validate_threshold, StageDefinition,
    CONSISTENCY_THRESHOLD, TYPE_OF_UNIONS,
};
use crate::error::StageError;
use crate::models::{DisplayItem, ParamValue, Parameters, StageKind};

pub const TYPE_OF_RULES: &str = "typeOfRules";
pub const RULE_TYPES: &[&str] = &["certain", "possible"];

/// Decision rules induced from the unions
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesStage;

impl StageDefinition for RulesStage {
    fn kind(&self) -> StageKind {
        StageKind::Rules
    }

    fn default_parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(CONSISTENCY_THRESHOLD.to_string(), ParamValue::Number(0.0));
        params.insert(
            TYPE_OF_RULES.to_string(),
            ParamValue::Text("certain".to_string()),
        );
        params.insert(
            TYPE_OF_UNIONS.to_string(),
            ParamValue::Text("monotonic".to_string()),
        );
        params
    }

    fn validate(&self, name: &str, value: ParamValue) -> Result<ParamValue, StageError> {
        match name {
            CONSISTENCY_THRESHOLD => validate_threshold(name, &value),
            TYPE_OF_RULES => validate_choice(name, &value, RULE_TYPES),
            // rules are always induced from monotonic unions
            TYPE_OF_UNIONS => validate_choice(name, &value, &["monotonic"]),
            _ => Err(unknown(self.kind(), name)),
        }
    }

    /// Possible rules ignore the consistency threshold
    fn normalize(&self, parameters: &mut Parameters, changed: &str) {
        if changed == TYPE_OF_RULES && possible_rules(parameters) {
            parameters.insert(CONSISTENCY_THRESHOLD.to_string(), ParamValue::Number(0.0));
        }
    }

    fn locked(&self, parameters: &Parameters, name: &str) -> Option<String> {
        (name == CONSISTENCY_THRESHOLD && possible_rules(parameters))
            .then(|| "fixed at 0 while typeOfRules is possible".to_string())
    }

    fn project(&self, result: &Value) -> Vec<DisplayItem> {
        let Some(rule_set) = result.get("ruleSet").and_then(Value::as_array) else {
            return Vec::new();
        };

        rule_set
            .iter()
            .enumerate()
            .map(|(id, entry)| {
                let label = match entry.get("rule") {
                    Some(Value::String(text)) => text.clone(),
                    Some(rule) => rule
                        .get("toString")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("rule {}", id + 1)),
                    None => format!("rule {}", id + 1),
                };

                let fields: BTreeMap<_, _> =
                    object_fields(entry.get("ruleCharacteristics")).into_iter().collect();

                DisplayItem::new(id, label, fields)
            })
            .collect()
    }
}

fn possible_rules(parameters: &Parameters) -> bool {
    parameters.get(TYPE_OF_RULES).and_then(ParamValue::as_text) == Some("possible")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use serde_json::json;

    #[test]
    fn test_possible_rules_reset_threshold() {
        let mut params = RulesStage.default_parameters();
        params.insert(CONSISTENCY_THRESHOLD.to_string(), ParamValue::Number(0.4));
        params.insert(
            TYPE_OF_RULES.to_string(),
            ParamValue::Text("possible".to_string()),
        );

        RulesStage.normalize(&mut params, TYPE_OF_RULES);
        assert_eq!(params.get(CONSISTENCY_THRESHOLD), Some(&ParamValue::Number(0.0)));
    }

    #[test]
    fn test_certain_rules_keep_threshold() {
        let mut params = RulesStage.default_parameters();
        params.insert(CONSISTENCY_THRESHOLD.to_string(), ParamValue::Number(0.4));

        RulesStage.normalize(&mut params, CONSISTENCY_THRESHOLD);
        assert_eq!(params.get(CONSISTENCY_THRESHOLD), Some(&ParamValue::Number(0.4)));
    }

    #[test]
    fn test_threshold_locked_for_possible_rules() {
        let mut params = RulesStage.default_parameters();
        assert_eq!(RulesStage.locked(&params, CONSISTENCY_THRESHOLD), None);

        params.insert(
            TYPE_OF_RULES.to_string(),
            ParamValue::Text("possible".to_string()),
        );
        assert!(RulesStage.locked(&params, CONSISTENCY_THRESHOLD).is_some());
        assert_eq!(RulesStage.locked(&params, TYPE_OF_RULES), None);
    }

    #[test]
    fn test_epsilon_unions_rejected() {
        assert!(RulesStage
            .validate(TYPE_OF_UNIONS, ParamValue::Text("epsilon".to_string()))
            .is_err());
    }

    #[test]
    fn test_project_rules() {
        let result = json!({
            "ruleSet": [
                {"rule": {"toString": "(q1 >= 3) => (d >= 2)"},
                 "ruleCharacteristics": {"Support": 4, "Confidence": 1.0, "Epsilon": "-"}},
                {"rule": "(q2 <= 1) => (d <= 1)", "ruleCharacteristics": {"Support": 2}},
                {}
            ],
            "typeOfRules": "certain"
        });

        let items = RulesStage.project(&result);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].label(), "(q1 >= 3) => (d >= 2)");
        assert_eq!(items[1].label(), "(q2 <= 1) => (d <= 1)");
        assert_eq!(items[2].label(), "rule 3");
        assert_eq!(items[0].field("Support"), Some(FieldValue::Number(4.0)));
        assert_eq!(items[0].field("Epsilon"), Some(FieldValue::NotApplicable));
    }
}
