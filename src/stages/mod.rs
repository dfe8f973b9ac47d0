pub mod classification;
pub mod rules;
pub mod unions;

pub use classification::*;
pub use rules::*;
pub use unions::*;

use serde_json::Value;

use crate::error::StageError;
use crate::models::{DisplayItem, FieldValue, ParamValue, Parameters, StageKind};

pub const CONSISTENCY_THRESHOLD: &str = "consistencyThreshold";
pub const TYPE_OF_UNIONS: &str = "typeOfUnions";

/// What a pipeline stage declares about itself
pub trait StageDefinition: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Parameters of a stage that was never edited
    fn default_parameters(&self) -> Parameters;

    /// Check one edited value and return its canonical form
    fn validate(&self, name: &str, value: ParamValue) -> Result<ParamValue, StageError>;

    /// Re-establish cross-parameter rules after `changed` was edited
    fn normalize(&self, _parameters: &mut Parameters, _changed: &str) {}

    /// Why `name` cannot be edited given the other parameters, if it cannot
    fn locked(&self, _parameters: &Parameters, _name: &str) -> Option<String> {
        None
    }

    /// Turn the opaque result into display items, one per result row
    fn project(&self, result: &Value) -> Vec<DisplayItem>;

    /// Parameters the server echoes back inside a result
    fn result_parameters(&self, result: &Value) -> Parameters {
        self.default_parameters()
            .into_keys()
            .filter_map(|name| {
                let value = result.get(&name).and_then(ParamValue::from_json)?;
                Some((name, value))
            })
            .collect()
    }
}

/// The definition of a stage
pub fn definition(kind: StageKind) -> &'static dyn StageDefinition {
    match kind {
        StageKind::Unions => &UnionsStage,
        StageKind::Rules => &RulesStage,
        StageKind::Classification => &ClassificationStage,
    }
}

/// Consistency threshold in [0, 1]
pub(crate) fn validate_threshold(name: &str, value: &ParamValue) -> Result<ParamValue, StageError> {
    let threshold = value
        .as_number()
        .ok_or_else(|| StageError::validation(name, format!("expected a number, got {}", value)))?;

    if !(0.0..=1.0).contains(&threshold) {
        return Err(StageError::validation(
            name,
            format!("{} is outside [0, 1]", threshold),
        ));
    }

    Ok(ParamValue::Number(threshold))
}

pub(crate) fn validate_choice(
    name: &str,
    value: &ParamValue,
    allowed: &[&str],
) -> Result<ParamValue, StageError> {
    match value.as_text() {
        Some(choice) if allowed.contains(&choice) => Ok(ParamValue::Text(choice.to_string())),
        _ => Err(StageError::validation(
            name,
            format!("{} is not one of {}", value, allowed.join(", ")),
        )),
    }
}

pub(crate) fn unknown(kind: StageKind, name: &str) -> StageError {
    StageError::UnknownParameter {
        stage: kind,
        parameter: name.to_string(),
    }
}

/// Text of a scalar JSON value; strings are not quoted
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Copy every scalar entry of a JSON object into display fields
pub(crate) fn object_fields(object: Option<&Value>) -> Vec<(String, FieldValue)> {
    object
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter(|(_, v)| !v.is_array() && !v.is_object())
                .map(|(k, v)| (k.clone(), FieldValue::from_json(Some(v))))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_threshold_bounds() {
        assert_eq!(
            validate_threshold("t", &ParamValue::Text("0,25".to_string())),
            Ok(ParamValue::Number(0.25))
        );
        assert!(validate_threshold("t", &ParamValue::Number(1.5)).is_err());
        assert!(validate_threshold("t", &ParamValue::Number(-0.1)).is_err());
        assert!(validate_threshold("t", &ParamValue::Bool(true)).is_err());
    }

    #[test]
    fn test_result_parameters_only_known_names() {
        let result = json!({
            "consistencyThreshold": 0.2,
            "typeOfUnions": "epsilon",
            "qualityOfApproximation": 0.9
        });
        let params = definition(StageKind::Unions).result_parameters(&result);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get(CONSISTENCY_THRESHOLD), Some(&ParamValue::Number(0.2)));
    }

    #[test]
    fn test_every_stage_has_a_definition() {
        for kind in StageKind::ALL {
            assert_eq!(definition(kind).kind(), kind);
            assert!(!definition(kind).default_parameters().is_empty());
        }
    }
}
