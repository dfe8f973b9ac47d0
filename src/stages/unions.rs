use std::collections::BTreeMap;

use serde_json::Value;

use super::{
    scalar_text, unknown, validate_choice, validate_threshold, StageDefinition,
    CONSISTENCY_THRESHOLD, TYPE_OF_UNIONS,
};
use crate::error::StageError;
use crate::models::{DisplayItem, FieldValue, ParamValue, Parameters, StageKind};

pub const UNION_TYPES: &[&str] = &["monotonic", "epsilon"];

/// Unions of ordered decision classes with their approximations
#[derive(Debug, Clone, Copy, Default)]
pub struct UnionsStage;

impl StageDefinition for UnionsStage {
    fn kind(&self) -> StageKind {
        StageKind::Unions
    }

    fn default_parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(CONSISTENCY_THRESHOLD.to_string(), ParamValue::Number(0.0));
        params.insert(
            TYPE_OF_UNIONS.to_string(),
            ParamValue::Text("monotonic".to_string()),
        );
        params
    }

    fn validate(&self, name: &str, value: ParamValue) -> Result<ParamValue, StageError> {
        match name {
            CONSISTENCY_THRESHOLD => validate_threshold(name, &value),
            TYPE_OF_UNIONS => validate_choice(name, &value, UNION_TYPES),
            _ => Err(unknown(self.kind(), name)),
        }
    }

    /// Downward unions first, then upward; ids count across both lists
    fn project(&self, result: &Value) -> Vec<DisplayItem> {
        let mut items = Vec::new();

        for list in ["downwardUnions", "upwardUnions"] {
            let Some(unions) = result.get(list).and_then(Value::as_array) else {
                continue;
            };

            for union in unions {
                let union_type = union
                    .get("unionType")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .replacen('_', " ", 1)
                    .to_lowercase();
                let decision = union
                    .get("limitingDecision")
                    .map(scalar_text)
                    .unwrap_or_default();

                let mut fields = BTreeMap::new();
                fields.insert(
                    "accuracy".to_string(),
                    FieldValue::from_json(union.get("accuracyOfApproximation")),
                );
                fields.insert(
                    "quality".to_string(),
                    FieldValue::from_json(union.get("qualityOfApproximation")),
                );

                let label = format!("{} {}", union_type, decision).trim().to_string();
                items.push(DisplayItem::new(items.len(), label, fields));
            }
        }

        items
    }
}
