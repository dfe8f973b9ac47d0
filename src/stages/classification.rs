use std::collections::BTreeMap;

use serde_json::Value;

use super::{object_fields, scalar_text, unknown, validate_choice, StageDefinition};
use crate::error::StageError;
use crate::models::{DisplayItem, FieldValue, ParamValue, Parameters, StageKind};

pub const TYPE_OF_CLASSIFIER: &str = "typeOfClassifier";
pub const DEFAULT_CLASSIFICATION_RESULT: &str = "defaultClassificationResult";

pub const CLASSIFIER_TYPES: &[&str] = &[
    "SimpleRuleClassifier",
    "SimpleOptimizingCountingRuleClassifier",
];
pub const DEFAULT_RESULTS: &[&str] = &["majorityDecisionClass", "medianDecisionClass"];

pub const MISCLASSIFICATION_MATRIX: &str = "ordinalMisclassificationMatrix";

/// Objects classified with the induced rule set
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationStage;

impl StageDefinition for ClassificationStage {
    fn kind(&self) -> StageKind {
        StageKind::Classification
    }

    fn default_parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(
            TYPE_OF_CLASSIFIER.to_string(),
            ParamValue::Text("SimpleRuleClassifier".to_string()),
        );
        params.insert(
            DEFAULT_CLASSIFICATION_RESULT.to_string(),
            ParamValue::Text("majorityDecisionClass".to_string()),
        );
        params
    }

    fn validate(&self, name: &str, value: ParamValue) -> Result<ParamValue, StageError> {
        match name {
            TYPE_OF_CLASSIFIER => validate_choice(name, &value, CLASSIFIER_TYPES),
            DEFAULT_CLASSIFICATION_RESULT => validate_choice(name, &value, DEFAULT_RESULTS),
            _ => Err(unknown(self.kind(), name)),
        }
    }

    /// One item per classified object, in information-table order
    fn project(&self, result: &Value) -> Vec<DisplayItem> {
        let Some(results) = result.get("classificationResults").and_then(Value::as_array) else {
            return Vec::new();
        };
        let covering = result.get("indicesOfCoveringRules").and_then(Value::as_array);

        results
            .iter()
            .enumerate()
            .map(|(id, classified)| {
                let mut fields: BTreeMap<_, _> = object_fields(Some(classified)).into_iter().collect();

                if let Some(suggested) = classified.get("suggestedDecision") {
                    let decision = match suggested {
                        Value::Object(_) | Value::Array(_) => suggested_text(suggested),
                        scalar => scalar_text(scalar),
                    };
                    fields.insert(
                        "suggestedDecision".to_string(),
                        FieldValue::Text(decision),
                    );
                }

                let rules = covering
                    .and_then(|all| all.get(id))
                    .and_then(Value::as_array)
                    .map(|indices| FieldValue::Number(indices.len() as f64))
                    .unwrap_or(FieldValue::NotApplicable);
                fields.insert("coveringRules".to_string(), rules);

                DisplayItem::new(id, format!("Object {}", id + 1), fields)
            })
            .collect()
    }
}

/// Objects of one true decision and how many were classified into it
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionCounts {
    pub decision: String,
    pub objects: f64,
    pub correct: f64,
}

/// Ordinal misclassification matrix of a classification result.
///
/// Rows of `value` are true decisions in `decisionsDomain` order, columns are
/// suggested decisions. Scalar entries next to `value` are kept as statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct MisclassificationSummary {
    pub accuracy: Option<f64>,
    pub decisions: Vec<DecisionCounts>,
    pub statistics: BTreeMap<String, f64>,
}

impl MisclassificationSummary {
    pub fn from_result(result: &Value) -> Option<Self> {
        let matrix = result.get(MISCLASSIFICATION_MATRIX)?.as_object()?;

        let domain: Vec<String> = result
            .get("decisionsDomain")
            .and_then(Value::as_array)
            .map(|decisions| decisions.iter().map(suggested_text).collect())
            .unwrap_or_default();

        let rows: Vec<Vec<f64>> = matrix
            .get("value")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(|c| c.as_f64().unwrap_or(0.0)).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        let decisions: Vec<DecisionCounts> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| DecisionCounts {
                decision: domain
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("decision {}", i + 1)),
                objects: row.iter().sum(),
                correct: row.get(i).copied().unwrap_or(0.0),
            })
            .collect();

        let statistics: BTreeMap<String, f64> = matrix
            .iter()
            .filter_map(|(name, value)| Some((name.clone(), value.as_f64()?)))
            .collect();

        let accuracy = statistics.get("Accuracy").copied().or_else(|| {
            let total: f64 = decisions.iter().map(|d| d.objects).sum();
            let correct: f64 = decisions.iter().map(|d| d.correct).sum();
            (total > 0.0).then(|| correct / total)
        });

        Some(Self {
            accuracy,
            decisions,
            statistics,
        })
    }
}

/// Flatten a structured decision into "a, b" text
fn suggested_text(value: &Value) -> String {
    match value {
        Value::Object(map) => map.values().map(suggested_text).collect::<Vec<_>>().join(", "),
        Value::Array(values) => values.iter().map(suggested_text).collect::<Vec<_>>().join(", "),
        scalar => scalar_text(scalar),
    }
}
