use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{SortOrder, StageKind};

/// A primitive stage option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Parse user input: booleans, numbers (a decimal comma is accepted), otherwise text
    pub fn parse_input(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        match trimmed.replace(',', ".").parse::<f64>() {
            Ok(n) if n.is_finite() => ParamValue::Number(n),
            _ => ParamValue::Text(trimmed.to_string()),
        }
    }

    /// Numeric view of the value, coercing numeric text
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(s) => s.trim().replace(',', ".").parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON scalar echoed by the server
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ParamValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(ParamValue::Number),
            Value::String(s) => Some(ParamValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Stage option name -> value
pub type Parameters = BTreeMap<String, ParamValue>;

/// Cosmetic list settings of a stage view; never part of the compute parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSettings {
    pub sort_field: String,
    pub order: SortOrder,
    #[serde(default)]
    pub query: String,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            sort_field: "id".to_string(),
            order: SortOrder::Asc,
            query: String::new(),
        }
    }
}

/// Persisted state of one pipeline stage inside a Project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// Editable compute options
    pub parameters: Parameters,
    /// Payload of the last successful compute call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<Value>,
    /// True iff `parameters` produced `last_result`
    pub parameters_saved: bool,
    /// True iff `last_result` reflects the current upstream state
    pub is_current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view: ViewSettings,
}

impl StageRecord {
    pub fn new(parameters: Parameters) -> Self {
        Self {
            parameters,
            last_result: None,
            parameters_saved: true,
            is_current: true,
            computed_at: None,
            view: ViewSettings::default(),
        }
    }
}

/// Reference to the raw dataset a project was imported from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub file_name: String,
}

/// The persistent unit of work, owned by the project synchronizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub dataset: DatasetRef,
    stages: [StageRecord; 3],
    /// The rule set was uploaded rather than induced
    #[serde(default)]
    pub external_rules: bool,
    /// Classification ran against uploaded objects
    #[serde(default)]
    pub external_data: bool,
}

impl Project {
    /// Create a project whose stages hold their default parameters
    pub fn new(id: Uuid, name: impl Into<String>, dataset: DatasetRef) -> Self {
        let stages = StageKind::ALL.map(|kind| {
            StageRecord::new(crate::stages::definition(kind).default_parameters())
        });

        Self {
            id,
            name: name.into(),
            dataset,
            stages,
            external_rules: false,
            external_data: false,
        }
    }

    pub fn stage(&self, kind: StageKind) -> &StageRecord {
        &self.stages[kind.position()]
    }

    pub fn stage_mut(&mut self, kind: StageKind) -> &mut StageRecord {
        &mut self.stages[kind.position()]
    }

    /// Records in pipeline order
    pub fn stages(&self) -> impl Iterator<Item = (StageKind, &StageRecord)> {
        StageKind::ALL.into_iter().zip(self.stages.iter())
    }

    /// `is_current` flags in pipeline order
    pub fn current_flags(&self) -> [bool; 3] {
        [
            self.stages[0].is_current,
            self.stages[1].is_current,
            self.stages[2].is_current,
        ]
    }

    /// Replace a stage's record with one returned by a controller.
    ///
    /// `is_current` is kept: it is only ever written by staleness propagation.
    pub fn merge_stage(&mut self, kind: StageKind, record: StageRecord) {
        let slot = &mut self.stages[kind.position()];
        let is_current = slot.is_current;
        *slot = StageRecord { is_current, ..record };
    }
}
