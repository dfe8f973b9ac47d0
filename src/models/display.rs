use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker shown for values that do not apply to an item
pub const NOT_APPLICABLE: &str = "-";

/// Sort direction of a list view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

/// A sortable, searchable value of a display item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    NotApplicable,
}

impl FieldValue {
    /// Convert a JSON value from a stage result; null and missing values do not apply
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n
                .as_f64()
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::NotApplicable),
            Some(Value::String(s)) if s == NOT_APPLICABLE => FieldValue::NotApplicable,
            Some(Value::String(s)) => FieldValue::Text(s.clone()),
            Some(Value::Bool(b)) => FieldValue::Text(b.to_string()),
            _ => FieldValue::NotApplicable,
        }
    }

    /// True for the "-" sentinel in either representation
    pub fn is_not_applicable(&self) -> bool {
        match self {
            FieldValue::NotApplicable => true,
            FieldValue::Text(s) => s == NOT_APPLICABLE,
            FieldValue::Number(_) => false,
        }
    }

    /// Numeric coercion used for ordering
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::NotApplicable => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::NotApplicable => f.write_str(NOT_APPLICABLE),
        }
    }
}

/// Immutable per-row projection of a stage result.
///
/// `id` is the row's index in the original result and is never reassigned.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayItem {
    id: usize,
    label: String,
    fields: BTreeMap<String, FieldValue>,
    tokens: Vec<String>,
}

impl DisplayItem {
    pub fn new(id: usize, label: impl Into<String>, fields: BTreeMap<String, FieldValue>) -> Self {
        let label = label.into();

        let mut tokens = vec![label.to_lowercase()];
        tokens.extend(fields.values().filter_map(|value| match value {
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Text(s) => Some(s.to_lowercase()),
            FieldValue::NotApplicable => None,
        }));

        Self {
            id,
            label,
            fields,
            tokens,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Value of a sortable field; the synthetic field "id" is the insertion index
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        if name == "id" {
            return Some(FieldValue::Number(self.id as f64));
        }
        self.fields.get(name).cloned()
    }

    /// Lowercased searchable tokens: the label plus string and number field values
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_cover_label_and_values() {
        let mut fields = BTreeMap::new();
        fields.insert("quality".to_string(), FieldValue::Number(0.75));
        fields.insert("decision".to_string(), FieldValue::Text("Good".to_string()));
        fields.insert("support".to_string(), FieldValue::NotApplicable);

        let item = DisplayItem::new(4, "At Least 2", fields);
        assert_eq!(item.tokens(), ["at least 2", "good", "0.75"]);
        assert_eq!(item.field("id"), Some(FieldValue::Number(4.0)));
        assert_eq!(item.field("missing"), None);
    }

    #[test]
    fn test_field_from_json() {
        assert_eq!(
            FieldValue::from_json(Some(&serde_json::json!(2))),
            FieldValue::Number(2.0)
        );
        assert!(FieldValue::from_json(Some(&serde_json::json!("-"))).is_not_applicable());
        assert!(FieldValue::from_json(None).is_not_applicable());
        assert!(FieldValue::from_json(Some(&Value::Null)).is_not_applicable());
    }
}
