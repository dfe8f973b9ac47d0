use crate::models::DisplayItem;

/// Keep items with at least one searchable token containing `query`, case-insensitively.
///
/// An empty query keeps every item. The input is never modified and the
/// relative order of kept items is preserved.
pub fn filter_items(query: &str, items: &[DisplayItem]) -> Vec<DisplayItem> {
    if query.is_empty() {
        return items.to_vec();
    }

    let needle = query.to_lowercase();
    items
        .iter()
        .filter(|item| item.tokens().iter().any(|token| token.contains(&needle)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::FieldValue;

    fn item(id: usize, label: &str, decision: &str) -> DisplayItem {
        let mut fields = BTreeMap::new();
        fields.insert("decision".to_string(), FieldValue::Text(decision.to_string()));
        fields.insert("support".to_string(), FieldValue::Number(id as f64 + 10.0));
        DisplayItem::new(id, label, fields)
    }

    fn items() -> Vec<DisplayItem> {
        vec![
            item(0, "at least 2", "Medium"),
            item(1, "at most 1", "Bad"),
            item(2, "at least 3", "Good"),
        ]
    }

    #[test]
    fn test_empty_query_keeps_everything() {
        let items = items();
        assert_eq!(filter_items("", &items), items);
    }

    #[test]
    fn test_case_insensitive_label_match() {
        let filtered = filter_items("LEAST", &items());
        let ids: Vec<_> = filtered.iter().map(DisplayItem::id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_matches_field_values() {
        let filtered = filter_items("goo", &items());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id(), 2);

        let filtered = filter_items("11", &items());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id(), 1);
    }

    #[test]
    fn test_result_is_subset_containing_query() {
        let items = items();
        for query in ["a", "at m", "x", "1", "MED", " "] {
            let filtered = filter_items(query, &items);
            for found in &filtered {
                assert!(items.contains(found));
                assert!(
                    found
                        .tokens()
                        .iter()
                        .any(|t| t.contains(&query.to_lowercase()))
                );
            }
        }
    }
}
