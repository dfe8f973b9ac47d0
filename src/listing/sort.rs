use std::cmp::Ordering;

use crate::models::{DisplayItem, SortOrder};

/// Comparable form of a field value
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
    NotApplicable,
}

impl SortKey {
    fn of(item: &DisplayItem, field: &str) -> Self {
        match item.field(field) {
            None => SortKey::NotApplicable,
            Some(value) if value.is_not_applicable() => SortKey::NotApplicable,
            Some(value) => match value.as_number() {
                Some(n) if n.is_finite() => SortKey::Number(n),
                _ => SortKey::Text(value.to_string().to_lowercase()),
            },
        }
    }
}

/// Order two keys. "-" sorts after every real value in both directions and
/// two "-" values are equal; numbers come before non-numeric text.
fn compare_keys(a: &SortKey, b: &SortKey, order: SortOrder) -> Ordering {
    let ordering = match (a, b) {
        (SortKey::NotApplicable, SortKey::NotApplicable) => return Ordering::Equal,
        (SortKey::NotApplicable, _) => return Ordering::Greater,
        (_, SortKey::NotApplicable) => return Ordering::Less,
        (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
        (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
        (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
    };

    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Stable sort of items by a named field; "id" is the original insertion order
pub fn sort_items(items: &[DisplayItem], field: &str, order: SortOrder) -> Vec<DisplayItem> {
    let mut keyed: Vec<(SortKey, &DisplayItem)> = items
        .iter()
        .map(|item| (SortKey::of(item, field), item))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, order));

    keyed.into_iter().map(|(_, item)| item.clone()).collect()
}

/// Field names that can be sorted on for a list of items
pub fn sortable_fields(items: &[DisplayItem]) -> Vec<String> {
    let mut fields = vec!["id".to_string()];
    for item in items {
        for name in item.fields().keys() {
            if !fields.contains(name) {
                fields.push(name.clone());
            }
        }
    }
    fields
}
