use chrono::{DateTime, Utc};

use crate::listing::sortable_fields;
use crate::models::{DisplayItem, Project, StageKind, NOT_APPLICABLE};
use crate::stages::MisclassificationSummary;
use crate::sync::StageController;

/// Plain-text view of one stage
pub struct StageListing<'a> {
    controller: &'a StageController,
    project: &'a Project,
}

impl<'a> StageListing<'a> {
    pub fn new(controller: &'a StageController, project: &'a Project) -> Self {
        Self {
            controller,
            project,
        }
    }

    pub fn format(&self) -> String {
        let stage = self.controller.stage();
        let mut output = String::new();

        let currency = if self.project.stage(stage).is_current {
            "current"
        } else {
            "outdated"
        };
        output.push_str(&format!("{} ({})\n", stage, currency));
        for (name, value) in self.controller.parameters() {
            output.push_str(&format!("  {} = {}\n", name, value));
        }
        if !self.controller.parameters_saved() {
            output.push_str("  (parameters not yet computed)\n");
        }
        if let Some(at) = self.controller.computed_at() {
            output.push_str(&format!("  computed {}\n", format_timestamp(at)));
        }
        if let Some(alert) = self.controller.alert() {
            let title = alert.title.as_deref().unwrap_or("");
            output.push_str(&format!(
                "  [{}] {} {}\n",
                alert.severity, title, alert.message
            ));
        }
        output.push('\n');

        let items = self.controller.displayed();
        let Some(result) = self.controller.last_result() else {
            output.push_str("No result\n");
            return output;
        };

        let view = self.controller.view();
        output.push_str(&format!(
            "{} of {} items, sorted by {} {}{}\n",
            items.len(),
            self.controller.items().len(),
            view.sort_field,
            view.order,
            if view.query.is_empty() {
                String::new()
            } else {
                format!(", matching \"{}\"", view.query)
            }
        ));
        output.push_str(&format_table(items));

        if stage == StageKind::Classification {
            if let Some(summary) = MisclassificationSummary::from_result(result) {
                output.push('\n');
                output.push_str(&format_matrix_summary(&summary));
            }
        }
        output
    }
}

fn format_matrix_summary(summary: &MisclassificationSummary) -> String {
    let mut output = match summary.accuracy {
        Some(accuracy) => format!("Misclassification matrix: accuracy {:.3}\n", accuracy),
        None => "Misclassification matrix\n".to_string(),
    };
    for counts in &summary.decisions {
        output.push_str(&format!(
            "  {}: {} of {} correct\n",
            counts.decision, counts.correct, counts.objects
        ));
    }
    for (name, value) in summary.statistics.iter().filter(|(n, _)| *n != "Accuracy") {
        output.push_str(&format!("  {} = {:.3}\n", name, value));
    }
    output
}

/// "current" or "outdated", plus unsaved marker
pub fn status_line(project: &Project, stage: StageKind) -> String {
    let record = project.stage(stage);
    let mut line = if record.is_current {
        "current".to_string()
    } else {
        "outdated".to_string()
    };
    if !record.parameters_saved {
        line.push_str(", unsaved changes");
    }
    line
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Aligned columns: id, label, then every field
fn format_table(items: &[DisplayItem]) -> String {
    let fields: Vec<String> = sortable_fields(items)
        .into_iter()
        .filter(|f| f != "id")
        .collect();

    let mut rows = vec![{
        let mut header = vec!["id".to_string(), "label".to_string()];
        header.extend(fields.iter().cloned());
        header
    }];
    for item in items {
        let mut row = vec![item.id().to_string(), item.label().to_string()];
        row.extend(fields.iter().map(|f| {
            item.field(f)
                .map(|v| v.to_string())
                .unwrap_or_else(|| NOT_APPLICABLE.to_string())
        }));
        rows.push(row);
    }

    let widths: Vec<usize> = (0..rows[0].len())
        .map(|col| rows.iter().map(|r| r[col].chars().count()).max().unwrap_or(0))
        .collect();

    let mut output = String::new();
    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ");
        output.push_str(line.trim_end());
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::models::{DatasetRef, FieldValue};
    use uuid::Uuid;

    #[test]
    fn test_table_aligns_and_marks_missing_fields() {
        let mut first = BTreeMap::new();
        first.insert("quality".to_string(), FieldValue::Number(0.5));
        let mut second = BTreeMap::new();
        second.insert("accuracy".to_string(), FieldValue::Number(1.0));

        let table = format_table(&[
            DisplayItem::new(0, "at least 2", first),
            DisplayItem::new(1, "at most 1", second),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "id  label       quality  accuracy");
        assert_eq!(lines[1], "0   at least 2  0.5      -");
        assert_eq!(lines[2], "1   at most 1   -        1");
    }

    #[test]
    fn test_status_line() {
        let mut project = Project::new(
            Uuid::new_v4(),
            "demo",
            DatasetRef {
                file_name: "d.json".to_string(),
            },
        );
        assert_eq!(status_line(&project, StageKind::Rules), "current");

        let record = project.stage_mut(StageKind::Rules);
        record.is_current = false;
        record.parameters_saved = false;
        assert_eq!(
            status_line(&project, StageKind::Rules),
            "outdated, unsaved changes"
        );
    }

    #[test]
    fn test_listing_without_result() {
        let project = Project::new(
            Uuid::new_v4(),
            "demo",
            DatasetRef {
                file_name: "d.json".to_string(),
            },
        );
        let controller = StageController::new(StageKind::Unions);
        let text = StageListing::new(&controller, &project).format();
        assert!(text.starts_with("Unions (current)"));
        assert!(text.ends_with("No result\n"));
    }

    #[test]
    fn test_matrix_summary_lines() {
        let result = serde_json::json!({
            "decisionsDomain": ["bad", "good"],
            "ordinalMisclassificationMatrix": {"value": [[3, 1], [0, 4]], "MAE": 0.125}
        });
        let summary = MisclassificationSummary::from_result(&result).unwrap();
        assert_eq!(
            format_matrix_summary(&summary),
            "Misclassification matrix: accuracy 0.875\n  bad: 3 of 4 correct\n  good: 4 of 4 correct\n  MAE = 0.125\n"
        );
    }
}
