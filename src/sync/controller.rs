use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StageError;
use crate::listing::{filter_items, sort_items};
use crate::models::{
    Alert, ComputeOutcome, ConsistencyHints, DisplayItem, ParamValue, Parameters, Project,
    Severity, SortOrder, StageKind, StageRecord, ViewSettings,
};
use crate::stages::{definition, StageDefinition};

/// New raw input sent along with a recompute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    /// Multipart field name ("data" for objects, "rules" for a rule set)
    pub part: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

/// The compute-service call a controller wants performed
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeRequest {
    /// GET the stored result
    Fetch,
    /// PUT: recompute from the existing dataset
    Recompute { parameters: Parameters },
    /// POST: recompute against uploaded input
    Upload {
        parameters: Parameters,
        input: RawInput,
    },
}

/// Permission for exactly one outstanding call of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeTicket {
    pub project_id: Uuid,
    pub stage: StageKind,
    pub generation: u64,
    pub request: ComputeRequest,
}

/// Lifecycle events a controller reports to the project synchronizer
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Refreshed {
        stage: StageKind,
        hints: ConsistencyHints,
    },
    Computed {
        stage: StageKind,
        hints: ConsistencyHints,
    },
    Failed {
        stage: StageKind,
        error: StageError,
    },
}

/// What happened to a finished call
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Applied(StageEvent),
    /// The ticket was no longer current: the stage was left or the ticket belongs elsewhere
    Discarded,
}

/// Working state of one mounted stage view.
///
/// The controller never performs I/O. `activate` and `recompute` hand out a
/// [`ComputeTicket`]; whoever performs the call reports back through
/// [`StageController::complete`] or [`StageController::abort`]. At most one
/// ticket is outstanding at a time.
#[derive(Debug)]
pub struct StageController {
    stage: StageKind,
    project_id: Option<Uuid>,
    parameters: Parameters,
    parameters_saved: bool,
    is_current: bool,
    last_result: Option<Value>,
    computed_at: Option<DateTime<Utc>>,
    items: Vec<DisplayItem>,
    displayed: Vec<DisplayItem>,
    view: ViewSettings,
    alert: Option<Alert>,
    in_flight: Option<u64>,
    next_generation: u64,
}

impl StageController {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            project_id: None,
            parameters: definition(stage).default_parameters(),
            parameters_saved: true,
            is_current: true,
            last_result: None,
            computed_at: None,
            items: Vec::new(),
            displayed: Vec::new(),
            view: ViewSettings::default(),
            alert: None,
            in_flight: None,
            next_generation: 0,
        }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    fn definition(&self) -> &'static dyn StageDefinition {
        definition(self.stage)
    }

    pub fn is_active(&self) -> bool {
        self.project_id.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_saved(&self) -> bool {
        self.parameters_saved
    }

    pub fn last_result(&self) -> Option<&Value> {
        self.last_result.as_ref()
    }

    pub fn computed_at(&self) -> Option<DateTime<Utc>> {
        self.computed_at
    }

    /// All items of the current result
    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }

    /// Items after the view's filter and sort
    pub fn displayed(&self) -> &[DisplayItem] {
        &self.displayed
    }

    pub fn view(&self) -> &ViewSettings {
        &self.view
    }

    pub fn alert(&self) -> Option<&Alert> {
        self.alert.as_ref()
    }

    fn issue(&mut self, project_id: Uuid, request: ComputeRequest) -> ComputeTicket {
        self.next_generation += 1;
        self.in_flight = Some(self.next_generation);
        ComputeTicket {
            project_id,
            stage: self.stage,
            generation: self.next_generation,
            request,
        }
    }

    /// Load this stage's record from `project` and request the server's stored copy.
    ///
    /// Activating again supersedes any outstanding ticket.
    pub fn activate(&mut self, project: &Project) -> ComputeTicket {
        let record = project.stage(self.stage).clone();

        self.project_id = Some(project.id);
        self.parameters = record.parameters;
        self.parameters_saved = record.parameters_saved;
        self.is_current = record.is_current;
        self.computed_at = record.computed_at;
        self.view = record.view;
        self.set_result(record.last_result);

        info!("{}: activated for project {}", self.stage, project.id);
        self.issue(project.id, ComputeRequest::Fetch)
    }

    /// Edit one compute parameter locally. Rejected while a call is outstanding.
    pub fn edit_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), StageError> {
        if self.is_loading() {
            return Err(StageError::Busy { stage: self.stage });
        }

        let value = self.definition().validate(name, value)?;
        if self.parameters.get(name) == Some(&value) {
            return Ok(());
        }
        if let Some(reason) = self.definition().locked(&self.parameters, name) {
            return Err(StageError::validation(name, reason));
        }

        debug!("{}: {} = {}", self.stage, name, value);
        self.parameters.insert(name.to_string(), value);
        self.definition().normalize(&mut self.parameters, name);
        self.parameters_saved = false;
        Ok(())
    }

    /// Request a recompute with the current parameters, optionally against new input
    pub fn recompute(&mut self, input: Option<RawInput>) -> Result<ComputeTicket, StageError> {
        if self.is_loading() {
            return Err(StageError::Busy { stage: self.stage });
        }
        let project_id = self
            .project_id
            .ok_or(StageError::Inactive { stage: self.stage })?;

        let parameters = self.parameters.clone();
        let request = match input {
            Some(input) => ComputeRequest::Upload { parameters, input },
            None => ComputeRequest::Recompute { parameters },
        };

        Ok(self.issue(project_id, request))
    }

    fn owns(&self, ticket: &ComputeTicket) -> bool {
        ticket.stage == self.stage && self.in_flight == Some(ticket.generation)
    }

    /// Apply the response of a ticketed call.
    ///
    /// `Ok(None)` means the stage was never computed on the server.
    pub fn complete(
        &mut self,
        ticket: &ComputeTicket,
        response: Result<Option<ComputeOutcome>, StageError>,
    ) -> Completion {
        if !self.owns(ticket) {
            warn!(
                "{}: discarding completion of {} ticket {}",
                self.stage, ticket.stage, ticket.generation
            );
            return Completion::Discarded;
        }
        self.in_flight = None;

        let fetch = matches!(ticket.request, ComputeRequest::Fetch);
        let response = match response {
            Ok(None) if !fetch => Err(StageError::NetworkFailure(
                "empty response to recompute".to_string(),
            )),
            other => other,
        };

        match response {
            Ok(Some(outcome)) => {
                let ComputeOutcome { result, hints } = outcome;
                let echoed = self.definition().result_parameters(&result);

                if !fetch || self.parameters_saved {
                    self.parameters.extend(echoed);
                }
                if !fetch {
                    self.parameters_saved = true;
                    self.computed_at = Some(Utc::now());
                }

                self.alert = hints.error_message.clone().map(|message| Alert {
                    severity: Severity::Error,
                    title: None,
                    message,
                });
                self.set_result(Some(result));

                info!("{}: {} items", self.stage, self.items.len());
                let stage = self.stage;
                Completion::Applied(if fetch {
                    StageEvent::Refreshed { stage, hints }
                } else {
                    StageEvent::Computed { stage, hints }
                })
            }
            Ok(None) => {
                debug!("{}: never computed", self.stage);
                self.alert = None;
                self.set_result(None);
                Completion::Applied(StageEvent::Refreshed {
                    stage: self.stage,
                    hints: ConsistencyHints::default(),
                })
            }
            Err(error) => {
                warn!("{}: {}", self.stage, error);
                self.alert = Some(error.to_alert(self.stage));
                self.set_result(None);
                Completion::Applied(StageEvent::Failed {
                    stage: self.stage,
                    error,
                })
            }
        }
    }

    /// Release the busy flag for a call that will never complete
    pub fn abort(&mut self, ticket: &ComputeTicket) {
        if self.owns(ticket) {
            warn!("{}: call {} aborted", self.stage, ticket.generation);
            self.in_flight = None;
        }
    }

    /// Package local state for the project. Never performs I/O; idempotent.
    ///
    /// An outstanding call is abandoned: its completion will be discarded.
    pub fn deactivate(&mut self) -> StageRecord {
        if let Some(generation) = self.in_flight.take() {
            warn!(
                "{}: leaving with call {} outstanding; its result will be discarded",
                self.stage, generation
            );
        }
        if self.project_id.take().is_some() {
            debug!("{}: deactivated", self.stage);
        }

        StageRecord {
            parameters: self.parameters.clone(),
            last_result: self.last_result.clone(),
            parameters_saved: self.parameters_saved,
            is_current: self.is_current,
            computed_at: self.computed_at,
            view: self.view.clone(),
        }
    }

    /// Narrow the displayed items; never touches the result
    pub fn filter_items(&mut self, query: &str) {
        self.view.query = query.to_string();
        self.refresh_display();
    }

    /// Reorder the displayed items; never touches the result
    pub fn sort_items(&mut self, field: &str, order: SortOrder) {
        self.view.sort_field = field.to_string();
        self.view.order = order;
        self.refresh_display();
    }

    fn set_result(&mut self, result: Option<Value>) {
        self.items = result
            .as_ref()
            .map(|r| self.definition().project(r))
            .unwrap_or_default();
        self.last_result = result;
        self.refresh_display();
    }

    fn refresh_display(&mut self) {
        let filtered = filter_items(&self.view.query, &self.items);
        self.displayed = sort_items(&filtered, &self.view.sort_field, self.view.order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatasetRef;
    use crate::stages::{CONSISTENCY_THRESHOLD, TYPE_OF_RULES};
    use serde_json::json;

    fn project() -> Project {
        Project::new(
            Uuid::new_v4(),
            "demo",
            DatasetRef {
                file_name: "data.json".to_string(),
            },
        )
    }

    fn unions_result(threshold: f64) -> Value {
        json!({
            "downwardUnions": [
                {"unionType": "AT_MOST", "limitingDecision": 1,
                 "accuracyOfApproximation": 0.5, "qualityOfApproximation": 0.5}
            ],
            "upwardUnions": [
                {"unionType": "AT_LEAST", "limitingDecision": 2,
                 "accuracyOfApproximation": 0.9, "qualityOfApproximation": 0.8}
            ],
            "consistencyThreshold": threshold,
            "typeOfUnions": "monotonic"
        })
    }

    fn threshold(controller: &StageController) -> Option<&ParamValue> {
        controller.parameters().get(CONSISTENCY_THRESHOLD)
    }

    fn activated(project: &Project) -> StageController {
        let mut controller = StageController::new(StageKind::Unions);
        let ticket = controller.activate(project);
        controller.complete(&ticket, Ok(None));
        controller
    }

    #[test]
    fn test_activate_is_loading_until_complete() {
        let project = project();
        let mut controller = StageController::new(StageKind::Unions);
        let ticket = controller.activate(&project);

        assert_eq!(ticket.request, ComputeRequest::Fetch);
        assert!(controller.is_loading());
        assert!(matches!(
            controller.edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Number(0.3)),
            Err(StageError::Busy { .. })
        ));

        let outcome = ComputeOutcome::from_envelope(unions_result(0.0));
        let completion = controller.complete(&ticket, Ok(Some(outcome)));
        assert!(matches!(completion, Completion::Applied(StageEvent::Refreshed { .. })));
        assert!(!controller.is_loading());
        assert_eq!(controller.items().len(), 2);
    }

    #[test]
    fn test_edit_marks_unsaved() {
        let project = project();
        let mut controller = activated(&project);

        controller
            .edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Number(0.3))
            .unwrap();
        assert!(!controller.parameters_saved());
        assert_eq!(threshold(&controller), Some(&ParamValue::Number(0.3)));
    }

    #[test]
    fn test_edit_to_same_value_keeps_saved() {
        let project = project();
        let mut controller = activated(&project);

        controller
            .edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Text("0".to_string()))
            .unwrap();
        assert!(controller.parameters_saved());
    }

    #[test]
    fn test_invalid_edit_leaves_state() {
        let project = project();
        let mut controller = activated(&project);

        let err = controller
            .edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Number(2.0))
            .unwrap_err();
        assert!(matches!(err, StageError::ValidationFailure { .. }));
        assert!(controller.parameters_saved());
    }

    #[test]
    fn test_threshold_edit_rejected_for_possible_rules() {
        let project = project();
        let mut controller = StageController::new(StageKind::Rules);
        let ticket = controller.activate(&project);
        controller.complete(&ticket, Ok(None));

        controller
            .edit_parameter(TYPE_OF_RULES, ParamValue::Text("possible".to_string()))
            .unwrap();
        let before = controller.parameters().clone();

        let err = controller
            .edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Number(0.4))
            .unwrap_err();
        assert!(matches!(err, StageError::ValidationFailure { .. }));
        assert_eq!(controller.parameters(), &before);
        assert_eq!(threshold(&controller), Some(&ParamValue::Number(0.0)));

        controller
            .edit_parameter(TYPE_OF_RULES, ParamValue::Text("certain".to_string()))
            .unwrap();
        controller
            .edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Number(0.4))
            .unwrap();
        assert_eq!(threshold(&controller), Some(&ParamValue::Number(0.4)));
    }

    #[test]
    fn test_second_recompute_rejected_while_loading() {
        let project = project();
        let mut controller = activated(&project);

        let first = controller.recompute(None).unwrap();
        assert!(matches!(
            controller.recompute(None),
            Err(StageError::Busy { .. })
        ));

        let outcome = ComputeOutcome::from_envelope(unions_result(0.0));
        controller.complete(&first, Ok(Some(outcome)));
        assert!(controller.recompute(None).is_ok());
    }

    #[test]
    fn test_recompute_requires_activation() {
        let mut controller = StageController::new(StageKind::Rules);
        assert!(matches!(
            controller.recompute(None),
            Err(StageError::Inactive { .. })
        ));
    }

    #[test]
    fn test_recompute_success_saves_parameters() {
        let project = project();
        let mut controller = activated(&project);
        controller
            .edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Number(0.3))
            .unwrap();

        let ticket = controller.recompute(None).unwrap();
        match &ticket.request {
            ComputeRequest::Recompute { parameters } => {
                assert_eq!(
                    parameters.get(CONSISTENCY_THRESHOLD),
                    Some(&ParamValue::Number(0.3))
                );
            }
            other => panic!("unexpected request {:?}", other),
        }

        let outcome = ComputeOutcome::from_envelope(unions_result(0.3));
        let completion = controller.complete(&ticket, Ok(Some(outcome)));
        assert!(matches!(completion, Completion::Applied(StageEvent::Computed { .. })));
        assert!(controller.parameters_saved());
        assert!(controller.computed_at().is_some());
        assert!(controller.alert().is_none());
    }

    #[test]
    fn test_upload_uses_upload_request() {
        let project = project();
        let mut controller = activated(&project);
        let input = RawInput {
            part: "data".to_string(),
            file_name: "objects.json".to_string(),
            content: b"[]".to_vec(),
        };

        let ticket = controller.recompute(Some(input.clone())).unwrap();
        assert!(matches!(ticket.request, ComputeRequest::Upload { input: ref i, .. } if *i == input));
    }

    #[test]
    fn test_failure_clears_result_and_keeps_edits() {
        let project = project();
        let mut controller = activated(&project);
        let ticket = controller.recompute(None).unwrap();
        controller.complete(
            &ticket,
            Ok(Some(ComputeOutcome::from_envelope(unions_result(0.0)))),
        );
        controller
            .edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Number(0.3))
            .unwrap();

        let ticket = controller.recompute(None).unwrap();
        let completion = controller.complete(
            &ticket,
            Err(StageError::ServerRejected {
                status: 500,
                message: "boom".to_string(),
            }),
        );

        assert!(matches!(completion, Completion::Applied(StageEvent::Failed { .. })));
        assert!(controller.last_result().is_none());
        assert!(controller.displayed().is_empty());
        assert!(!controller.parameters_saved());
        assert_eq!(controller.alert().map(|a| a.severity), Some(Severity::Error));
    }

    #[test]
    fn test_alert_replaced_not_stacked() {
        let project = project();
        let mut controller = activated(&project);

        let ticket = controller.recompute(None).unwrap();
        controller.complete(&ticket, Err(StageError::NetworkFailure("down".to_string())));
        let ticket = controller.recompute(None).unwrap();
        controller.complete(
            &ticket,
            Err(StageError::ServerRejected {
                status: 503,
                message: "busy".to_string(),
            }),
        );
        assert_eq!(controller.alert().map(|a| a.message.as_str()), Some("busy"));

        let ticket = controller.recompute(None).unwrap();
        controller.complete(
            &ticket,
            Ok(Some(ComputeOutcome::from_envelope(unions_result(0.0)))),
        );
        assert!(controller.alert().is_none());
    }

    #[test]
    fn test_error_message_hint_alerts_but_shows_result() {
        let project = project();
        let mut controller = activated(&project);
        let mut envelope = unions_result(0.0);
        envelope["errorMessage"] = json!("partially computed");

        let ticket = controller.recompute(None).unwrap();
        controller.complete(&ticket, Ok(Some(ComputeOutcome::from_envelope(envelope))));
        assert_eq!(controller.items().len(), 2);
        let alert = controller.alert().unwrap();
        assert_eq!(alert.severity, Severity::Error);
        assert_eq!(alert.message, "partially computed");
    }

    #[test]
    fn test_error_message_on_fetch_is_an_error() {
        let project = project();
        let mut controller = StageController::new(StageKind::Rules);
        let ticket = controller.activate(&project);
        let envelope = json!({"ruleSet": [], "errorMessage": "Induction failed"});

        controller.complete(&ticket, Ok(Some(ComputeOutcome::from_envelope(envelope))));
        assert!(controller.last_result().is_some());
        assert_eq!(
            controller.alert().map(|a| a.severity),
            Some(Severity::Error)
        );
    }

    #[test]
    fn test_fetch_keeps_unsaved_edits() {
        let mut project = project();
        let record = project.stage_mut(StageKind::Unions);
        record
            .parameters
            .insert(CONSISTENCY_THRESHOLD.to_string(), ParamValue::Number(0.3));
        record.parameters_saved = false;

        let mut controller = StageController::new(StageKind::Unions);
        let ticket = controller.activate(&project);
        controller.complete(
            &ticket,
            Ok(Some(ComputeOutcome::from_envelope(unions_result(0.0)))),
        );

        assert_eq!(threshold(&controller), Some(&ParamValue::Number(0.3)));
        assert!(!controller.parameters_saved());
    }

    #[test]
    fn test_fetch_adopts_server_parameters_when_saved() {
        let project = project();
        let mut controller = StageController::new(StageKind::Unions);
        let ticket = controller.activate(&project);
        controller.complete(
            &ticket,
            Ok(Some(ComputeOutcome::from_envelope(unions_result(0.25)))),
        );
        assert_eq!(threshold(&controller), Some(&ParamValue::Number(0.25)));
        assert!(controller.parameters_saved());
    }

    #[test]
    fn test_not_found_is_silent() {
        let project = project();
        let controller = activated(&project);
        assert!(controller.alert().is_none());
        assert!(controller.last_result().is_none());
        assert!(!controller.is_loading());
    }

    #[test]
    fn test_deactivate_discards_late_completion() {
        let project = project();
        let mut controller = activated(&project);
        let ticket = controller.recompute(None).unwrap();

        let record = controller.deactivate();
        assert!(!controller.is_loading());
        assert!(record.last_result.is_none());

        let late = ComputeOutcome::from_envelope(unions_result(0.0));
        assert_eq!(controller.complete(&ticket, Ok(Some(late))), Completion::Discarded);
        assert!(controller.last_result().is_none());
    }

    #[test]
    fn test_ticket_for_other_stage_discarded() {
        let project = project();
        let mut unions = activated(&project);
        let mut rules = StageController::new(StageKind::Rules);
        let rules_ticket = rules.activate(&project);
        let unions_ticket = unions.recompute(None).unwrap();

        let outcome = ComputeOutcome::from_envelope(unions_result(0.0));
        assert_eq!(
            rules.complete(&unions_ticket, Ok(Some(outcome))),
            Completion::Discarded
        );
        assert!(rules.is_loading());
        assert_eq!(rules_ticket.stage, StageKind::Rules);
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let project = project();
        let mut controller = activated(&project);
        controller
            .edit_parameter(CONSISTENCY_THRESHOLD, ParamValue::Number(0.3))
            .unwrap();
        controller.sort_items("quality", SortOrder::Desc);

        let first = controller.deactivate();
        let second = controller.deactivate();
        assert_eq!(first, second);
        assert!(!first.parameters_saved);
        assert_eq!(first.view.sort_field, "quality");
    }

    #[test]
    fn test_abort_releases_busy_flag() {
        let project = project();
        let mut controller = activated(&project);
        let ticket = controller.recompute(None).unwrap();

        controller.abort(&ticket);
        assert!(!controller.is_loading());
        assert!(controller.recompute(None).is_ok());
    }

    #[test]
    fn test_filter_and_sort_do_not_touch_result() {
        let project = project();
        let mut controller = StageController::new(StageKind::Unions);
        let ticket = controller.activate(&project);
        controller.complete(
            &ticket,
            Ok(Some(ComputeOutcome::from_envelope(unions_result(0.0)))),
        );
        let result = controller.last_result().cloned();

        controller.sort_items("quality", SortOrder::Desc);
        let ids: Vec<_> = controller.displayed().iter().map(DisplayItem::id).collect();
        assert_eq!(ids, vec![1, 0]);

        controller.filter_items("most");
        assert_eq!(controller.displayed().len(), 1);
        assert_eq!(controller.displayed()[0].id(), 0);

        controller.filter_items("");
        assert_eq!(controller.displayed().len(), 2);
        assert_eq!(controller.last_result().cloned(), result);
        assert!(controller.parameters_saved());
    }
}
