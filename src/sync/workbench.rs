use tracing::{info, warn};

use super::controller::{Completion, ComputeRequest, ComputeTicket, RawInput, StageController};
use super::synchronizer::ProjectSynchronizer;
use crate::client::{ComputeService, ExportFormat};
use crate::error::StageError;
use crate::models::{ComputeOutcome, ParamValue, Project, SortOrder, StageKind};

/// Drives stage controllers against a compute service.
///
/// Owns one controller per stage and the synchronizer holding the project.
/// Every method takes `&mut self`, so calls for one workbench never overlap.
pub struct Workbench<S: ComputeService> {
    service: S,
    sync: ProjectSynchronizer,
    controllers: [StageController; 3],
}

impl<S: ComputeService> Workbench<S> {
    pub fn new(service: S, project: Project) -> Self {
        Self {
            service,
            sync: ProjectSynchronizer::new(project),
            controllers: StageKind::ALL.map(StageController::new),
        }
    }

    pub fn project(&self) -> &Project {
        self.sync.project()
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn controller(&self, stage: StageKind) -> &StageController {
        &self.controllers[stage.position()]
    }

    pub fn active(&self) -> Option<StageKind> {
        self.sync.active()
    }

    pub fn active_controller(&self) -> Option<&StageController> {
        self.active().map(|stage| self.controller(stage))
    }

    pub fn outdated(&self) -> Vec<StageKind> {
        self.sync.outdated()
    }

    fn active_mut(&mut self) -> Result<&mut StageController, StageError> {
        let stage = self.sync.active().ok_or(StageError::NoActiveStage)?;
        Ok(&mut self.controllers[stage.position()])
    }

    /// Open a stage, leaving the current one, and load its stored result.
    ///
    /// Opening the stage that is already open reloads it.
    pub async fn open(&mut self, stage: StageKind) -> Completion {
        let ticket = match self.sync.active() {
            Some(current) if current != stage => {
                let (from, to) = pair(&mut self.controllers, current, stage);
                self.sync.switch_stage(Some(from), to)
            }
            Some(_) => {
                let controller = &mut self.controllers[stage.position()];
                self.sync.leave(controller);
                self.sync.switch_stage(None, controller)
            }
            None => self
                .sync
                .switch_stage(None, &mut self.controllers[stage.position()]),
        };
        self.drive(ticket).await
    }

    /// Leave the open stage, committing its state to the project
    pub fn close(&mut self) {
        if let Some(stage) = self.sync.active() {
            self.sync.leave(&mut self.controllers[stage.position()]);
        }
    }

    pub fn edit(&mut self, name: &str, value: ParamValue) -> Result<(), StageError> {
        self.active_mut()?.edit_parameter(name, value)
    }

    /// Recompute the open stage, optionally against new input
    pub async fn recompute(&mut self, input: Option<RawInput>) -> Result<Completion, StageError> {
        let ticket = self.active_mut()?.recompute(input)?;
        Ok(self.drive(ticket).await)
    }

    pub fn filter(&mut self, query: &str) -> Result<(), StageError> {
        self.active_mut()?.filter_items(query);
        Ok(())
    }

    pub fn sort(&mut self, field: &str, order: SortOrder) -> Result<(), StageError> {
        self.active_mut()?.sort_items(field, order);
        Ok(())
    }

    /// Download a stage's result. Does not touch any controller.
    pub async fn export(
        &self,
        stage: StageKind,
        format: ExportFormat,
    ) -> Result<Vec<u8>, StageError> {
        info!("Exporting {} as {}", stage, format);
        self.service
            .export(self.project().id, stage, format)
            .await
    }

    /// Download the classification's misclassification matrix
    pub async fn download_matrix(&self) -> Result<Vec<u8>, StageError> {
        info!("Downloading misclassification matrix");
        self.service.download_matrix(self.project().id).await
    }

    /// Close the open stage and hand back the project
    pub fn into_project(mut self) -> Project {
        self.close();
        self.sync.into_project()
    }

    /// Perform the call a ticket grants and report the response.
    ///
    /// If this future is dropped mid-call, the controller's busy flag is released.
    async fn drive(&mut self, ticket: ComputeTicket) -> Completion {
        let controller = &mut self.controllers[ticket.stage.position()];
        let pending = PendingCall::new(controller, ticket);

        let response = dispatch(&self.service, &pending.ticket).await;
        let completion = pending.complete(response);

        if let Completion::Applied(event) = &completion {
            for change in self.sync.handle(event) {
                info!(
                    "{} is now {}",
                    change.stage,
                    if change.is_current { "current" } else { "outdated" }
                );
            }
        }
        completion
    }
}

/// Map a ticket's request onto the service call it stands for
pub async fn dispatch<S: ComputeService + ?Sized>(
    service: &S,
    ticket: &ComputeTicket,
) -> Result<Option<ComputeOutcome>, StageError> {
    let (project_id, stage) = (ticket.project_id, ticket.stage);
    match &ticket.request {
        ComputeRequest::Fetch => service.fetch(project_id, stage).await,
        ComputeRequest::Recompute { parameters } => service
            .recompute(project_id, stage, parameters)
            .await
            .map(Some),
        ComputeRequest::Upload { parameters, input } => service
            .upload(project_id, stage, parameters, input)
            .await
            .map(Some),
    }
}

/// Aborts its ticket unless completed
struct PendingCall<'a> {
    controller: &'a mut StageController,
    ticket: ComputeTicket,
    armed: bool,
}

impl<'a> PendingCall<'a> {
    fn new(controller: &'a mut StageController, ticket: ComputeTicket) -> Self {
        Self {
            controller,
            ticket,
            armed: true,
        }
    }

    fn complete(
        mut self,
        response: Result<Option<ComputeOutcome>, StageError>,
    ) -> Completion {
        self.armed = false;
        self.controller.complete(&self.ticket, response)
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("{} call dropped before completing", self.ticket.stage);
            self.controller.abort(&self.ticket);
        }
    }
}

/// Two distinct controllers borrowed at once
fn pair(
    controllers: &mut [StageController; 3],
    a: StageKind,
    b: StageKind,
) -> (&mut StageController, &mut StageController) {
    let (i, j) = (a.position(), b.position());
    if i < j {
        let (low, high) = controllers.split_at_mut(j);
        (&mut low[i], &mut high[0])
    } else {
        let (low, high) = controllers.split_at_mut(i);
        (&mut high[0], &mut low[j])
    }
}
