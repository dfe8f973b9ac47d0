use tracing::{info, warn};

use super::controller::{ComputeTicket, StageController, StageEvent};
use super::staleness::{diff, propagate, FlagChange, Trigger};
use crate::models::{ConsistencyHints, Project, StageKind, StageRecord};

/// Single writer of the canonical project.
///
/// Controllers only see copies: they are loaded on activation and their
/// record is merged back on deactivation.
#[derive(Debug)]
pub struct ProjectSynchronizer {
    project: Project,
    active: Option<StageKind>,
}

impl ProjectSynchronizer {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            active: None,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn into_project(self) -> Project {
        self.project
    }

    /// Stage whose view is currently mounted
    pub fn active(&self) -> Option<StageKind> {
        self.active
    }

    /// Merge a record returned by a controller into the project
    pub fn commit(&mut self, stage: StageKind, record: StageRecord) {
        self.project.merge_stage(stage, record);
    }

    /// Deactivate `from`, commit its record, then activate `to`.
    ///
    /// The order matters: activating first would read a project without
    /// `from`'s unsaved edits.
    pub fn switch_stage(
        &mut self,
        from: Option<&mut StageController>,
        to: &mut StageController,
    ) -> ComputeTicket {
        if let Some(from) = from {
            self.leave(from);
        }

        info!("Switching to {}", to.stage());
        self.active = Some(to.stage());
        to.activate(&self.project)
    }

    /// Deactivate a stage and commit its record
    pub fn leave(&mut self, from: &mut StageController) {
        let stage = from.stage();
        let record = from.deactivate();
        self.commit(stage, record);
        if self.active == Some(stage) {
            self.active = None;
        }
    }

    /// Update `is_current` flags after `stage` produced an outcome
    pub fn apply_outcome(
        &mut self,
        stage: StageKind,
        trigger: Trigger,
        hints: &ConsistencyHints,
    ) -> Vec<FlagChange> {
        let before = self.project.current_flags();
        let after = propagate(before, stage, trigger, hints);

        for kind in StageKind::ALL {
            self.project.stage_mut(kind).is_current = after[kind.position()];
        }

        if let Some(external) = hints.external_rules {
            self.project.external_rules = external;
        }
        let external_data = hints
            .external_data
            .or_else(|| hints.classification.as_ref().and_then(|c| c.external_data));
        if let Some(external) = external_data {
            self.project.external_data = external;
        }

        diff(before, after)
    }

    /// React to a controller's lifecycle event
    pub fn handle(&mut self, event: &StageEvent) -> Vec<FlagChange> {
        match event {
            StageEvent::Refreshed { stage, hints } => {
                self.apply_outcome(*stage, Trigger::Refreshed, hints)
            }
            StageEvent::Computed { stage, hints } => {
                self.apply_outcome(*stage, Trigger::Recomputed, hints)
            }
            StageEvent::Failed { stage, error } => {
                warn!("{} failed: {}", stage, error);
                Vec::new()
            }
        }
    }

    /// Stages currently flagged as outdated
    pub fn outdated(&self) -> Vec<StageKind> {
        self.project
            .stages()
            .filter(|(_, record)| !record.is_current)
            .map(|(kind, _)| kind)
            .collect()
    }
}
