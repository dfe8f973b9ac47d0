pub mod client;
pub mod error;
pub mod io;
pub mod listing;
pub mod models;
pub mod stages;
pub mod sync;

pub use client::{ComputeService, ExportFormat, HttpComputeService, ServiceConfig};
pub use error::StageError;
pub use io::{load_project, save_project, write_export, write_matrix, StageListing};
pub use listing::{filter_items, sort_items};
pub use models::{
    Alert, ComputeOutcome, ConsistencyHints, DatasetRef, DisplayItem, FieldValue, ParamValue,
    Parameters, Project, Severity, SortOrder, StageKind, StageRecord, ViewSettings,
};
pub use stages::{definition, MisclassificationSummary, StageDefinition};
pub use sync::{
    Completion, ComputeRequest, ComputeTicket, ProjectSynchronizer, RawInput, StageController,
    StageEvent, Workbench,
};
