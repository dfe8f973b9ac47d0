use thiserror::Error;

use crate::models::{Alert, Severity, StageKind};

/// Failures of stage operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// The request never reached the server or the response could not be parsed
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The server answered with a non-2xx status
    #[error("Server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// A local parameter edit was rejected before any network call
    #[error("Invalid value for {parameter}: {reason}")]
    ValidationFailure { parameter: String, reason: String },

    #[error("Unknown parameter for {stage}: {parameter}")]
    UnknownParameter { stage: StageKind, parameter: String },

    /// Another call for this stage is still outstanding
    #[error("{stage} is busy with another request")]
    Busy { stage: StageKind },

    #[error("{stage} is not active")]
    Inactive { stage: StageKind },

    #[error("No stage is open")]
    NoActiveStage,
}

impl StageError {
    pub fn validation(parameter: &str, reason: impl Into<String>) -> Self {
        StageError::ValidationFailure {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    /// Stage-level alert for a failed compute-service call
    pub fn to_alert(&self, stage: StageKind) -> Alert {
        match self {
            StageError::NetworkFailure(message) => Alert {
                severity: Severity::Error,
                title: Some(format!("Server error! Couldn't load {}", stage)),
                message: message.clone(),
            },
            StageError::ServerRejected { status, message } => Alert {
                severity: Severity::Error,
                title: Some(format!("ERROR {}", status)),
                message: message.clone(),
            },
            other => Alert {
                severity: Severity::Warning,
                title: None,
                message: other.to_string(),
            },
        }
    }
}
