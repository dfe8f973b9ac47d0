use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StageError;
use crate::models::{ComputeOutcome, Parameters, StageKind};
use crate::sync::RawInput;

/// File format of a downloaded stage result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xml,
    Txt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xml => "xml",
            ExportFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(ExportFormat::Xml),
            "txt" => Ok(ExportFormat::Txt),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Remote compute service owning the authoritative results.
///
/// Every operation addresses one stage of one project.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Stored result of a stage; `Ok(None)` when the stage was never computed
    async fn fetch(
        &self,
        project_id: Uuid,
        stage: StageKind,
    ) -> Result<Option<ComputeOutcome>, StageError>;

    /// Recompute a stage from the project's current data
    async fn recompute(
        &self,
        project_id: Uuid,
        stage: StageKind,
        parameters: &Parameters,
    ) -> Result<ComputeOutcome, StageError>;

    /// Recompute a stage against newly supplied input
    async fn upload(
        &self,
        project_id: Uuid,
        stage: StageKind,
        parameters: &Parameters,
        input: &RawInput,
    ) -> Result<ComputeOutcome, StageError>;

    /// Download a stage's result as a file
    async fn export(
        &self,
        project_id: Uuid,
        stage: StageKind,
        format: ExportFormat,
    ) -> Result<Vec<u8>, StageError>;

    /// Download the misclassification matrix of the stored classification
    async fn download_matrix(&self, project_id: Uuid) -> Result<Vec<u8>, StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format_parse() {
        assert_eq!("XML".parse::<ExportFormat>(), Ok(ExportFormat::Xml));
        assert_eq!("txt".parse::<ExportFormat>(), Ok(ExportFormat::Txt));
        assert!("pdf".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Xml.to_string(), "xml");
    }
}
