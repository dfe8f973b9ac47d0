use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::client::ExportFormat;
use crate::models::{Project, StageKind};

fn file_stem(project: &Project) -> String {
    project
        .name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Default download name, e.g. `credit-rules.xml`
pub fn export_file_name(project: &Project, stage: StageKind, format: ExportFormat) -> String {
    format!(
        "{}-{}.{}",
        file_stem(project),
        stage.path_segment(),
        format.extension()
    )
}

pub fn matrix_file_name(project: &Project) -> String {
    format!("{}-misclassification-matrix.txt", file_stem(project))
}

/// Write downloaded bytes. A directory target gets the default file name.
pub fn write_export(
    target: &Path,
    project: &Project,
    stage: StageKind,
    format: ExportFormat,
    bytes: &[u8],
) -> Result<PathBuf> {
    write_download(target, &export_file_name(project, stage, format), bytes)
}

/// Write a downloaded misclassification matrix
pub fn write_matrix(target: &Path, project: &Project, bytes: &[u8]) -> Result<PathBuf> {
    write_download(target, &matrix_file_name(project), bytes)
}

fn write_download(target: &Path, default_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = if target.is_dir() {
        target.join(default_name)
    } else {
        target.to_path_buf()
    };
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write export: {:?}", path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatasetRef;
    use uuid::Uuid;

    fn project() -> Project {
        Project::new(
            Uuid::new_v4(),
            "credit risk",
            DatasetRef {
                file_name: "credit.json".to_string(),
            },
        )
    }

    #[test]
    fn test_directory_target_uses_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_export(
            dir.path(),
            &project(),
            StageKind::Rules,
            ExportFormat::Xml,
            b"<rules/>",
        )
        .unwrap();

        assert_eq!(path.file_name().unwrap(), "credit_risk-rules.xml");
        assert_eq!(std::fs::read(&path).unwrap(), b"<rules/>");
    }

    #[test]
    fn test_file_target_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let path = write_export(&target, &project(), StageKind::Rules, ExportFormat::Txt, b"r1")
            .unwrap();
        assert_eq!(path, target);
    }

    #[test]
    fn test_matrix_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_matrix(dir.path(), &project(), b"1 0\n0 1\n").unwrap();
        assert_eq!(
            path.file_name().unwrap(),
            "credit_risk-misclassification-matrix.txt"
        );
    }
}
