use std::path::Path;

use anyhow::{Context, Result};

use crate::models::Project;

/// Read a locally tracked project
pub fn load_project(path: &Path) -> Result<Project> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project file: {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse project file: {:?}", path))
}

/// Write a project as pretty JSON, replacing any previous file
pub fn save_project(project: &Project, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, project).context("Failed to write project JSON")?;
    Ok(())
}
