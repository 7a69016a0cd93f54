use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::info;

/// Open `project` with `command` (program followed by its arguments); the
/// project path is appended as the last argument.
pub fn open_project(command: &[String], project: &Path) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("editor command is empty"))?;
    if !project.is_dir() {
        return Err(anyhow!("project directory not found: {}", project.display()));
    }
    let status = Command::new(program)
        .args(args)
        .arg(project)
        .status()
        .with_context(|| format!("spawn editor {program}"))?;
    if !status.success() {
        return Err(anyhow!("editor {program} exited with {status}"));
    }
    info!(project = %project.display(), "opened project");
    Ok(())
}
