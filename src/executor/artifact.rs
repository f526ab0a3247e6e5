use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

/// Creates the output directory if needed; concurrent creation is not an error
pub(super) fn ensure_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))
}

/// Artifact file name: `{unix_seconds}-{pid}-{uuid}.out`
fn artifact_name() -> String {
    format!(
        "{}-{}-{}.out",
        Utc::now().timestamp(),
        std::process::id(),
        Uuid::new_v4().simple()
    )
}

/// Creates a fresh artifact file for the child's stdout
///
/// The file is opened with `create_new`, so an existing path is never reused
/// even if two runners sharing the directory collide on a name.
pub(super) fn create_artifact(dir: &Path) -> Result<(PathBuf, File)> {
    let path = dir.join(artifact_name());
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    Ok((path, file))
}
