//! YAML persistence for the scheduled-harvest job list.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::schedule::ScheduledHarvest;

/// Load jobs from a YAML file.
///
/// A missing file is an empty job list, so a fresh daemon starts clean.
pub fn load_jobs(path: &Path) -> Result<Vec<ScheduledHarvest>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let yaml = fs::read_to_string(path)?;
    let jobs = serde_yaml_ng::from_str(&yaml)?;
    Ok(jobs)
}

/// Save jobs to a YAML file, creating parent directories as needed.
pub fn save_jobs(path: &Path, jobs: &[ScheduledHarvest]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml_ng::to_string(jobs)?;
    fs::write(path, yaml)?;
    tracing::debug!(path = %path.display(), jobs = jobs.len(), "Saved job list");
    Ok(())
}
