use anyhow::{Context, Result};
use basil_core::db::{StagingLayout, ToolConfig};
use basil_core::services::remove_staging_area;

use crate::canonicalize_or_current;

/// Remove the staging area associated with a compilation directory.
pub fn clean_command(config: &ToolConfig, directory: &str) -> Result<()> {
    let seed = canonicalize_or_current(directory)?;
    let layout = StagingLayout::for_seed(&config.staging_root, &seed.to_string_lossy());
    let removed = remove_staging_area(&layout)
        .with_context(|| format!("Failed to remove staging area {}", layout.root.display()))?;
    if removed {
        println!("Removed staging area {}", layout.root.display());
    } else {
        println!("No staging area at {}", layout.root.display());
    }
    Ok(())
}
