use anyhow::{Context, Result};

use crate::db::{CacheIndex, StagingLayout};

/// Convenience wrapper bundling a staging layout and its open cache index.
#[derive(Debug)]
pub struct StagingContext {
    pub layout: StagingLayout,
    pub cache: CacheIndex,
}

impl StagingContext {
    /// Create the staging directory if needed and open its cache index.
    pub fn open(layout: StagingLayout) -> Result<Self> {
        std::fs::create_dir_all(&layout.root).with_context(|| {
            format!("Failed to create staging directory {}", layout.root.display())
        })?;
        let cache = CacheIndex::open(&layout.cache_db_path).with_context(|| {
            format!("Failed to open cache index at {}", layout.cache_db_path.display())
        })?;
        Ok(Self { layout, cache })
    }
}
