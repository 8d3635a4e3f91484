//! Staging-area persistence: on-disk layout, tool configuration, and the
//! SQLite cache index.
//!
//! - `StagingLayout`: computed paths inside one staging directory.
//! - `ToolConfig`: external tool locations, resolved once at startup.
//! - `CacheIndex`: job key -> named outputs, plus an append-only job audit log.
//! - `StagingContext`: layout and open cache index bundled together.

mod cache_db;
mod config;
mod context;
mod layout;
mod models;
mod util;

pub use cache_db::{CacheIndex, CacheLookup, DbError, DbResult, CURRENT_SCHEMA_VERSION};
pub use config::{MismatchPolicy, ToolCommand, ToolConfig, STAGING_PLACEHOLDER};
pub use context::StagingContext;
pub use layout::StagingLayout;
pub use models::{CacheEntry, JobRunRecord, JobRunStatus};
pub use util::{load_tool_config, resolve_tool_config, CONFIG_ENV};
