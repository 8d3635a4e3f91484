use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache index error: {0}")]
    Db(#[from] DbError),

    /// The staging area already holds a different binary.
    #[error(
        "Staged binary hash mismatch: staging area holds {expected}, new binary is {found} (binary from a different compilation?)"
    )]
    IntegrityMismatch { expected: String, found: String },

    #[error("Stage '{stage}' failed: {reason}")]
    StageExecutionFailure { stage: String, reason: String },

    #[error("Stage '{stage}' did not produce output '{name}' at {}", path.display())]
    MissingOutput { stage: String, name: String, path: PathBuf },

    #[error("Stage '{stage}' timed out after {timeout:?}")]
    StageTimeout { stage: String, timeout: Duration },

    #[error("Stage '{stage}' was cancelled")]
    StageCancelled { stage: String },

    #[error("Unknown tool '{name}'. Allowed tools: [{}]", available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Output '{name}' unavailable, allowed are: {}", available.join(", "))]
    UnknownOutputName { name: String, available: Vec<String> },

    #[error("Cache entries for job '{job_key}' are inconsistent: {reason}")]
    CacheCorruption { job_key: String, reason: String },

    #[error("Staging area is locked by another run ({}); remove the lock file if that run is gone", path.display())]
    StagingLocked { path: PathBuf },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
