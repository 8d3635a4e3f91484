use serde::{Deserialize, Serialize};

/// One row of the cache lookup table: a single named output of a completed job.
///
/// Several entries share a job key, one per output name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub job_key: String,
    pub output_name: String,
    pub path: String,
}

/// How a stage invocation was satisfied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobRunStatus {
    /// The external tool was spawned and its outputs recorded.
    Executed,
    /// Served from the cache index without spawning a process.
    Cached,
    /// The tool failed, timed out, or did not produce its declared outputs.
    Failed,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Executed => "executed",
            JobRunStatus::Cached => "cached",
            JobRunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "executed" => Ok(JobRunStatus::Executed),
            "cached" => Ok(JobRunStatus::Cached),
            "failed" => Ok(JobRunStatus::Failed),
            other => Err(format!("unknown job run status '{other}'")),
        }
    }
}

/// Audit-log record of a single stage invocation.
///
/// Kept in its own append-only table; the lookup table is never consulted
/// through it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRunRecord {
    pub job_key: String,
    pub stage: String,
    pub status: JobRunStatus,
    pub exit_code: Option<i32>,
    pub started_at: String,
    pub finished_at: String,
}
