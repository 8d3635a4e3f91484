//! Pipeline services: staging, process execution, memoized stage runs, and
//! the composer that wires the fixed stage graph together.

pub mod error;
pub mod import;
pub mod lock;
pub mod pipeline;
pub mod process;
pub mod runner;
pub mod select;
pub mod stages;
pub mod staging;

pub use error::{PipelineError, PipelineResult};
pub use import::import_directory;
pub use lock::StagingLock;
pub use pipeline::{Pipeline, PipelineRequest, PipelineRun, Tool};
pub use process::{
    CancelToken, CommandExecutor, CommandSpec, ExecError, ProcessOutput, RunOptions, SystemExecutor,
};
pub use runner::{
    DeclaredOutput, FailurePolicy, OutputSource, StageInvocation, StageReport, StageRunner,
};
pub use select::select;
pub use stages::verifier::VerificationOutcome;
pub use staging::{remove_staging_area, sha256_hex, stage_binary, StagedBinary, StagingOutcome};
