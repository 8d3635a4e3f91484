//! Command-line construction for each external tool in the pipeline.
//!
//! Every builder returns a `StageInvocation` naming its outputs; inputs from
//! upstream stages are looked up by symbolic name only.

pub mod lifter;
pub mod model_printer;
pub mod symbols;
pub mod translator;
pub mod verifier;

use std::path::Path;

use crate::model::OutputSet;
use crate::services::error::{PipelineError, PipelineResult};

/// Output names produced by the stages.
pub mod names {
    pub const ADT: &str = "adt";
    pub const BIR: &str = "bir";
    pub const RELF: &str = "relf";
    pub const BOOGIE: &str = "boogie";
    pub const BASIL_IR: &str = "basil_ir";
    pub const VERIFIER_OUTPUT: &str = "verifier_output";
    pub const COUNTEREXAMPLE_MODEL: &str = "counterexample_model";
    pub const COUNTEREXAMPLE: &str = "counterexample";
}

/// Resolve an upstream output a stage depends on.
pub(crate) fn require<'a>(
    inputs: &'a OutputSet,
    name: &str,
    stage: &str,
) -> PipelineResult<&'a Path> {
    inputs.get(name).ok_or_else(|| PipelineError::StageExecutionFailure {
        stage: stage.to_string(),
        reason: format!("missing input '{}' (have: {})", name, inputs.names().join(", ")),
    })
}
