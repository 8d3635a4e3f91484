use crate::db::{StagingLayout, ToolConfig};
use crate::model::OutputSet;
use crate::services::error::PipelineResult;
use crate::services::process::CommandSpec;
use crate::services::runner::{FailurePolicy, OutputSource, StageInvocation};
use crate::services::stages::names::{COUNTEREXAMPLE, COUNTEREXAMPLE_MODEL, VERIFIER_OUTPUT};
use crate::services::stages::require;

pub const STAGE: &str = "model-print";

/// `<printer> <out.model>`; the result is the verifier output followed by the
/// printer's stdout.
pub fn invocation(
    config: &ToolConfig,
    layout: &StagingLayout,
    inputs: &OutputSet,
) -> PipelineResult<StageInvocation> {
    let model = require(inputs, COUNTEREXAMPLE_MODEL, STAGE)?;
    let verifier_output = require(inputs, VERIFIER_OUTPUT, STAGE)?;

    let (program, prefix) = config.model_printer.render(&layout.root);
    let command = CommandSpec::new(program).args(prefix).arg(model.display().to_string());

    Ok(StageInvocation::new(STAGE, command, FailurePolicy::Fatal)
        .output(
            COUNTEREXAMPLE,
            &layout.counterexample_path,
            OutputSource::Stdout { prefix: Some(verifier_output.to_path_buf()) },
        )
        .primary(COUNTEREXAMPLE))
}
