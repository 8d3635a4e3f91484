use std::path::Path;

use crate::db::{StagingLayout, ToolConfig};
use crate::model::OutputSet;
use crate::services::error::PipelineResult;
use crate::services::process::CommandSpec;
use crate::services::runner::{FailurePolicy, OutputSource, StageInvocation};
use crate::services::stages::names::{ADT, BASIL_IR, BOOGIE, RELF};
use crate::services::stages::require;

pub const STAGE: &str = "translate";

/// `java -jar basil.jar --input <adt> --relf <relf> --output <out.bpl> --dump-il <out.il> [--spec <spec>]`.
///
/// The translator is known to exit non-zero after writing usable output, so
/// only a missing program file fails the stage.
pub fn invocation(
    config: &ToolConfig,
    layout: &StagingLayout,
    inputs: &OutputSet,
    spec: Option<&Path>,
) -> PipelineResult<StageInvocation> {
    let adt = require(inputs, ADT, STAGE)?;
    let relf = require(inputs, RELF, STAGE)?;

    let (program, prefix) = config.translator.render(&layout.root);
    let mut command = CommandSpec::new(program)
        .args(prefix)
        .args(["--input".to_string(), adt.display().to_string()])
        .args(["--relf".to_string(), relf.display().to_string()])
        .args(["--output".to_string(), layout.boogie_path.display().to_string()])
        .args(["--dump-il".to_string(), layout.il_path.display().to_string()]);
    if let Some(spec) = spec {
        command = command.args(["--spec".to_string(), spec.display().to_string()]);
    }

    Ok(StageInvocation::new(STAGE, command, FailurePolicy::TolerateExit)
        .output(BOOGIE, &layout.boogie_path, OutputSource::File)
        .output(BASIL_IR, &layout.il_path, OutputSource::OptionalFile)
        .primary(BOOGIE))
}
