use crate::db::{StagingLayout, ToolConfig};
use crate::services::process::CommandSpec;
use crate::services::runner::{FailurePolicy, OutputSource, StageInvocation};
use crate::services::stages::names::RELF;

pub const STAGE: &str = "symbols";

/// `readelf -s -r -W <binary>`; the listing is the captured stdout.
pub fn invocation(config: &ToolConfig, layout: &StagingLayout) -> StageInvocation {
    let (program, prefix) = config.readelf.render(&layout.root);
    let command = CommandSpec::new(program)
        .args(prefix)
        .args(["-s", "-r", "-W"])
        .arg(layout.binary_path.display().to_string());

    StageInvocation::new(STAGE, command, FailurePolicy::Fatal)
        .output(RELF, &layout.relf_path, OutputSource::Stdout { prefix: None })
        .primary(RELF)
}
