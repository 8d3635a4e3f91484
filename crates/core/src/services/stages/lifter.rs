use crate::db::{StagingLayout, ToolConfig};
use crate::services::process::CommandSpec;
use crate::services::runner::{FailurePolicy, OutputSource, StageInvocation};
use crate::services::stages::names::{ADT, BIR};

pub const STAGE: &str = "lift";

/// `bap <binary> -d adt:<out.adt> -d bir:<out.bir>`, run from the staging directory.
pub fn invocation(config: &ToolConfig, layout: &StagingLayout) -> StageInvocation {
    let (program, prefix) = config.lifter.render(&layout.root);
    let command = CommandSpec::new(program)
        .args(prefix)
        .arg(layout.binary_path.display().to_string())
        .args(["-d".to_string(), format!("adt:{}", layout.adt_path.display())])
        .args(["-d".to_string(), format!("bir:{}", layout.bir_path.display())])
        .current_dir(&layout.root);

    StageInvocation::new(STAGE, command, FailurePolicy::Fatal)
        .output(ADT, &layout.adt_path, OutputSource::File)
        .output(BIR, &layout.bir_path, OutputSource::File)
        .primary(BIR)
}
