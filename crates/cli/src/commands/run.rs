use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use basil_core::db::{StagingContext, StagingLayout, ToolConfig};
use basil_core::services::{
    import_directory, select, stage_binary, CancelToken, Pipeline, PipelineRequest, RunOptions,
    StageRunner, StagingLock, SystemExecutor, Tool,
};
use tracing::{debug, info};

use crate::{canonicalize_or_current, read_input};

/// Arguments for one pipeline run, as parsed from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    /// Binary to analyze; `None` or `-` reads stdin.
    pub sourcefile: Option<String>,
    /// Compilation directory; seeds the staging area and receives `stdout`.
    pub directory: Option<String>,
    pub tool: String,
    pub output: String,
    /// Whitespace-separated extra verifier arguments.
    pub args: Option<String>,
    pub spec: Option<String>,
    /// Copy the compilation directory into the staging area first.
    pub import: bool,
}

/// Stage the binary, run the selected pipeline prefix, and emit one output.
pub fn run_tool_command(config: &ToolConfig, args: &RunArgs) -> Result<()> {
    // Reject bad names before touching the staging area.
    let tool: Tool = args.tool.parse()?;
    tool.check_output_name(&args.output)?;

    let compilation_dir = args.directory.as_deref().map(canonicalize_or_current).transpose()?;
    if args.import && compilation_dir.is_none() {
        bail!("--import requires --directory");
    }

    let content = read_input(args.sourcefile.as_deref())?;

    // Without a compilation directory nothing is worth keeping between runs.
    let (layout, _scratch) = match &compilation_dir {
        Some(dir) => {
            (StagingLayout::for_seed(&config.staging_root, &dir.to_string_lossy()), None)
        }
        None => {
            let scratch = tempfile::Builder::new()
                .prefix("basil-tool-")
                .tempdir()
                .context("Failed to create temporary staging directory")?;
            (StagingLayout::new(scratch.path()), Some(scratch))
        }
    };
    info!(staging = %layout.root.display(), "Using staging area");

    let ctx = StagingContext::open(layout)?;
    let _lock = StagingLock::acquire(&ctx.layout.lock_path)?;
    let staged = stage_binary(&ctx.layout, &content, config.on_mismatch, Some(&ctx.cache))?;
    debug!(hash = %staged.hash, outcome = ?staged.outcome, "Staged binary");

    let spec_base = match &compilation_dir {
        Some(dir) if args.import => {
            import_directory(&ctx.cache, dir, &ctx.layout.source_dir)?;
            ctx.layout.source_dir.clone()
        }
        Some(dir) => dir.clone(),
        None => canonicalize_or_current(".")?,
    };
    let request = PipelineRequest {
        spec: args.spec.as_deref().map(|s| resolve_spec(&spec_base, s)),
        verifier_args: args
            .args
            .as_deref()
            .map(|a| a.split_whitespace().map(String::from).collect())
            .unwrap_or_default(),
    };

    let executor = SystemExecutor;
    let options = RunOptions { timeout: config.stage_timeout(), cancel: CancelToken::new() };
    let runner = StageRunner::new(&ctx.cache, &executor, options);
    let pipeline = Pipeline::new(config, &ctx.layout, runner);
    let run = pipeline.run(tool, &request)?;
    info!(
        executed = run.executed,
        cached = run.cached,
        verdict = ?run.verification,
        "Run complete"
    );

    let content = select(&run.outputs, &args.output)?;
    print!("{content}");

    if let Some(dir) = &compilation_dir {
        write_stdout_file(dir, &content)?;
    }
    Ok(())
}

fn resolve_spec(base: &Path, spec: &str) -> PathBuf {
    // Absolute specs are taken as-is by `join`.
    base.join(spec)
}

fn write_stdout_file(dir: &Path, content: &str) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    let path = dir.join("stdout");
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_spec_resolves_against_base() {
        let base = Path::new("/work/prog");
        assert_eq!(resolve_spec(base, "main.spec"), PathBuf::from("/work/prog/main.spec"));
        assert_eq!(resolve_spec(base, "/abs/main.spec"), PathBuf::from("/abs/main.spec"));
    }
}
