use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use basil_core::db::{resolve_tool_config, MismatchPolicy};
use basil_tool::commands::{clean_command, run_tool_command, RunArgs};
use clap::Parser;
use tracing::debug;

/// Runs BASIL and its associated tools with per-compilation memoization.
///
/// This CLI is a thin wrapper around `basil-core` (exposed in code as
/// `basil_core`). The binary is read from SOURCEFILE or stdin, staged into a
/// directory derived from `--directory`, and pushed through the pipeline
/// prefix selected by `--tool`. The chosen output is printed to stdout.
#[derive(Parser, Debug)]
#[command(
    name = "basil-tool",
    version,
    about = "Runs Basil and associated tools",
    long_about = None
)]
struct Cli {
    /// Binary to analyze. Reads stdin when omitted or `-`.
    sourcefile: Option<String>,

    /// Identifies the compilation; also where `stdout` and relative specs live.
    #[arg(short, long)]
    directory: Option<String>,

    /// Pipeline to run: readelf, bap, basil, boogie, boogie-source, boogie-counterexample.
    #[arg(short, long, default_value = "basil")]
    tool: String,

    /// Which output to send to stdout.
    #[arg(short, long, default_value = "default")]
    output: String,

    /// Whitespace-separated extra arguments for the verifier.
    #[arg(short, long, allow_hyphen_values = true)]
    args: Option<String>,

    /// Specification file for the translator, relative to `--directory`.
    #[arg(short, long)]
    spec: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Tool configuration file (YAML, or JSON by extension).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// What to do when the staged binary differs: abort, warn, overwrite.
    #[arg(long)]
    on_mismatch: Option<MismatchPolicy>,

    /// Per-stage timeout in milliseconds; 0 disables it.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Copy `--directory` into the staging area before running.
    #[arg(long, default_value_t = false)]
    import: bool,

    /// Remove the staging area for `--directory` and exit.
    #[arg(long, default_value_t = false)]
    clean: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.log_file.as_deref())?;
    debug!(?cli, "Parsed arguments");

    let mut config = resolve_tool_config(cli.config.as_deref())?;
    if let Some(policy) = cli.on_mismatch {
        config.on_mismatch = policy;
    }
    if let Some(ms) = cli.timeout_ms {
        config.stage_timeout_ms = ms;
    }

    if cli.clean {
        let directory = cli.directory.as_deref().context("--clean requires --directory")?;
        return clean_command(&config, directory);
    }

    let args = RunArgs {
        sourcefile: cli.sourcefile,
        directory: cli.directory,
        tool: cli.tool,
        output: cli.output,
        args: cli.args,
        spec: cli.spec,
        import: cli.import,
    };
    run_tool_command(&config, &args)
}

fn setup_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let formatter = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            tracing_subscriber::registry().with(formatter).with(filter).init();
        }
        None => {
            let formatter = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(formatter).with(filter).init();
        }
    }

    Ok(())
}
