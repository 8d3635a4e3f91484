use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the staging directory in tool arguments.
pub const STAGING_PLACEHOLDER: &str = "{staging}";

/// An external program plus a fixed argument prefix.
///
/// The prefix allows wrapping a tool, e.g. running the lifter inside a
/// container with the staging directory mounted:
/// `program = "podman"`, `args = ["run", "-v", "{staging}:{staging}", ..., "bap"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Expand `{staging}` in the program and prefix arguments.
    pub fn render(&self, staging: &Path) -> (String, Vec<String>) {
        let staging = staging.display().to_string();
        let program = self.program.replace(STAGING_PLACEHOLDER, &staging);
        let args = self.args.iter().map(|a| a.replace(STAGING_PLACEHOLDER, &staging)).collect();
        (program, args)
    }
}

/// What to do when a staging area already holds a different binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Fail with `IntegrityMismatch`.
    #[default]
    Abort,
    /// Log and keep the previously staged binary.
    Warn,
    /// Replace the binary and clear the cache index.
    Overwrite,
}

impl std::str::FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(MismatchPolicy::Abort),
            "warn" => Ok(MismatchPolicy::Warn),
            "overwrite" => Ok(MismatchPolicy::Overwrite),
            other => {
                Err(format!("Invalid mismatch policy '{other}'. Allowed: abort, warn, overwrite"))
            }
        }
    }
}

/// Tool locations and pipeline knobs, resolved once before any stage runs.
///
/// Loaded from defaults, then an optional JSON/YAML file, then environment
/// overrides (see `util::resolve_tool_config`). Never mutated after the
/// pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Parent directory for seeded staging areas.
    pub staging_root: PathBuf,
    pub readelf: ToolCommand,
    pub lifter: ToolCommand,
    /// Usually `java -jar <basil.jar>`.
    pub translator: ToolCommand,
    pub verifier: ToolCommand,
    pub model_printer: ToolCommand,
    /// Always passed to the verifier before the per-run extra arguments.
    pub verifier_default_args: Vec<String>,
    /// Per-stage wall clock limit; `0` disables the limit.
    ///
    /// Callers that wrap the whole run in their own deadline (300 s for a
    /// Compiler Explorer compile) kill the process outright, leaving no
    /// verdict. The default stays below that so a hung stage fails here with
    /// `StageTimeout` first.
    pub stage_timeout_ms: u64,
    /// Verifier output substring signalling a counterexample, used only when
    /// the structured signals are inconclusive.
    pub failure_marker: String,
    pub on_mismatch: MismatchPolicy,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir().join("basil-tool"),
            readelf: ToolCommand::new("/usr/bin/readelf"),
            lifter: ToolCommand::new("bap"),
            translator: ToolCommand::new("java").with_args(["-jar", "basil.jar"]),
            verifier: ToolCommand::new("boogie"),
            model_printer: ToolCommand::new("boogie-model-printer"),
            verifier_default_args: vec!["/timeLimit:300".to_string()],
            stage_timeout_ms: 240_000,
            failure_marker: "might not hold".to_string(),
            on_mismatch: MismatchPolicy::Abort,
        }
    }
}

impl ToolConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        if self.stage_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.stage_timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_expands_staging_placeholder() {
        let cmd = ToolCommand::new("podman").with_args(["run", "-v", "{staging}:{staging}", "bap"]);
        let (program, args) = cmd.render(Path::new("/tmp/stage"));
        assert_eq!(program, "podman");
        assert_eq!(args, vec!["run", "-v", "/tmp/stage:/tmp/stage", "bap"]);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: ToolConfig =
            serde_json::from_str(r#"{"stage_timeout_ms": 10, "on_mismatch": "warn"}"#).unwrap();
        assert_eq!(cfg.stage_timeout(), Some(Duration::from_millis(10)));
        assert_eq!(cfg.on_mismatch, MismatchPolicy::Warn);
        assert_eq!(cfg.verifier_default_args, vec!["/timeLimit:300"]);
    }

    #[test]
    fn default_stage_timeout_fits_inside_a_compile_deadline() {
        let limit = ToolConfig::default().stage_timeout().unwrap();
        assert!(limit < Duration::from_secs(300));
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let cfg = ToolConfig { stage_timeout_ms: 0, ..ToolConfig::default() };
        assert_eq!(cfg.stage_timeout(), None);
    }
}
