use std::fs;

use serde::{Deserialize, Serialize};

use crate::db::{StagingLayout, ToolConfig};
use crate::model::OutputSet;
use crate::services::error::PipelineResult;
use crate::services::process::CommandSpec;
use crate::services::runner::{FailurePolicy, OutputSource, StageInvocation};
use crate::services::stages::names::{BOOGIE, COUNTEREXAMPLE_MODEL, VERIFIER_OUTPUT};
use crate::services::stages::require;

pub const STAGE: &str = "verify";

/// `boogie <default args> /mv:<out.model> <out.bpl> <extra args>`.
///
/// Boogie writes the counterexample model only when it finds a violation, so
/// that file doubles as the structured status signal.
pub fn invocation(
    config: &ToolConfig,
    layout: &StagingLayout,
    inputs: &OutputSet,
    extra_args: &[String],
) -> PipelineResult<StageInvocation> {
    let boogie = require(inputs, BOOGIE, STAGE)?;

    let (program, prefix) = config.verifier.render(&layout.root);
    let command = CommandSpec::new(program)
        .args(prefix)
        .args(config.verifier_default_args.iter().cloned())
        .arg(format!("/mv:{}", layout.model_path.display()))
        .arg(boogie.display().to_string())
        .args(extra_args.iter().cloned());

    Ok(StageInvocation::new(STAGE, command, FailurePolicy::TolerateExit)
        .output(
            VERIFIER_OUTPUT,
            &layout.verifier_output_path,
            OutputSource::Stdout { prefix: None },
        )
        .output(COUNTEREXAMPLE_MODEL, &layout.model_path, OutputSource::OptionalFile)
        .primary(VERIFIER_OUTPUT))
}

/// Verdict of one verifier run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum VerificationOutcome {
    Verified,
    CounterexampleFound,
    Error(String),
}

/// Raw signals a verifier run leaves behind.
#[derive(Debug, Clone, Copy)]
pub struct VerifierSignal<'a> {
    /// `None` when unknown, e.g. for a cached run.
    pub exit_code: Option<i32>,
    pub text: &'a str,
    /// The counterexample model file exists and is non-empty.
    pub model_written: bool,
    pub failure_marker: &'a str,
}

impl VerificationOutcome {
    /// The only place verifier text is interpreted.
    ///
    /// Precedence: the model status file, then Boogie's summary line, then the
    /// exit code, then the configured failure marker as a last resort.
    pub fn classify(signal: &VerifierSignal<'_>) -> Self {
        if signal.model_written {
            return VerificationOutcome::CounterexampleFound;
        }
        if let Some(summary) = BoogieSummary::parse(signal.text) {
            return if summary.errors > 0 {
                VerificationOutcome::CounterexampleFound
            } else if let Some(reason) = summary.unfinished() {
                VerificationOutcome::Error(reason)
            } else {
                VerificationOutcome::Verified
            };
        }
        if let Some(code) = signal.exit_code.filter(|c| *c != 0) {
            return VerificationOutcome::Error(format!("verifier exited with {code}"));
        }
        if !signal.failure_marker.is_empty() && signal.text.contains(signal.failure_marker) {
            return VerificationOutcome::CounterexampleFound;
        }
        VerificationOutcome::Error("verifier produced no summary".to_string())
    }

    /// Re-derive the verdict of a verify stage from its recorded outputs.
    pub fn from_outputs(
        outputs: &OutputSet,
        exit_code: Option<i32>,
        failure_marker: &str,
    ) -> PipelineResult<Self> {
        let text = match outputs.get(VERIFIER_OUTPUT) {
            Some(path) => String::from_utf8_lossy(&fs::read(path)?).into_owned(),
            None => String::new(),
        };
        let model_written = match outputs.get(COUNTEREXAMPLE_MODEL) {
            Some(path) => fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false),
            None => false,
        };
        Ok(Self::classify(&VerifierSignal {
            exit_code,
            text: &text,
            model_written,
            failure_marker,
        }))
    }
}

/// `Boogie program verifier finished with N verified, M errors[, K time outs, ...]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoogieSummary {
    pub verified: u32,
    pub errors: u32,
    pub time_outs: u32,
    pub out_of_resource: u32,
    pub inconclusive: u32,
    pub solver_exceptions: u32,
}

impl BoogieSummary {
    pub fn parse(text: &str) -> Option<Self> {
        let line = text.lines().rev().find(|l| l.contains("verifier finished with"))?;
        let (_, counts) = line.split_once("finished with")?;

        let mut summary = Self::default();
        let mut verified = None;
        let mut errors = None;
        for part in counts.split(',') {
            let Some((count, label)) = part.trim().split_once(char::is_whitespace) else {
                continue;
            };
            let Ok(count) = count.parse::<u32>() else {
                continue;
            };
            match label.trim().trim_end_matches('.') {
                "verified" => verified = Some(count),
                "error" | "errors" => errors = Some(count),
                "time out" | "time outs" => summary.time_outs = count,
                "out of resource" => summary.out_of_resource = count,
                "inconclusive" => summary.inconclusive = count,
                "solver exception" | "solver exceptions" => summary.solver_exceptions = count,
                _ => {}
            }
        }
        summary.verified = verified?;
        summary.errors = errors?;
        Some(summary)
    }

    /// Describes the procedures Boogie gave up on, if any.
    pub fn unfinished(&self) -> Option<String> {
        let parts: Vec<String> = [
            (self.time_outs, "timed out"),
            (self.out_of_resource, "ran out of resource"),
            (self.inconclusive, "inconclusive"),
            (self.solver_exceptions, "solver exception"),
        ]
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, what)| format!("{count} {what}"))
        .collect();
        if parts.is_empty() {
            None
        } else {
            Some(format!("verification incomplete: {}", parts.join(", ")))
        }
    }
}
