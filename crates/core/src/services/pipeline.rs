use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, info_span, warn};

use crate::db::{StagingLayout, ToolConfig};
use crate::model::{OutputSet, DEFAULT_OUTPUT};
use crate::services::error::{PipelineError, PipelineResult};
use crate::services::runner::{StageInvocation, StageReport, StageRunner};
use crate::services::stages::names::{
    ADT, BASIL_IR, BIR, BOOGIE, COUNTEREXAMPLE, COUNTEREXAMPLE_MODEL, RELF, VERIFIER_OUTPUT,
};
use crate::services::stages::verifier::VerificationOutcome;
use crate::services::stages::{lifter, model_printer, symbols, translator, verifier};

/// Pipeline prefix selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Symbol/relocation listing only.
    Readelf,
    /// Lifter only.
    Bap,
    /// Lift + symbols + translate to Boogie.
    Basil,
    /// Through verification; `default` is the verifier output.
    Boogie,
    /// Through verification; `default` is the Boogie program that was checked.
    BoogieSource,
    /// Through verification, plus the pretty-printed counterexample if any.
    BoogieCounterexample,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Readelf,
        Tool::Bap,
        Tool::Basil,
        Tool::Boogie,
        Tool::BoogieSource,
        Tool::BoogieCounterexample,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Readelf => "readelf",
            Tool::Bap => "bap",
            Tool::Basil => "basil",
            Tool::Boogie => "boogie",
            Tool::BoogieSource => "boogie-source",
            Tool::BoogieCounterexample => "boogie-counterexample",
        }
    }

    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }

    fn verifies(&self) -> bool {
        matches!(self, Tool::Boogie | Tool::BoogieSource | Tool::BoogieCounterexample)
    }

    /// Every output name this tool can produce, sorted. Conditional outputs
    /// (the counterexample ones) are included.
    pub fn output_names(&self) -> Vec<&'static str> {
        let mut names = vec![DEFAULT_OUTPUT];
        match self {
            Tool::Readelf => names.push(RELF),
            Tool::Bap => names.extend([ADT, BIR]),
            Tool::Basil => names.extend([ADT, BIR, RELF, BOOGIE, BASIL_IR]),
            Tool::Boogie | Tool::BoogieSource => names.extend([
                ADT,
                BIR,
                RELF,
                BOOGIE,
                BASIL_IR,
                VERIFIER_OUTPUT,
                COUNTEREXAMPLE_MODEL,
            ]),
            Tool::BoogieCounterexample => names.extend([
                ADT,
                BIR,
                RELF,
                BOOGIE,
                BASIL_IR,
                VERIFIER_OUTPUT,
                COUNTEREXAMPLE_MODEL,
                COUNTEREXAMPLE,
            ]),
        }
        names.sort_unstable();
        names
    }

    /// Reject an output name this tool can never produce, before anything runs.
    pub fn check_output_name(&self, name: &str) -> PipelineResult<()> {
        let names = self.output_names();
        if names.contains(&name) {
            Ok(())
        } else {
            Err(PipelineError::UnknownOutputName {
                name: name.to_string(),
                available: names.into_iter().map(String::from).collect(),
            })
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownTool {
                name: s.to_string(),
                available: Tool::names(),
            })
    }
}

/// Per-run parameters that feed into stage job keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRequest {
    /// Specification file forwarded to the translator.
    pub spec: Option<PathBuf>,
    /// Extra verifier arguments, appended after the defaults.
    pub verifier_args: Vec<String>,
}

/// Accumulated result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub outputs: OutputSet,
    /// Present when the verify stage ran.
    pub verification: Option<VerificationOutcome>,
    pub executed: usize,
    pub cached: usize,
}

/// Wires stage invocations into the fixed lift -> symbols -> translate ->
/// verify -> model-print graph.
///
/// Each stage's job key also carries the keys of the stages it consumes, so a
/// changed upstream invocation invalidates everything downstream of it.
pub struct Pipeline<'a> {
    config: &'a ToolConfig,
    layout: &'a StagingLayout,
    runner: StageRunner<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ToolConfig, layout: &'a StagingLayout, runner: StageRunner<'a>) -> Self {
        Self { config, layout, runner }
    }

    pub fn run(&self, tool: Tool, request: &PipelineRequest) -> PipelineResult<PipelineRun> {
        let span = info_span!("pipeline", tool = %tool);
        let _guard = span.enter();

        let mut state = RunState::default();
        match tool {
            Tool::Readelf => {
                self.compose(&mut state, symbols::invocation(self.config, self.layout), &[])?;
            }
            Tool::Bap => {
                self.compose(&mut state, lifter::invocation(self.config, self.layout), &[])?;
            }
            _ => {
                let lift =
                    self.compose(&mut state, lifter::invocation(self.config, self.layout), &[])?;
                let syms =
                    self.compose(&mut state, symbols::invocation(self.config, self.layout), &[])?;
                let translate = translator::invocation(
                    self.config,
                    self.layout,
                    &state.outputs,
                    request.spec.as_deref(),
                )?;
                let translated = self.compose(&mut state, translate, &[&lift, &syms])?;

                if tool.verifies() {
                    self.verify_stage(&mut state, tool, &translated, request)?;
                }
            }
        }

        info!(
            executed = state.executed,
            cached = state.cached,
            outputs = ?state.outputs.names(),
            "Pipeline finished"
        );
        Ok(PipelineRun {
            outputs: state.outputs,
            verification: state.verification,
            executed: state.executed,
            cached: state.cached,
        })
    }

    fn verify_stage(
        &self,
        state: &mut RunState,
        tool: Tool,
        translated: &StageReport,
        request: &PipelineRequest,
    ) -> PipelineResult<()> {
        let verify =
            verifier::invocation(self.config, self.layout, &state.outputs, &request.verifier_args)?;
        let verified = self.compose(state, verify, &[translated])?;
        let exit_code = verified.execution.as_ref().and_then(|e| e.exit_code);
        let outcome = VerificationOutcome::from_outputs(
            &verified.outputs,
            exit_code,
            &self.config.failure_marker,
        )?;
        match &outcome {
            VerificationOutcome::Verified => info!("Verification succeeded"),
            VerificationOutcome::CounterexampleFound => info!("Verifier reported a counterexample"),
            VerificationOutcome::Error(reason) => warn!(%reason, "Verifier did not complete"),
        }

        match tool {
            Tool::BoogieSource => {
                state.outputs.set_default(BOOGIE);
            }
            Tool::BoogieCounterexample
                if outcome == VerificationOutcome::CounterexampleFound
                    && state.outputs.contains(COUNTEREXAMPLE_MODEL) =>
            {
                let print = model_printer::invocation(self.config, self.layout, &state.outputs)?;
                self.compose(state, print, &[&verified])?;
            }
            _ => {}
        }
        state.verification = Some(outcome);
        Ok(())
    }

    /// Run one stage keyed on its upstream jobs and fold its outputs in.
    fn compose(
        &self,
        state: &mut RunState,
        invocation: StageInvocation,
        upstream: &[&StageReport],
    ) -> PipelineResult<StageReport> {
        let invocation = upstream
            .iter()
            .fold(invocation, |inv, dep| inv.key_param(dep.job_key.to_string()));
        let report = self.runner.run(&invocation)?;
        if report.cached() {
            state.cached += 1;
        } else {
            state.executed += 1;
        }
        state.outputs.merge(&report.outputs);
        Ok(report)
    }
}

#[derive(Debug, Default)]
struct RunState {
    outputs: OutputSet,
    verification: Option<VerificationOutcome>,
    executed: usize,
    cached: usize,
}
