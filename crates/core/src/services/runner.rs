use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::db::{CacheIndex, CacheLookup, JobRunRecord, JobRunStatus};
use crate::model::{JobKey, OutputSet, DEFAULT_OUTPUT};
use crate::services::error::{PipelineError, PipelineResult};
use crate::services::process::{CommandExecutor, CommandSpec, ExecError, ProcessOutput, RunOptions};
use crate::services::staging::write_atomic;

/// Where a declared output comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSource {
    /// Written by the tool itself; missing after the run is a stage failure.
    File,
    /// Written by the tool only in some runs (e.g. a counterexample model).
    OptionalFile,
    /// The runner persists the captured stdout, optionally after the contents
    /// of another file.
    Stdout { prefix: Option<PathBuf> },
}

/// A named artifact a stage produces at a fixed staging path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredOutput {
    pub name: String,
    pub path: PathBuf,
    pub source: OutputSource,
}

/// How a non-zero exit is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Non-zero exit aborts the pipeline.
    Fatal,
    /// Non-zero exit is logged; missing required outputs are the real failure.
    TolerateExit,
}

/// One external-tool invocation, fully described.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub stage: String,
    pub command: CommandSpec,
    pub outputs: Vec<DeclaredOutput>,
    /// Output `default` points at.
    pub primary: String,
    pub policy: FailurePolicy,
    /// Output-affecting parameters not visible on the command line.
    pub extra_key_params: Vec<String>,
}

impl StageInvocation {
    pub fn new(stage: impl Into<String>, command: CommandSpec, policy: FailurePolicy) -> Self {
        Self {
            stage: stage.into(),
            command,
            outputs: Vec::new(),
            primary: String::new(),
            policy,
            extra_key_params: Vec::new(),
        }
    }

    pub fn output(
        mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        source: OutputSource,
    ) -> Self {
        self.outputs.push(DeclaredOutput { name: name.into(), path: path.into(), source });
        self
    }

    pub fn primary(mut self, name: impl Into<String>) -> Self {
        self.primary = name.into();
        self
    }

    pub fn key_param(mut self, param: impl Into<String>) -> Self {
        self.extra_key_params.push(param.into());
        self
    }

    /// Stage name plus the full argv plus any extra parameters.
    pub fn job_key(&self) -> JobKey {
        let params = self.command.argv().into_iter().chain(self.extra_key_params.iter().cloned());
        JobKey::new(&self.stage, params)
    }
}

/// What a runner invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub job_key: JobKey,
    pub outputs: OutputSet,
    /// `None` when the result was served from the cache index.
    pub execution: Option<ProcessOutput>,
}

impl StageReport {
    pub fn cached(&self) -> bool {
        self.execution.is_none()
    }
}

/// Executes stage invocations with memoization through a `CacheIndex`.
pub struct StageRunner<'a> {
    cache: &'a CacheIndex,
    executor: &'a dyn CommandExecutor,
    options: RunOptions,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        cache: &'a CacheIndex,
        executor: &'a dyn CommandExecutor,
        options: RunOptions,
    ) -> Self {
        Self { cache, executor, options }
    }

    /// Run `invocation`, or return its recorded outputs if it completed before.
    pub fn run(&self, invocation: &StageInvocation) -> PipelineResult<StageReport> {
        let job_key = invocation.job_key();
        let span = info_span!("stage", stage = %invocation.stage);
        let _guard = span.enter();
        let started_at = Utc::now().to_rfc3339();

        match self.cache.lookup(&job_key)? {
            CacheLookup::Hit(outputs) => {
                info!(job = %job_key, "Cache hit; skipping execution");
                self.record(&job_key, &invocation.stage, JobRunStatus::Cached, None, &started_at);
                return Ok(StageReport { job_key, outputs, execution: None });
            }
            CacheLookup::Corrupt { reason } => {
                let err = PipelineError::CacheCorruption { job_key: job_key.to_string(), reason };
                warn!(error = %err, "Discarding cache entries and re-running");
                self.cache.remove(&job_key)?;
            }
            CacheLookup::Miss => {}
        }

        // Outputs live at fixed paths shared with other parameterizations of
        // this stage; those jobs stop being valid once we overwrite the files.
        let paths: Vec<PathBuf> = invocation.outputs.iter().map(|o| o.path.clone()).collect();
        let invalidated = self.cache.invalidate_paths(&paths, &job_key)?;
        if invalidated > 0 {
            debug!(invalidated, "Invalidated jobs sharing output paths");
        }
        for path in &paths {
            remove_stale(path)?;
        }

        info!(command = ?invocation.command.argv(), "Running stage");
        let execution = match self.executor.execute(&invocation.command, &self.options) {
            Ok(out) => out,
            Err(e) => {
                self.record(&job_key, &invocation.stage, JobRunStatus::Failed, None, &started_at);
                return Err(self.exec_error(&invocation.stage, &invocation.command, e));
            }
        };
        debug!(stdout = %execution.stdout, stderr = %execution.stderr, "Captured stage output");

        if !execution.success() {
            let code = exit_code_display(execution.exit_code);
            match invocation.policy {
                FailurePolicy::Fatal => {
                    warn!(exit = %code, stderr = %execution.stderr, "Stage failed");
                    self.record(
                        &job_key,
                        &invocation.stage,
                        JobRunStatus::Failed,
                        execution.exit_code,
                        &started_at,
                    );
                    return Err(PipelineError::StageExecutionFailure {
                        stage: invocation.stage.clone(),
                        reason: format!(
                            "{} exited with {}: {}",
                            invocation.command.program,
                            code,
                            execution.stderr.trim()
                        ),
                    });
                }
                FailurePolicy::TolerateExit => {
                    warn!(
                        exit = %code,
                        stderr = %execution.stderr,
                        "Stage exited non-zero; checking declared outputs"
                    );
                }
            }
        } else if !execution.stderr.trim().is_empty() {
            debug!(stderr = %execution.stderr, "Stage wrote to stderr");
        }

        let outputs = match self.collect_outputs(invocation, &execution) {
            Ok(outputs) => outputs,
            Err(e) => {
                self.record(
                    &job_key,
                    &invocation.stage,
                    JobRunStatus::Failed,
                    execution.exit_code,
                    &started_at,
                );
                return Err(e);
            }
        };

        self.cache.put(&job_key, &outputs)?;
        self.record(
            &job_key,
            &invocation.stage,
            JobRunStatus::Executed,
            execution.exit_code,
            &started_at,
        );
        info!(outputs = ?outputs.names(), "Stage complete");
        Ok(StageReport { job_key, outputs, execution: Some(execution) })
    }

    fn collect_outputs(
        &self,
        invocation: &StageInvocation,
        execution: &ProcessOutput,
    ) -> PipelineResult<OutputSet> {
        let mut outputs = OutputSet::new();
        for declared in &invocation.outputs {
            match &declared.source {
                OutputSource::Stdout { prefix } => {
                    let mut body = match prefix {
                        Some(p) => fs::read(p)?,
                        None => Vec::new(),
                    };
                    body.extend_from_slice(execution.stdout.as_bytes());
                    write_atomic(&declared.path, &body)?;
                }
                OutputSource::File => {
                    if !declared.path.is_file() {
                        return Err(PipelineError::MissingOutput {
                            stage: invocation.stage.clone(),
                            name: declared.name.clone(),
                            path: declared.path.clone(),
                        });
                    }
                }
                OutputSource::OptionalFile => {
                    if !declared.path.is_file() {
                        debug!(name = %declared.name, "Optional output not produced");
                        continue;
                    }
                }
            }
            outputs.insert(declared.name.clone(), declared.path.clone());
        }

        if !outputs.set_default(&invocation.primary) {
            return Err(PipelineError::MissingOutput {
                stage: invocation.stage.clone(),
                name: DEFAULT_OUTPUT.to_string(),
                path: PathBuf::from(&invocation.primary),
            });
        }
        Ok(outputs)
    }

    fn exec_error(&self, stage: &str, command: &CommandSpec, err: ExecError) -> PipelineError {
        match err {
            ExecError::Launch(e) => PipelineError::StageExecutionFailure {
                stage: stage.to_string(),
                reason: format!("failed to launch {}: {e}", command.program),
            },
            ExecError::Io(e) => PipelineError::Io(e),
            ExecError::TimedOut(timeout) => {
                PipelineError::StageTimeout { stage: stage.to_string(), timeout }
            }
            ExecError::Cancelled => PipelineError::StageCancelled { stage: stage.to_string() },
        }
    }

    fn record(
        &self,
        job_key: &JobKey,
        stage: &str,
        status: JobRunStatus,
        exit_code: Option<i32>,
        started_at: &str,
    ) {
        record_job_run(self.cache, job_key, stage, status, exit_code, started_at);
    }
}

/// Best-effort audit log write; a failure here never fails the stage.
pub(crate) fn record_job_run(
    cache: &CacheIndex,
    job_key: &JobKey,
    stage: &str,
    status: JobRunStatus,
    exit_code: Option<i32>,
    started_at: &str,
) {
    let record = JobRunRecord {
        job_key: job_key.to_string(),
        stage: stage.to_string(),
        status,
        exit_code,
        started_at: started_at.to_string(),
        finished_at: Utc::now().to_rfc3339(),
    };
    if let Err(e) = cache.record_run(&record) {
        warn!(error = %e, "Failed to record job run");
    }
}

fn remove_stale(path: &std::path::Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn exit_code_display(code: Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
}
