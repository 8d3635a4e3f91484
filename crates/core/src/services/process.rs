use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fully rendered external command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), cwd: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program followed by its arguments, e.g. for logging and job keys.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone()).chain(self.args.iter().cloned()).collect()
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to launch: {0}")]
    Launch(std::io::Error),
    #[error("I/O error while waiting: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Shared flag a caller can flip to abort the stage currently running.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-invocation execution limits.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

/// Seam between the stage runner and process spawning.
pub trait CommandExecutor {
    /// Run `command` to completion, honouring `options`. A non-zero exit is
    /// *not* an error here; callers apply their own failure policy.
    fn execute(&self, command: &CommandSpec, options: &RunOptions)
        -> Result<ProcessOutput, ExecError>;
}

/// Executor that spawns real processes with piped stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(
        &self,
        command: &CommandSpec,
        options: &RunOptions,
    ) -> Result<ProcessOutput, ExecError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(ExecError::Launch)?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let (tx, rx) = mpsc::channel();
        spawn_reader(child.stdout.take(), Stream::Stdout, tx.clone());
        spawn_reader(child.stderr.take(), Stream::Stderr, tx);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if options.cancel.is_cancelled() {
                terminate(&mut child);
                return Err(ExecError::Cancelled);
            }
            if let Some(limit) = options.timeout {
                if started.elapsed() >= limit {
                    terminate(&mut child);
                    return Err(ExecError::TimedOut(limit));
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        // A grandchild may still hold the pipes open, so the budget covers this too.
        let (stdout, stderr) = collect_output(&rx, started, options)?;
        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type Chunk = (Stream, std::io::Result<Vec<u8>>);

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, tx: Sender<Chunk>) {
    thread::spawn(move || {
        // The receiver is gone once the stage has given up on this process.
        let _ = tx.send((stream, drain(pipe)));
    });
}

fn collect_output(
    rx: &Receiver<Chunk>,
    started: Instant,
    options: &RunOptions,
) -> Result<(Vec<u8>, Vec<u8>), ExecError> {
    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        if options.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        let wait = match options.timeout {
            Some(limit) => match limit.checked_sub(started.elapsed()) {
                Some(left) if !left.is_zero() => left.min(POLL_INTERVAL),
                _ => return Err(ExecError::TimedOut(limit)),
            },
            None => POLL_INTERVAL,
        };
        match rx.recv_timeout(wait) {
            Ok((Stream::Stdout, chunk)) => stdout = Some(chunk?),
            Ok((Stream::Stderr, chunk)) => stderr = Some(chunk?),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ExecError::Io(std::io::Error::other("output reader stopped")));
            }
        }
    }
    Ok((stdout.unwrap_or_default(), stderr.unwrap_or_default()))
}

fn drain<R: Read>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

// Reader threads are left detached: grandchildren may keep the pipes open.
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
