//! In-process stand-ins for the external toolchain.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;

use basil_core::db::{ToolCommand, ToolConfig};
use basil_core::services::{CommandExecutor, CommandSpec, ExecError, ProcessOutput, RunOptions};

pub const READELF_STDOUT: &str = "Symbol table '.symtab' contains 2 entries:\n   1: 0000000000400470 main\n";
pub const VERIFIED_STDOUT: &str = "\nBoogie program verifier finished with 2 verified, 0 errors\n";
pub const FAILED_STDOUT: &str = "out.bpl(7,3): Error: This assertion might not hold.\n\nBoogie program verifier finished with 1 verified, 1 error\n";
pub const PRINTER_STDOUT: &str = "*** MODEL\nR0 -> 42\n*** END_MODEL\n";

/// Config pointing every stage at a bare program name the fake recognises.
pub fn fake_config() -> ToolConfig {
    ToolConfig {
        readelf: ToolCommand::new("readelf"),
        lifter: ToolCommand::new("bap"),
        translator: ToolCommand::new("java").with_args(["-jar", "basil.jar"]),
        verifier: ToolCommand::new("boogie"),
        model_printer: ToolCommand::new("model-printer"),
        ..ToolConfig::default()
    }
}

/// Mimics each tool's file contract and records every spawned argv.
#[derive(Default)]
pub struct FakeToolchain {
    pub calls: RefCell<Vec<Vec<String>>>,
    /// The verifier reports a violation and writes a model.
    pub counterexample: bool,
    /// The translator exits non-zero.
    pub translator_exit: i32,
    /// The translator writes nothing.
    pub translator_silent: bool,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counterexample() -> Self {
        Self { counterexample: true, ..Self::default() }
    }

    pub fn spawned(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn spawned_programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|argv| argv[0].clone()).collect()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).map(String::as_str)
    }
}

fn ok(stdout: &str) -> ProcessOutput {
    ProcessOutput { exit_code: Some(0), stdout: stdout.to_string(), stderr: String::new() }
}

impl CommandExecutor for FakeToolchain {
    fn execute(
        &self,
        command: &CommandSpec,
        _options: &RunOptions,
    ) -> Result<ProcessOutput, ExecError> {
        self.calls.borrow_mut().push(command.argv());
        let args = &command.args;
        match command.program.as_str() {
            "readelf" => Ok(ok(READELF_STDOUT)),
            "bap" => {
                for arg in args {
                    if let Some(path) = arg.strip_prefix("adt:") {
                        fs::write(path, "Program(Tid(1, \"%00000001\"))\n")?;
                    } else if let Some(path) = arg.strip_prefix("bir:") {
                        fs::write(path, "0000001: program\n")?;
                    }
                }
                Ok(ok(""))
            }
            "java" => {
                if !self.translator_silent {
                    if let Some(path) = Self::value_after(args, "--output") {
                        fs::write(path, "procedure main();\n")?;
                    }
                    if let Some(path) = Self::value_after(args, "--dump-il") {
                        fs::write(path, "proc main\n")?;
                    }
                }
                let stderr = if self.translator_exit == 0 {
                    String::new()
                } else {
                    "warning: unsupported instruction".to_string()
                };
                Ok(ProcessOutput { exit_code: Some(self.translator_exit), stdout: String::new(), stderr })
            }
            "boogie" => {
                if self.counterexample {
                    if let Some(path) = args.iter().find_map(|a| a.strip_prefix("/mv:")) {
                        fs::write(path, "*** MODEL\nR0 -> 42\n*** END_MODEL\n")?;
                    }
                    Ok(ProcessOutput {
                        exit_code: Some(1),
                        stdout: FAILED_STDOUT.to_string(),
                        stderr: String::new(),
                    })
                } else {
                    Ok(ok(VERIFIED_STDOUT))
                }
            }
            "model-printer" => Ok(ok(PRINTER_STDOUT)),
            other => Err(ExecError::Launch(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such program: {other}"),
            ))),
        }
    }
}
