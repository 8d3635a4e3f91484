#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use basil_core::db::{CacheIndex, StagingLayout, ToolCommand, ToolConfig};
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

/// A staging root, a tool config pointing at shell scripts, and a log of
/// every script invocation.
struct Toolchain {
    dir: TempDir,
    config_path: PathBuf,
    staging_root: PathBuf,
    log_path: PathBuf,
}

impl Toolchain {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let log_path = dir.path().join("calls.log");
        let log = log_path.display().to_string();

        let readelf = script(
            dir.path(),
            "readelf.sh",
            &format!("echo readelf >> '{log}'\nprintf 'Symbol table .symtab for %s\\n' \"$4\"\n"),
        );
        let lifter = script(
            dir.path(),
            "bap.sh",
            &format!(
                "echo bap >> '{log}'\nfor a in \"$@\"; do\n  case \"$a\" in\n    adt:*) echo adt > \"${{a#adt:}}\" ;;\n    bir:*) echo bir > \"${{a#bir:}}\" ;;\n  esac\ndone\n"
            ),
        );
        let translator = script(
            dir.path(),
            "basil.sh",
            &format!(
                "echo basil >> '{log}'\nwhile [ $# -gt 0 ]; do\n  case \"$1\" in\n    --output) echo 'procedure main();' > \"$2\"; shift ;;\n    --dump-il) echo il > \"$2\"; shift ;;\n  esac\n  shift\ndone\nexit 1\n"
            ),
        );
        let verifier = script(
            dir.path(),
            "boogie.sh",
            &format!(
                "echo boogie >> '{log}'\nfor a in \"$@\"; do\n  case \"$a\" in\n    /mv:*) echo 'R0 -> 42' > \"${{a#/mv:}}\" ;;\n  esac\ndone\necho 'out.bpl(3,1): Error: This assertion might not hold.'\necho 'Boogie program verifier finished with 0 verified, 1 error'\nexit 1\n"
            ),
        );
        let printer = script(
            dir.path(),
            "printer.sh",
            &format!("echo printer >> '{log}'\necho '*** MODEL'\n"),
        );

        let staging_root = dir.path().join("staging");
        let config = ToolConfig {
            staging_root: staging_root.clone(),
            readelf: sh(&readelf),
            lifter: sh(&lifter),
            translator: sh(&translator),
            verifier: sh(&verifier),
            model_printer: sh(&printer),
            stage_timeout_ms: 30_000,
            ..ToolConfig::default()
        };
        let config_path = dir.path().join("tools.yaml");
        fs::write(&config_path, serde_yaml::to_string(&config).expect("serialize config"))
            .expect("write config");

        Self { dir, config_path, staging_root, log_path }
    }

    fn binary(&self) -> PathBuf {
        let path = self.dir.path().join("prog.elf");
        fs::write(&path, b"\x7fELF fake binary").expect("write binary");
        path
    }

    fn compilation_dir(&self) -> PathBuf {
        let path = self.dir.path().join("compilation");
        fs::create_dir_all(&path).expect("create compilation dir");
        path
    }

    fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("basil-tool");
        cmd.arg("--config").arg(&self.config_path);
        for var in [
            "BASIL_TOOL_CONFIG",
            "BASIL_READELF",
            "BASIL_LIFTER",
            "BASIL_TRANSLATOR_JAR",
            "BASIL_VERIFIER",
            "BASIL_MODEL_PRINTER",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log_path)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    fn layout_for(&self, compilation: &Path) -> StagingLayout {
        let seed = compilation.canonicalize().expect("canonicalize compilation dir");
        StagingLayout::for_seed(&self.staging_root, &seed.to_string_lossy())
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    path
}

// Scripts run through /bin/sh so they never need the executable bit.
fn sh(script: &Path) -> ToolCommand {
    ToolCommand::new("/bin/sh").with_args([script.display().to_string()])
}

#[test]
fn readelf_prints_symbol_listing_and_writes_stdout_file() {
    let tools = Toolchain::new();
    let compilation = tools.compilation_dir();

    tools
        .command()
        .arg(tools.binary())
        .arg("-d")
        .arg(&compilation)
        .args(["-t", "readelf"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Symbol table .symtab for"));

    let persisted = fs::read_to_string(compilation.join("stdout")).expect("stdout file");
    assert!(persisted.contains("a.out"), "{persisted}");
    assert_eq!(tools.calls(), vec!["readelf"]);
}

#[test]
fn binary_can_come_from_stdin() {
    let tools = Toolchain::new();
    tools
        .command()
        .args(["-t", "readelf", "-o", "relf"])
        .write_stdin(b"\x7fELF from stdin".to_vec())
        .assert()
        .success()
        .stdout(predicate::str::contains("Symbol table"));
}

#[test]
fn basil_rerun_spawns_no_tools() {
    let tools = Toolchain::new();
    let compilation = tools.compilation_dir();
    let binary = tools.binary();

    for _ in 0..2 {
        tools
            .command()
            .arg(&binary)
            .arg("-d")
            .arg(&compilation)
            .assert()
            .success()
            .stdout(predicate::str::contains("procedure main();"));
    }
    assert_eq!(tools.calls(), vec!["bap", "readelf", "basil"]);

    let layout = tools.layout_for(&compilation);
    assert!(layout.binary_path.is_file());
    assert!(!layout.lock_path.exists());
}

#[test]
fn boogie_counterexample_appends_printer_output() {
    let tools = Toolchain::new();
    let compilation = tools.compilation_dir();

    tools
        .command()
        .arg(tools.binary())
        .arg("-d")
        .arg(&compilation)
        .args(["-t", "boogie-counterexample"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("might not hold").and(predicate::str::contains("*** MODEL")),
        );

    assert_eq!(tools.calls(), vec!["bap", "readelf", "basil", "boogie", "printer"]);
}

#[test]
fn unknown_output_lists_names_and_creates_no_cache_entries() {
    let tools = Toolchain::new();
    let compilation = tools.compilation_dir();

    tools
        .command()
        .arg(tools.binary())
        .arg("-d")
        .arg(&compilation)
        .args(["-t", "bap", "-o", "unknownname"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("allowed are: adt, bir, default"));

    assert!(tools.calls().is_empty());
    let layout = tools.layout_for(&compilation);
    if layout.cache_db_path.exists() {
        let cache = CacheIndex::open(&layout.cache_db_path).expect("open cache");
        assert!(cache.job_keys().expect("job keys").is_empty());
    }
}

#[test]
fn unknown_tool_lists_allowed_tools() {
    let tools = Toolchain::new();
    tools
        .command()
        .arg(tools.binary())
        .args(["-t", "objdump"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Allowed tools: [readelf, bap, basil, boogie, boogie-source, boogie-counterexample]",
        ));
}

#[test]
fn different_binary_in_same_compilation_aborts() {
    let tools = Toolchain::new();
    let compilation = tools.compilation_dir();

    tools
        .command()
        .arg(tools.binary())
        .arg("-d")
        .arg(&compilation)
        .args(["-t", "readelf"])
        .assert()
        .success();

    let other = tools.dir.path().join("other.elf");
    fs::write(&other, b"\x7fELF something else").expect("write other");
    tools
        .command()
        .arg(&other)
        .arg("-d")
        .arg(&compilation)
        .args(["-t", "readelf"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("hash mismatch"));

    tools
        .command()
        .arg(&other)
        .arg("-d")
        .arg(&compilation)
        .args(["-t", "readelf", "--on-mismatch", "overwrite"])
        .assert()
        .success();
    assert_eq!(tools.calls(), vec!["readelf", "readelf"]);
}

#[test]
fn spec_is_resolved_inside_the_compilation_directory() {
    let tools = Toolchain::new();
    let compilation = tools.compilation_dir();
    fs::write(compilation.join("main.spec"), "Globals:\n").expect("write spec");

    tools
        .command()
        .arg(tools.binary())
        .arg("-d")
        .arg(&compilation)
        .args(["-t", "basil", "-s", "main.spec", "--import"])
        .assert()
        .success();

    let layout = tools.layout_for(&compilation);
    assert!(layout.source_dir.join("main.spec").is_file());
}

#[test]
fn clean_removes_the_staging_area() {
    let tools = Toolchain::new();
    let compilation = tools.compilation_dir();
    tools
        .command()
        .arg(tools.binary())
        .arg("-d")
        .arg(&compilation)
        .args(["-t", "readelf"])
        .assert()
        .success();
    let layout = tools.layout_for(&compilation);
    assert!(layout.root.exists());

    tools
        .command()
        .arg("-d")
        .arg(&compilation)
        .arg("--clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed staging area"));
    assert!(!layout.root.exists());
}
