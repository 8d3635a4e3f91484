use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod commands;

/// Canonicalize the path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // The compilation directory may not exist yet; join it with the
        // current dir so the seed stays stable either way.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Read the binary to analyze from a file, or from stdin for `None` / `-`.
pub fn read_input(source: Option<&str>) -> Result<Vec<u8>> {
    match source {
        None | Some("-") => {
            let mut buf = Vec::new();
            std::io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .context("Failed to read binary from stdin")?;
            Ok(buf)
        }
        Some(path) => {
            fs::read(path).with_context(|| format!("Failed to read binary from {path}"))
        }
    }
}
