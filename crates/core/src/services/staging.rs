use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::db::{CacheIndex, MismatchPolicy, StagingLayout};
use crate::services::error::{PipelineError, PipelineResult};

/// Hex SHA-256 of a byte buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// What `stage_binary` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingOutcome {
    /// First write into this staging area.
    Written,
    /// The identical binary was already staged; nothing was touched.
    Unchanged,
    /// The marker was present but the staged binary was missing or torn; it
    /// was rewritten.
    Repaired,
    /// A different binary was staged; the old one was kept.
    MismatchIgnored { expected: String, found: String },
    /// A different binary was staged; it was replaced and the cache cleared.
    Replaced { previous: String },
}

/// Result of staging a binary: its fixed path, content hash, and what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBinary {
    pub path: PathBuf,
    pub hash: String,
    pub outcome: StagingOutcome,
}

/// Place `content` at the layout's fixed binary path and record its hash.
///
/// The binary is committed (temp file + rename) before the hash marker, so a
/// crash can never leave a marker vouching for a truncated binary. When the
/// marker disagrees with `content`, `policy` decides: `Abort` returns
/// `IntegrityMismatch`; `Warn` keeps the old binary; `Overwrite` replaces it
/// and clears `cache`, since job keys do not encode the binary's identity.
pub fn stage_binary(
    layout: &StagingLayout,
    content: &[u8],
    policy: MismatchPolicy,
    cache: Option<&CacheIndex>,
) -> PipelineResult<StagedBinary> {
    fs::create_dir_all(&layout.root)?;
    let hash = sha256_hex(content);

    let recorded = read_marker(&layout.hash_marker_path)?;
    let outcome = match recorded {
        None => {
            info!(hash = %hash, path = %layout.binary_path.display(), "Writing binary");
            commit_binary(layout, content, &hash)?;
            StagingOutcome::Written
        }
        Some(existing) if existing == hash => {
            if staged_binary_matches(&layout.binary_path, &hash)? {
                info!(hash = %hash, "Binary exists");
                StagingOutcome::Unchanged
            } else {
                warn!(
                    path = %layout.binary_path.display(),
                    "Staged binary missing or torn; rewriting"
                );
                commit_binary(layout, content, &hash)?;
                StagingOutcome::Repaired
            }
        }
        Some(existing) => match policy {
            MismatchPolicy::Abort => {
                return Err(PipelineError::IntegrityMismatch { expected: existing, found: hash });
            }
            MismatchPolicy::Warn => {
                warn!(
                    expected = %existing,
                    found = %hash,
                    "Binary mismatch (different compilation?); keeping staged copy"
                );
                StagingOutcome::MismatchIgnored { expected: existing, found: hash.clone() }
            }
            MismatchPolicy::Overwrite => {
                warn!(
                    previous = %existing,
                    hash = %hash,
                    "Replacing staged binary and clearing cache"
                );
                remove_if_exists(&layout.hash_marker_path)?;
                commit_binary(layout, content, &hash)?;
                if let Some(cache) = cache {
                    cache.clear()?;
                }
                StagingOutcome::Replaced { previous: existing }
            }
        },
    };

    let hash = match &outcome {
        StagingOutcome::MismatchIgnored { expected, .. } => expected.clone(),
        _ => hash,
    };
    info!(hash = %hash, "Loaded binary");
    Ok(StagedBinary { path: layout.binary_path.clone(), hash, outcome })
}

/// Delete a staging area and everything in it. Missing directories are fine.
pub fn remove_staging_area(layout: &StagingLayout) -> PipelineResult<bool> {
    if !layout.root.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(&layout.root)?;
    info!(path = %layout.root.display(), "Removed staging area");
    Ok(true)
}

fn read_marker(path: &Path) -> PipelineResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(body) => Ok(Some(body.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn staged_binary_matches(path: &Path, hash: &str) -> PipelineResult<bool> {
    match fs::read(path) {
        Ok(bytes) => Ok(sha256_hex(&bytes) == hash),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn commit_binary(layout: &StagingLayout, content: &[u8], hash: &str) -> PipelineResult<()> {
    write_atomic(&layout.binary_path, content)?;
    write_atomic(&layout.hash_marker_path, hash.as_bytes())?;
    Ok(())
}

/// Write to a sibling temp file, sync it, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a.out");
        write_atomic(&target, b"payload").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"payload");
        assert!(!dir.path().join("a.out.tmp").exists());
    }
}
