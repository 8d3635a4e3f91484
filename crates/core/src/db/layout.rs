use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Logical layout of a staging area on disk.
///
/// Every stage writes to a fixed path derived from the staging root, which is
/// what lets a later invocation find the artifacts of an earlier one. This
/// does *not* perform any IO itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    /// Root of the staging area.
    pub root: PathBuf,
    /// The staged input binary.
    pub binary_path: PathBuf,
    /// Hex SHA-256 of the staged binary.
    pub hash_marker_path: PathBuf,
    /// SQLite cache index.
    pub cache_db_path: PathBuf,
    /// Advisory lock held for the duration of a pipeline run.
    pub lock_path: PathBuf,
    /// Lifter ADT output.
    pub adt_path: PathBuf,
    /// Lifter BIR output.
    pub bir_path: PathBuf,
    /// Captured symbol/relocation listing.
    pub relf_path: PathBuf,
    /// Translator Boogie program.
    pub boogie_path: PathBuf,
    /// Translator IR dump.
    pub il_path: PathBuf,
    /// Captured verifier output.
    pub verifier_output_path: PathBuf,
    /// Counterexample model written by the verifier.
    pub model_path: PathBuf,
    /// Verifier output followed by the pretty-printed model.
    pub counterexample_path: PathBuf,
    /// Imported copy of the compilation directory.
    pub source_dir: PathBuf,
}

impl StagingLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            binary_path: root.join("a.out"),
            hash_marker_path: root.join("bin_hash.sha256"),
            cache_db_path: root.join("cache.db"),
            lock_path: root.join(".lock"),
            adt_path: root.join("out.adt"),
            bir_path: root.join("out.bir"),
            relf_path: root.join("out.relf"),
            boogie_path: root.join("out.bpl"),
            il_path: root.join("out.il"),
            verifier_output_path: root.join("out.verify"),
            model_path: root.join("out.model"),
            counterexample_path: root.join("out.counterexample"),
            source_dir: root.join("source"),
            root,
        }
    }

    /// Layout of the staging area reserved for a compilation seed.
    ///
    /// The seed (usually the compilation directory) is hashed so that repeated
    /// invocations for the same compilation land in the same directory.
    pub fn for_seed(staging_root: &Path, seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        Self::new(staging_root.join(format!("{:x}", hasher.finalize())))
    }
}
