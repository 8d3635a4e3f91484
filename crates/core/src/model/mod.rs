//! Core data model shared by the cache index, stage runner, and pipeline.
//!
//! - `JobKey`: deterministic identity of one stage invocation.
//! - `OutputSet`: symbolic output name -> artifact path, with a `default` entry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name every output set uses for its primary artifact.
pub const DEFAULT_OUTPUT: &str = "default";

/// Deterministic key identifying one unit of stage work.
///
/// Encoded as `<stage>:<json array of params>`. Parameter order matters: two
/// invocations that pass the same flags in a different order get different
/// keys. The key is not derived from the staged binary's content; a staging
/// area holds exactly one binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey(String);

impl JobKey {
    pub fn new<I, S>(stage: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        // Serializing a Vec<String> cannot fail.
        let encoded = serde_json::to_string(&params).unwrap_or_default();
        Self(format!("{stage}:{encoded}"))
    }

    /// Wrap an already-encoded key (e.g. one read back from the cache index).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from symbolic output names to artifact paths.
///
/// Downstream stages only look outputs up by name, never by position, so the
/// on-disk layout can change without breaking composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSet {
    entries: BTreeMap<String, PathBuf>,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> &mut Self {
        self.entries.insert(name.into(), path.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted output names, for error messages and listings.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    pub fn default_path(&self) -> Option<&Path> {
        self.get(DEFAULT_OUTPUT)
    }

    /// Point `default` at an existing named output. Returns false if `name` is absent.
    pub fn set_default(&mut self, name: &str) -> bool {
        match self.entries.get(name).cloned() {
            Some(path) => {
                self.entries.insert(DEFAULT_OUTPUT.to_string(), path);
                true
            }
            None => false,
        }
    }

    /// Fold another stage's outputs into this accumulated set.
    ///
    /// Named outputs from `other` win on conflict, and `default` follows
    /// `other`'s default so it always tracks the latest composed stage.
    pub fn merge(&mut self, other: &OutputSet) {
        for (name, path) in &other.entries {
            self.entries.insert(name.clone(), path.clone());
        }
    }
}
