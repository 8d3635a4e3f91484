use std::fs;
use std::path::Path;

use crate::model::OutputSet;
use crate::services::error::{PipelineError, PipelineResult};

/// Resolve `name` against a finished run's outputs.
pub fn resolve<'a>(outputs: &'a OutputSet, name: &str) -> PipelineResult<&'a Path> {
    outputs.get(name).ok_or_else(|| PipelineError::UnknownOutputName {
        name: name.to_string(),
        available: outputs.names(),
    })
}

/// Read the artifact behind `name` as text. Invalid UTF-8 is replaced rather
/// than rejected, since tool output is not guaranteed to be clean.
pub fn select(outputs: &OutputSet, name: &str) -> PipelineResult<String> {
    let path = resolve(outputs, name)?;
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
