use std::path::Path;

use anyhow::{Context, Result};

use crate::db::{ToolCommand, ToolConfig};

/// Environment variable naming a config file when none is passed explicitly.
pub const CONFIG_ENV: &str = "BASIL_TOOL_CONFIG";

/// Load a tool config from disk (YAML or JSON based on extension).
pub fn load_tool_config(path: &Path) -> Result<ToolConfig> {
    let body = std::fs::read(path)
        .with_context(|| format!("Failed to read tool config at {}", path.display()))?;
    let config = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_slice(&body).context("Failed to parse tool config JSON")?
    } else {
        serde_yaml::from_slice(&body).context("Failed to parse tool config YAML")?
    };
    Ok(config)
}

/// Resolve the effective config: defaults, then the config file (explicit path
/// or `BASIL_TOOL_CONFIG`), then per-tool environment overrides.
pub fn resolve_tool_config(explicit: Option<&Path>) -> Result<ToolConfig> {
    let from_env = std::env::var_os(CONFIG_ENV).map(std::path::PathBuf::from);
    let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => load_tool_config(&path)?,
        None => ToolConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut ToolConfig) {
    if let Some(p) = env_string("BASIL_READELF") {
        config.readelf = ToolCommand::new(p);
    }
    if let Some(p) = env_string("BASIL_LIFTER") {
        config.lifter = ToolCommand::new(p);
    }
    if let Some(jar) = env_string("BASIL_TRANSLATOR_JAR") {
        config.translator.args = vec!["-jar".to_string(), jar];
    }
    if let Some(p) = env_string("BASIL_VERIFIER") {
        config.verifier = ToolCommand::new(p);
    }
    if let Some(p) = env_string("BASIL_MODEL_PRINTER") {
        config.model_printer = ToolCommand::new(p);
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
