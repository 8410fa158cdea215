//! Configuration file discovery and TOML loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "TOURGEN_CONFIG";

/// Configuration file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "tourgen.toml";

/// Where a configuration file path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    UserConfigDir,
    SystemConfigDir,
}

/// Resolve the configuration file path in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. User config directory (`~/.config/tourgen/tourgen.toml` on Linux)
/// 4. System config directory (`/etc/tourgen/tourgen.toml`, Linux only)
///
/// Returns `None` when no file exists; callers fall back to compiled defaults.
/// An explicit path (CLI or ENV) is returned even if the file is missing so the
/// caller can report it instead of silently using defaults.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Option<(PathBuf, ConfigSource)> {
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), ConfigSource::CommandLine));
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), ConfigSource::Environment));
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("tourgen").join(CONFIG_FILE_NAME)) {
        if user_config.exists() {
            return Some((user_config, ConfigSource::UserConfigDir));
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/tourgen").join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some((system_config, ConfigSource::SystemConfigDir));
        }
    }

    None
}

/// Read and parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!(path = %path.display(), "Loading TOML configuration");

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Read an environment variable, treating blank values as absent
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Standard User-Agent for outbound HTTP requests
///
/// Public geocoding and knowledge-graph services ask clients to identify themselves.
pub fn get_user_agent() -> String {
    format!(
        "TourGen/{} (+https://github.com/tourgen/tourgen)",
        env!("CARGO_PKG_VERSION")
    )
}
