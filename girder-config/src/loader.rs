// YAML configuration file loading

use crate::{ConfigError, Result};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Environment variable naming the directory that holds `config/`.
pub const CONFIG_DIR_VAR: &str = "CONFIG_DIR";

/// Resolve the path of a configuration file: `$CONFIG_DIR/config/<file>`,
/// with `CONFIG_DIR` defaulting to the working directory.
pub fn config_path(file: &str) -> PathBuf {
    let base = env::var(CONFIG_DIR_VAR).unwrap_or_else(|_| ".".to_string());
    PathBuf::from(base).join("config").join(file)
}

/// Read and deserialize a YAML file from the configuration directory.
/// A missing or unreadable file is a load error, not an empty default.
pub fn load_yaml<T: DeserializeOwned>(file: &str) -> Result<T> {
    let path = config_path(file);
    let data = fs::read_to_string(&path)
        .map_err(|e| ConfigError::LoadError(format!("{}: {e}", path.display())))?;
    parse_yaml(&data)
}

/// Deserialize YAML from a string.
pub fn parse_yaml<T: DeserializeOwned>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| ConfigError::ParseError(e.to_string()))
}
