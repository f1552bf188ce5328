//! Configuration loading and validation

mod schema;

pub use schema::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Example configuration written by `modulo init`
pub const EXAMPLE_CONFIG: &str = include_str!("../../modulo.example.yaml");

/// Load configuration from a YAML file
pub fn load_config(path: &Path) -> Result<ModuloConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {:?}", path))?;
    let config: ModuloConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if given, otherwise fall back to the defaults
pub fn load_or_default(path: Option<&Path>) -> Result<ModuloConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(ModuloConfig::default()),
    }
}
