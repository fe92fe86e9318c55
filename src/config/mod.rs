// Configuration module for the recording registry
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use loader::ConfigLoader;
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RegistryConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<RegistryConfig> {
    let mut config = load_config(path)?;

    // Allow environment variables to override config values
    if let Ok(storage) = std::env::var("RECORDINGS_STORAGE") {
        config.recordings_storage = storage.into();
    }

    if let Ok(uri) = std::env::var("DATABASE_URI") {
        config.database_uri = uri;
    }

    if let Ok(name) = std::env::var("DATABASE_NAME") {
        config.database_name = name;
    }

    Ok(config)
}
