// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RegistryConfig> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        // Substitute environment variables
        let content = Self::substitute_env_vars(&content);

        // Parse YAML
        let config: RegistryConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

        // Validate configuration
        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${RECORDINGS_STORAGE:-/data/recordings} -> /data/recordings (if unset)
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").unwrap();

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        })
        .to_string()
    }

    /// Validate configuration
    pub(crate) fn validate(config: &RegistryConfig) -> Result<()> {
        if config.recordings_storage.as_os_str().is_empty() {
            bail!("recordings_storage cannot be empty");
        }

        if !DATABASE_TYPES.contains(&config.database_type.as_str()) {
            bail!(
                "Unknown database_type: '{}'. Supported: {}",
                config.database_type,
                DATABASE_TYPES.join(", ")
            );
        }

        if config.database_uri.is_empty() {
            bail!("database_uri cannot be empty");
        }

        if config.database_name.is_empty() {
            bail!("database_name cannot be empty");
        }

        if config.database_columns.is_empty() {
            bail!("database_columns must name at least one mandatory column");
        }

        // The unique key has to stay mandatory, everything else is caller's choice
        if !config.database_columns.iter().any(|c| c == "path") {
            bail!("database_columns must include 'path'");
        }

        if config.database_max_categories == 0 {
            bail!("database_max_categories must be > 0");
        }

        if config.metadata_file.is_empty() {
            bail!("metadata_file cannot be empty");
        }

        if config.resources_folder.contains('/') || config.resources_folder.is_empty() {
            bail!("resources_folder must be a plain subfolder name");
        }

        Ok(())
    }
}
