// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for the recording registry

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported values of `database_type`.
pub const DATABASE_TYPES: [&str; 3] = ["document-store", "search-index", "wide-db"];

/// Main configuration structure, one flat YAML file.
///
/// Constructed once at startup and passed by reference into the coordinator
/// and backends; there is no ambient global.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Root directory all recordings are stored under.
    pub recordings_storage: PathBuf,

    /// Subfolder created inside each recording for derived artifacts.
    #[serde(default = "default_resources_folder")]
    pub resources_folder: String,

    /// Backend type: "document-store", "search-index" or "wide-db".
    pub database_type: String,

    /// Backend connection target: file path for the embedded backends,
    /// base URL for the search index. Credentials never go here.
    pub database_uri: String,

    /// Index/collection name for backends that have one.
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Mandatory columns; a record missing any of these is rejected.
    #[serde(default = "default_database_columns")]
    pub database_columns: Vec<String>,

    /// Column the registry is kept sorted by; empty = backend default order.
    #[serde(default)]
    pub database_sort_by: String,

    /// Free-text columns excluded from categorical filtering. The search
    /// index maps these as analyzed text instead of exact-match keywords.
    #[serde(default)]
    pub database_columns_no_filter: Vec<String>,

    /// Cardinality ceiling above which a column stops contributing
    /// categorical-filter metadata.
    #[serde(default = "default_max_categories")]
    pub database_max_categories: usize,

    /// Manual metadata fields the operator records per recording.
    #[serde(default = "default_metadata_recorder")]
    pub metadata_recorder: Vec<String>,

    /// Sidecar metadata file name, co-located with each recording.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl RegistryConfig {
    /// Absolute path of a recording identified by name.
    pub fn recording_path(&self, name: &str) -> PathBuf {
        self.recordings_storage.join(name)
    }
}

// Default value functions
fn default_resources_folder() -> String {
    "resources".to_string()
}
fn default_database_name() -> String {
    "recordings".to_string()
}
fn default_database_columns() -> Vec<String> {
    ["name", "path", "start_time", "end_time", "duration", "size"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_categories() -> usize {
    30
}
fn default_metadata_recorder() -> Vec<String> {
    ["name", "description", "operator", "vehicle", "location"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_metadata_file() -> String {
    "recording.yaml".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
