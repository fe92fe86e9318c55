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

// Recording registry for MCAP sensor logs
//
// This library keeps a searchable metadata record per recording consistent
// with the recording's directory tree on storage:
// - Extracts structural metadata (topics, counts, time range, size) from
//   MCAP containers
// - Merges it with operator-supplied sidecar metadata
// - Maintains one normalized record per recording behind a uniform
//   database contract with three interchangeable backends
// - Coordinates multi-step storage+database operations and reports partial
//   failure explicitly instead of rolling back completed side effects

pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod extractor;
pub mod record;
pub mod secrets;
pub mod sidecar;
pub mod storage;

// Re-export main types
pub use config::{load_config, load_config_with_env, RegistryConfig};
pub use coordinator::{ConnectionStatus, Coordinator, JointState, UploadOptions};
pub use db::{BackendFactory, DatabaseBackend, FilterPolicy};
pub use error::{MetadataParseError, RegistryError, Result, Subsystem};
pub use extractor::{extract, Extraction};
pub use record::{Document, Filters, Recording, TopicInfo};
pub use secrets::{Credentials, EnvSecrets, SecretsProvider, StaticSecrets};
pub use sidecar::SidecarManager;
pub use storage::StorageManager;
