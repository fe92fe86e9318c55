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

// Consistency coordinator across storage and database
//
// A recording lives in two independently-owned places: the directory tree
// under the storage root and the record in the database backend. This is the
// only component allowed to mutate both for one logical operation. Storage
// moves first, database second; a completed side effect is never rolled
// back. A failed second step surfaces as `Partial` with the exact joint
// state, and the caller decides remediation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use serde_yaml::Mapping;
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::db::{DatabaseBackend, FilterPolicy};
use crate::error::{RegistryError, Result, Subsystem};
use crate::extractor::{self, Extraction};
use crate::record::{now_secs, Document, Filters, Recording};
use crate::sidecar::{field_string, SidecarManager};
use crate::storage::StorageManager;

/// Joint presence of a recording in storage and in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointState {
    Absent,
    StorageOnly,
    DatabaseOnly,
    Synced,
}

impl JointState {
    pub fn from_flags(in_storage: bool, in_database: bool) -> Self {
        match (in_storage, in_database) {
            (false, false) => JointState::Absent,
            (true, false) => JointState::StorageOnly,
            (false, true) => JointState::DatabaseOnly,
            (true, true) => JointState::Synced,
        }
    }
}

impl fmt::Display for JointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointState::Absent => write!(f, "ABSENT"),
            JointState::StorageOnly => write!(f, "STORAGE_ONLY"),
            JointState::DatabaseOnly => write!(f, "DATABASE_ONLY"),
            JointState::Synced => write!(f, "SYNCED"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    /// Also extract metadata and upsert the registry record.
    pub add_to_database: bool,
    /// Delete the local source after a successful copy.
    pub move_source: bool,
    /// Replace an existing recording tree at the destination.
    pub overwrite: bool,
}

/// Per-target reachability, reported by `connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub storage: bool,
    pub database: bool,
}

pub struct Coordinator {
    config: RegistryConfig,
    storage: StorageManager,
    sidecar: SidecarManager,
    db: Arc<dyn DatabaseBackend>,
}

impl Coordinator {
    pub fn new(config: RegistryConfig, db: Arc<dyn DatabaseBackend>) -> Self {
        let storage = StorageManager::new(
            config.recordings_storage.clone(),
            config.resources_folder.clone(),
        );
        let sidecar = SidecarManager::new(
            config.metadata_file.clone(),
            config.metadata_recorder.clone(),
        );

        Self {
            config,
            storage,
            sidecar,
            db,
        }
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn database(&self) -> &Arc<dyn DatabaseBackend> {
        &self.db
    }

    /// Copy a local recording under the storage root; with
    /// `add_to_database` also bring the registry record in sync.
    ///
    /// If the copy succeeds and the database half then fails, the copy is
    /// retained and a `Partial` failure reports the resulting
    /// `STORAGE_ONLY` state.
    pub async fn upload(&self, local_dir: &Path, options: UploadOptions) -> Result<JointState> {
        let storage_path = self.storage.put(local_dir, options.overwrite).await?;

        if options.move_source {
            self.storage.remove(local_dir).await?;
            info!("Moved local source '{}'", local_dir.display());
        }

        if !options.add_to_database {
            return Ok(JointState::StorageOnly);
        }

        match self.sync_record(&storage_path, true).await {
            Ok(()) => Ok(JointState::Synced),
            Err(e) => {
                warn!(
                    "Upload of '{}' copied storage but failed the database step: {}",
                    storage_path.display(),
                    e
                );
                Err(RegistryError::Partial {
                    path: storage_path.to_string_lossy().to_string(),
                    completed: Subsystem::Storage,
                    failed: Subsystem::Database,
                    state: JointState::StorageOnly,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Extract, regenerate the sidecar and upsert the record. Idempotent:
    /// on an already `SYNCED` path this behaves as an update.
    pub async fn add(&self, name: &str, regenerate_sidecar: bool) -> Result<JointState> {
        let dir = self.config.recording_path(name);
        self.sync_record(&dir, !regenerate_sidecar).await?;
        Ok(JointState::Synced)
    }

    /// Re-extract and upsert an already-synced recording, refreshing
    /// `time_modified`. Fails unless the recording is `SYNCED`.
    pub async fn update(&self, name: &str) -> Result<JointState> {
        let dir = self.config.recording_path(name);
        let key = key_of(&dir);

        if !self.storage.exists(&dir).await {
            return Err(RegistryError::storage_not_found(key));
        }
        if !self.db.exists(&key).await? {
            return Err(RegistryError::record_not_found(key));
        }

        self.sync_record(&dir, true).await?;
        Ok(JointState::Synced)
    }

    /// Delete the recording from storage; with `remove_record` also drop
    /// the database record.
    ///
    /// The composite form accepts any starting state: a missing storage
    /// tree or a missing record is a no-op for it, unlike the bare
    /// operations which fail with `NotFound`.
    pub async fn delete(&self, name: &str, remove_record: bool) -> Result<JointState> {
        let dir = self.config.recording_path(name);
        let key = key_of(&dir);

        if !remove_record {
            let in_database = self.db.exists(&key).await?;
            self.storage.remove(&dir).await?;
            return Ok(JointState::from_flags(false, in_database));
        }

        let mut storage_removed = false;
        if self.storage.exists(&dir).await {
            self.storage.remove(&dir).await?;
            storage_removed = true;
        }

        let database_step = async {
            if self.db.exists(&key).await? {
                self.db.delete(&key).await?;
            }
            Ok::<_, RegistryError>(())
        };

        match database_step.await {
            Ok(()) => Ok(JointState::Absent),
            Err(e) if storage_removed => Err(RegistryError::Partial {
                path: key,
                completed: Subsystem::Storage,
                failed: Subsystem::Database,
                state: JointState::DatabaseOnly,
                message: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Drop the database record only; the storage tree is untouched.
    pub async fn remove(&self, name: &str) -> Result<JointState> {
        let dir = self.config.recording_path(name);
        let key = key_of(&dir);

        self.db.delete(&key).await?;
        Ok(JointState::from_flags(
            self.storage.exists(&dir).await,
            false,
        ))
    }

    /// Report the joint state without mutating anything.
    pub async fn exist(&self, name: &str) -> Result<JointState> {
        let dir = self.config.recording_path(name);
        let key = key_of(&dir);

        Ok(JointState::from_flags(
            self.storage.exists(&dir).await,
            self.db.exists(&key).await?,
        ))
    }

    /// Verify the storage root is reachable and the backend connectable.
    pub async fn connection(&self) -> ConnectionStatus {
        ConnectionStatus {
            storage: self.storage.health_check().await,
            database: self.db.ping().await,
        }
    }

    /// Regenerate the sidecar for a recording in storage (or, with
    /// `use_local_path`, for a local directory). Returns the sidecar path.
    pub async fn metadata(
        &self,
        target: &str,
        use_local_path: bool,
        regenerate_sidecar: bool,
    ) -> Result<PathBuf> {
        let dir = if use_local_path {
            PathBuf::from(target)
        } else {
            self.config.recording_path(target)
        };

        if !self.storage.exists(&dir).await {
            return Err(RegistryError::storage_not_found(key_of(&dir)));
        }

        let extraction = extractor::extract(&dir)?;
        self.sidecar
            .generate(&dir, &extraction, !regenerate_sidecar)?;
        Ok(self.sidecar.sidecar_path(&dir))
    }

    /// Reload the registry physically sorted by a column (the configured
    /// `database_sort_by` when none is given). Returns the record count.
    pub async fn sort_database(&self, column: Option<&str>) -> Result<usize> {
        let column = match column {
            Some(c) if !c.is_empty() => c.to_string(),
            _ if !self.config.database_sort_by.is_empty() => self.config.database_sort_by.clone(),
            _ => {
                return Err(RegistryError::validation(
                    self.config.database_uri.clone(),
                    "no sort column given and database_sort_by is not configured",
                ))
            }
        };

        let docs = self.db.query(&Filters::new(), Some(&column)).await?;
        self.db.truncate().await?;
        self.db.insert_many(&docs).await?;

        info!("Reloaded {} records sorted by '{}'", docs.len(), column);
        Ok(docs.len())
    }

    /// Query pass-through for the dashboard/CLI boundary.
    pub async fn query(&self, filters: &Filters, sort_by: Option<&str>) -> Result<Vec<Document>> {
        self.db.query(filters, sort_by).await
    }

    /// Categorical-filter policy derived from configuration.
    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            no_filter: self.config.database_columns_no_filter.clone(),
            max_categories: self.config.database_max_categories,
        }
    }

    /// The shared extract + sidecar + upsert path behind `upload --add`,
    /// `add` and `update`.
    async fn sync_record(&self, recording_dir: &Path, reuse_sidecar: bool) -> Result<()> {
        let key = key_of(recording_dir);
        if !self.storage.exists(recording_dir).await {
            return Err(RegistryError::storage_not_found(key));
        }

        let extraction = extractor::extract(recording_dir)?;
        let manual = self
            .sidecar
            .generate(recording_dir, &extraction, reuse_sidecar)?;

        let now = now_secs();
        let time_added = match self.db.get(&key).await? {
            Some(existing) => existing
                .get("time_added")
                .and_then(Value::as_f64)
                .unwrap_or(now),
            None => now,
        };

        let record = assemble_record(extraction, &manual, time_added, now);
        self.db.upsert(&record.to_document()).await?;
        info!("Upserted registry record for '{}'", key);

        if !self.config.database_sort_by.is_empty() {
            self.sort_database(None).await?;
        }
        Ok(())
    }
}

fn key_of(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn assemble_record(
    extraction: Extraction,
    manual: &Mapping,
    time_added: f64,
    time_modified: f64,
) -> Recording {
    Recording {
        name: extraction.name,
        path: extraction.path.to_string_lossy().to_string(),
        start_time: extraction.start_time,
        end_time: extraction.end_time,
        duration: extraction.duration,
        description: field_string(manual, "description"),
        operator: field_string(manual, "operator"),
        vehicle: field_string(manual, "vehicle"),
        location: field_string(manual, "location"),
        size: extraction.size,
        files: extraction.files,
        file_details: extraction.file_details,
        topics: extraction.topics,
        time_added,
        time_modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_state_from_flags() {
        assert_eq!(JointState::from_flags(false, false), JointState::Absent);
        assert_eq!(JointState::from_flags(true, false), JointState::StorageOnly);
        assert_eq!(JointState::from_flags(false, true), JointState::DatabaseOnly);
        assert_eq!(JointState::from_flags(true, true), JointState::Synced);
    }

    #[test]
    fn test_joint_state_display() {
        assert_eq!(JointState::StorageOnly.to_string(), "STORAGE_ONLY");
        assert_eq!(JointState::Synced.to_string(), "SYNCED");
    }
}
