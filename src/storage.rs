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

// Recording storage at the filesystem root
//
// Pure storage-side operations: copy a recording directory under the storage
// root, delete one, check presence. Database state is invisible here; the
// coordinator owns the joint view.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};

pub struct StorageManager {
    storage_root: PathBuf,
    resources_folder: String,
}

impl StorageManager {
    pub fn new(storage_root: impl Into<PathBuf>, resources_folder: impl Into<String>) -> Self {
        Self {
            storage_root: storage_root.into(),
            resources_folder: resources_folder.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.storage_root
    }

    /// Copy a recording directory under the storage root and create its
    /// resources subfolder. Returns the storage path.
    ///
    /// An existing destination is refused unless `overwrite`; replacing a
    /// recording tree is destructive and has to be asked for explicitly.
    pub async fn put(&self, local_dir: &Path, overwrite: bool) -> Result<PathBuf> {
        if !local_dir.is_dir() {
            return Err(RegistryError::storage_not_found(
                local_dir.to_string_lossy(),
            ));
        }
        if !self.storage_root.is_dir() {
            return Err(RegistryError::Storage {
                path: self.storage_root.clone(),
                message: "storage root does not exist".to_string(),
            });
        }

        let name = local_dir.file_name().ok_or_else(|| RegistryError::Storage {
            path: local_dir.to_path_buf(),
            message: "source path has no directory name".to_string(),
        })?;
        let dest = self.storage_root.join(name);

        if dest.exists() {
            if !overwrite {
                return Err(RegistryError::DuplicateKey {
                    path: dest.to_string_lossy().to_string(),
                });
            }
            warn!("Overwriting existing recording at '{}'", dest.display());
            fs::remove_dir_all(&dest)
                .await
                .map_err(|e| RegistryError::storage(&dest, e))?;
        }

        copy_tree(local_dir, &dest)
            .await
            .map_err(|e| RegistryError::storage(&dest, e))?;

        let resources = dest.join(&self.resources_folder);
        fs::create_dir_all(&resources)
            .await
            .map_err(|e| RegistryError::storage(&resources, e))?;

        info!(
            "Copied recording '{}' to '{}'",
            local_dir.display(),
            dest.display()
        );
        Ok(dest)
    }

    /// Delete a recording directory tree.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(RegistryError::storage_not_found(path.to_string_lossy()));
        }

        fs::remove_dir_all(path)
            .await
            .map_err(|e| RegistryError::storage(path, e))?;

        info!("Removed recording at '{}'", path.display());
        Ok(())
    }

    /// Pure filesystem presence check, independent of database state.
    pub async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
    }

    /// Check that the storage root is an accessible, writable directory.
    pub async fn health_check(&self) -> bool {
        match fs::metadata(&self.storage_root).await {
            Ok(metadata) if metadata.is_dir() => {
                let probe = self.storage_root.join(".registry_health_check");
                match fs::File::create(&probe).await {
                    Ok(mut f) => {
                        if let Err(e) = f.write_all(b"ok").await {
                            warn!("Health check failed - cannot write: {}", e);
                            return false;
                        }
                        let _ = fs::remove_file(&probe).await;
                        true
                    }
                    Err(e) => {
                        warn!("Health check failed - cannot create file: {}", e);
                        false
                    }
                }
            }
            Ok(_) => {
                warn!(
                    "Health check failed - storage root is not a directory: {}",
                    self.storage_root.display()
                );
                false
            }
            Err(e) => {
                warn!(
                    "Health check failed - cannot access storage root {}: {}",
                    self.storage_root.display(),
                    e
                );
                false
            }
        }
    }
}

/// Copy a directory tree without following symlinks into parent dirs.
async fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    let mut pending = vec![src.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let rel = dir.strip_prefix(src).unwrap_or(&dir);
        let target = dst.join(rel);
        fs::create_dir_all(&target).await?;

        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else {
                let to = target.join(entry.file_name());
                debug!("Copying '{}'", to.display());
                fs::copy(entry.path(), &to).await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_manager() -> (StorageManager, TempDir) {
        let root = TempDir::new().unwrap();
        let manager = StorageManager::new(root.path(), "resources");
        (manager, root)
    }

    fn create_source(name: &str) -> (TempDir, PathBuf) {
        let parent = TempDir::new().unwrap();
        let dir = parent.path().join(name);
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("run_0.mcap"), b"container bytes").unwrap();
        std::fs::create_dir(dir.join("logs")).unwrap();
        std::fs::write(dir.join("logs/launch.log"), b"started").unwrap();
        (parent, dir)
    }

    #[tokio::test]
    async fn test_put_copies_tree_and_creates_resources() {
        let (manager, _root) = create_test_manager();
        let (_parent, source) = create_source("run_01");

        let dest = manager.put(&source, false).await.unwrap();

        assert_eq!(dest, manager.root().join("run_01"));
        assert!(dest.join("run_0.mcap").exists());
        assert!(dest.join("logs/launch.log").exists());
        assert!(dest.join("resources").is_dir());
        // source untouched
        assert!(source.join("run_0.mcap").exists());
    }

    #[tokio::test]
    async fn test_put_refuses_existing_destination() {
        let (manager, _root) = create_test_manager();
        let (_parent, source) = create_source("run_01");

        manager.put(&source, false).await.unwrap();
        let err = manager.put(&source, false).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateKey { .. }));

        // with overwrite the copy goes through
        assert!(manager.put(&source, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_put_missing_source() {
        let (manager, _root) = create_test_manager();
        let err = manager
            .put(Path::new("/nonexistent/run_01"), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn test_remove_and_exists() {
        let (manager, _root) = create_test_manager();
        let (_parent, source) = create_source("run_01");

        let dest = manager.put(&source, false).await.unwrap();
        assert!(manager.exists(&dest).await);

        manager.remove(&dest).await.unwrap();
        assert!(!manager.exists(&dest).await);

        let err = manager.remove(&dest).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (manager, _root) = create_test_manager();
        assert!(manager.health_check().await);

        let missing = StorageManager::new("/nonexistent/storage-root", "resources");
        assert!(!missing.health_check().await);
    }
}
