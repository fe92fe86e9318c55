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

// Sidecar metadata file management
//
// The sidecar is the human-authored YAML file co-located with a recording.
// It holds only the manual fields (`metadata_recorder` config) that cannot
// be derived from the container; extracted structural fields live solely in
// the database. Unknown keys survive every rewrite verbatim.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::extractor::Extraction;

pub struct SidecarManager {
    file_name: String,
    manual_fields: Vec<String>,
}

impl SidecarManager {
    pub fn new(file_name: impl Into<String>, manual_fields: Vec<String>) -> Self {
        Self {
            file_name: file_name.into(),
            manual_fields,
        }
    }

    pub fn sidecar_path(&self, recording_dir: &Path) -> PathBuf {
        recording_dir.join(&self.file_name)
    }

    /// Manual-field subset of the sidecar. A missing file is not an error:
    /// every manual field comes back as its empty default.
    pub fn load(&self, recording_dir: &Path) -> Result<Mapping> {
        let existing = self.read_existing(recording_dir)?;
        Ok(self.manual_subset(existing.as_ref(), None, true))
    }

    /// Rewrite the sidecar in full and return the manual-field subset.
    ///
    /// With `reuse` the existing manual fields are kept as-is; without it
    /// they reset to defaults for the operator to re-supply. The recording
    /// name is always re-derived from the extraction, and unknown keys are
    /// carried over in their original order. Repeated generation with an
    /// unchanged directory produces byte-identical output.
    pub fn generate(
        &self,
        recording_dir: &Path,
        extraction: &Extraction,
        reuse: bool,
    ) -> Result<Mapping> {
        let existing = self.read_existing(recording_dir)?;
        let manual = self.manual_subset(existing.as_ref(), Some(&extraction.name), reuse);

        let mut full = manual.clone();
        if let Some(existing) = &existing {
            for (key, value) in existing {
                let known = key
                    .as_str()
                    .is_some_and(|k| self.manual_fields.iter().any(|f| f == k));
                if !known {
                    full.insert(key.clone(), value.clone());
                }
            }
        }

        let path = self.sidecar_path(recording_dir);
        let content = serde_yaml::to_string(&full).map_err(|e| {
            RegistryError::validation(path.to_string_lossy(), format!("sidecar serialize: {e}"))
        })?;
        std::fs::write(&path, content).map_err(|e| RegistryError::storage(&path, e))?;

        debug!("Rewrote sidecar '{}'", path.display());
        Ok(manual)
    }

    fn read_existing(&self, recording_dir: &Path) -> Result<Option<Mapping>> {
        let path = self.sidecar_path(recording_dir);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| RegistryError::storage(&path, e))?;
        let mapping: Mapping = serde_yaml::from_str(&content).map_err(|e| {
            RegistryError::validation(path.to_string_lossy(), format!("invalid sidecar: {e}"))
        })?;
        Ok(Some(mapping))
    }

    fn manual_subset(&self, existing: Option<&Mapping>, name: Option<&str>, reuse: bool) -> Mapping {
        let mut subset = Mapping::new();
        for field in &self.manual_fields {
            let key = Value::String(field.clone());
            let value = if field == "name" {
                match name {
                    Some(name) => Value::String(name.to_string()),
                    None => existing
                        .and_then(|m| m.get(&key).cloned())
                        .unwrap_or_else(|| Value::String(String::new())),
                }
            } else if reuse {
                existing
                    .and_then(|m| m.get(&key).cloned())
                    .unwrap_or_else(|| Value::String(String::new()))
            } else {
                Value::String(String::new())
            };
            subset.insert(key, value);
        }
        subset
    }
}

/// String form of one sidecar field, tolerant of hand-edited scalar types.
pub fn field_string(mapping: &Mapping, key: &str) -> String {
    match mapping.get(&Value::String(key.to_string())) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> SidecarManager {
        SidecarManager::new(
            "recording.yaml",
            ["name", "description", "operator", "vehicle", "location"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    fn extraction(dir: &Path) -> Extraction {
        Extraction {
            name: dir.file_name().unwrap().to_string_lossy().to_string(),
            path: dir.to_path_buf(),
            start_time: 0.0,
            end_time: 0.0,
            duration: 0.0,
            size: 0,
            files: vec![],
            file_details: vec![],
            topics: vec![],
        }
    }

    #[test]
    fn test_load_absent_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let manual = manager().load(dir.path()).unwrap();

        assert_eq!(manual.len(), 5);
        assert_eq!(field_string(&manual, "operator"), "");
    }

    #[test]
    fn test_generate_creates_and_reuses_manual_fields() {
        let dir = TempDir::new().unwrap();
        let manager = manager();

        manager.generate(dir.path(), &extraction(dir.path()), true).unwrap();
        std::fs::write(
            manager.sidecar_path(dir.path()),
            "name: old\ndescription: lap two\noperator: alice\n",
        )
        .unwrap();

        let manual = manager.generate(dir.path(), &extraction(dir.path()), true).unwrap();
        assert_eq!(field_string(&manual, "description"), "lap two");
        assert_eq!(field_string(&manual, "operator"), "alice");
        // name always re-derived from the recording directory
        assert_eq!(
            field_string(&manual, "name"),
            dir.path().file_name().unwrap().to_string_lossy()
        );
    }

    #[test]
    fn test_generate_without_reuse_resets_manual_fields() {
        let dir = TempDir::new().unwrap();
        let manager = manager();

        std::fs::write(
            manager.sidecar_path(dir.path()),
            "description: keep me not\noperator: alice\n",
        )
        .unwrap();

        let manual = manager.generate(dir.path(), &extraction(dir.path()), false).unwrap();
        assert_eq!(field_string(&manual, "description"), "");
        assert_eq!(field_string(&manual, "operator"), "");
    }

    #[test]
    fn test_generate_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let manager = manager();

        std::fs::write(
            manager.sidecar_path(dir.path()),
            "operator: alice\nweather: overcast\ncalibration_id: 42\n",
        )
        .unwrap();

        manager.generate(dir.path(), &extraction(dir.path()), true).unwrap();
        let content = std::fs::read_to_string(manager.sidecar_path(dir.path())).unwrap();
        assert!(content.contains("weather: overcast"));
        assert!(content.contains("calibration_id: 42"));
    }

    #[test]
    fn test_generate_twice_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let manager = manager();

        std::fs::write(
            manager.sidecar_path(dir.path()),
            "operator: alice\nweather: overcast\n",
        )
        .unwrap();

        manager.generate(dir.path(), &extraction(dir.path()), true).unwrap();
        let first = std::fs::read(manager.sidecar_path(dir.path())).unwrap();
        manager.generate(dir.path(), &extraction(dir.path()), true).unwrap();
        let second = std::fs::read(manager.sidecar_path(dir.path())).unwrap();

        assert_eq!(first, second);
    }
}
