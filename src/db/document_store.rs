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

// On-disk document store backend
//
// A single JSON file holding all records in insertion order. Every mutation
// is a whole-file read-modify-write; the store itself does not coordinate
// concurrent writers, so all mutations run under one write lock and land
// through an atomic tmp-file rename.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;

use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::record::{doc_path, matches_filters, sort_documents, validate_mandatory, Document, Filters};

use super::backend::DatabaseBackend;

pub struct DocumentStoreBackend {
    file_path: PathBuf,
    mandatory_columns: Vec<String>,
    write_lock: Mutex<()>,
}

impl DocumentStoreBackend {
    pub fn connect(uri: &str, mandatory_columns: Vec<String>) -> Self {
        Self {
            file_path: PathBuf::from(uri),
            mandatory_columns,
            write_lock: Mutex::new(()),
        }
    }

    fn connection_error(&self, message: impl std::fmt::Display) -> RegistryError {
        RegistryError::connection(
            "document-store",
            format!("{}: {}", self.file_path.display(), message),
        )
    }

    async fn read_docs(&self) -> Result<Vec<Document>> {
        let bytes = fs::read(&self.file_path)
            .await
            .map_err(|e| self.connection_error(e))?;

        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| self.connection_error(e))?;
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(self.connection_error(format!("non-object record: {other}"))),
                })
                .collect(),
            other => Err(self.connection_error(format!("not a record array: {other}"))),
        }
    }

    /// Caller must hold the write lock.
    async fn write_docs(&self, docs: &[Document]) -> Result<()> {
        let items: Vec<Value> = docs.iter().cloned().map(Value::Object).collect();
        let content = serde_json::to_vec_pretty(&Value::Array(items))
            .map_err(|e| self.connection_error(e))?;

        let tmp_path = self.file_path.with_extension("tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| self.connection_error(e))?;
        fs::rename(&tmp_path, &self.file_path)
            .await
            .map_err(|e| self.connection_error(e))?;

        debug!(
            "Wrote {} records to '{}'",
            docs.len(),
            self.file_path.display()
        );
        Ok(())
    }

    fn key_of(doc: &Document) -> Result<&str> {
        doc_path(doc).ok_or_else(|| {
            RegistryError::validation("<unknown>", "record has no 'path' column")
        })
    }
}

#[async_trait]
impl DatabaseBackend for DocumentStoreBackend {
    async fn initialize(&self) -> Result<()> {
        if self.file_path.exists() {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.connection_error(e))?;
        }

        info!("Creating document store at '{}'", self.file_path.display());
        let _guard = self.write_lock.lock().await;
        self.write_docs(&[]).await
    }

    async fn insert(&self, doc: &Document) -> Result<()> {
        validate_mandatory(doc, &self.mandatory_columns)?;
        let path = Self::key_of(doc)?;

        let _guard = self.write_lock.lock().await;
        let mut docs = self.read_docs().await?;
        if docs.iter().any(|d| doc_path(d) == Some(path)) {
            return Err(RegistryError::DuplicateKey {
                path: path.to_string(),
            });
        }
        docs.push(doc.clone());
        self.write_docs(&docs).await
    }

    async fn update(&self, path: &str, fields: &Document) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut docs = self.read_docs().await?;

        let target = docs
            .iter_mut()
            .find(|d| doc_path(d) == Some(path))
            .ok_or_else(|| RegistryError::record_not_found(path))?;
        for (column, value) in fields {
            target.insert(column.clone(), value.clone());
        }

        self.write_docs(&docs).await
    }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        validate_mandatory(doc, &self.mandatory_columns)?;
        let path = Self::key_of(doc)?;

        let _guard = self.write_lock.lock().await;
        let mut docs = self.read_docs().await?;
        match docs.iter_mut().find(|d| doc_path(d) == Some(path)) {
            Some(existing) => *existing = doc.clone(),
            None => docs.push(doc.clone()),
        }
        self.write_docs(&docs).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut docs = self.read_docs().await?;

        let before = docs.len();
        docs.retain(|d| doc_path(d) != Some(path));
        if docs.len() == before {
            return Err(RegistryError::record_not_found(path));
        }

        self.write_docs(&docs).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self
            .read_docs()
            .await?
            .iter()
            .any(|d| doc_path(d) == Some(path)))
    }

    async fn get(&self, path: &str) -> Result<Option<Document>> {
        Ok(self
            .read_docs()
            .await?
            .into_iter()
            .find(|d| doc_path(d) == Some(path)))
    }

    async fn query(&self, filters: &Filters, sort_by: Option<&str>) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .read_docs()
            .await?
            .into_iter()
            .filter(|d| matches_filters(d, filters))
            .collect();

        if let Some(column) = sort_by {
            sort_documents(&mut docs, column);
        }
        Ok(docs)
    }

    async fn list_columns(&self) -> Result<BTreeSet<String>> {
        let mut columns = BTreeSet::new();
        for doc in self.read_docs().await? {
            columns.extend(doc.keys().cloned());
        }
        Ok(columns)
    }

    async fn truncate(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_docs(&[]).await
    }

    async fn insert_many(&self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            validate_mandatory(doc, &self.mandatory_columns)?;
        }

        let _guard = self.write_lock.lock().await;
        let mut all = self.read_docs().await?;
        for doc in docs {
            let path = Self::key_of(doc)?;
            if all.iter().any(|d| doc_path(d) == Some(path)) {
                return Err(RegistryError::DuplicateKey {
                    path: path.to_string(),
                });
            }
            all.push(doc.clone());
        }
        self.write_docs(&all).await
    }

    async fn ping(&self) -> bool {
        self.read_docs().await.is_ok()
    }

    fn backend_type(&self) -> &str {
        "document-store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_backend() -> (DocumentStoreBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("registry.json");
        let backend = DocumentStoreBackend::connect(
            uri.to_str().unwrap(),
            vec!["name".to_string(), "path".to_string()],
        );
        (backend, dir)
    }

    fn record(name: &str, path: &str) -> Document {
        let mut doc = Document::new();
        doc.insert("name".to_string(), json!(name));
        doc.insert("path".to_string(), json!(path));
        doc
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (backend, _dir) = create_test_backend();
        backend.initialize().await.unwrap();

        backend.insert(&record("run_01", "/data/run_01")).await.unwrap();

        assert!(backend.exists("/data/run_01").await.unwrap());
        let doc = backend.get("/data/run_01").await.unwrap().unwrap();
        assert_eq!(doc["name"], json!("run_01"));
    }

    #[tokio::test]
    async fn test_insert_duplicate_path_fails() {
        let (backend, _dir) = create_test_backend();
        backend.initialize().await.unwrap();

        backend.insert(&record("run_01", "/data/run_01")).await.unwrap();
        let err = backend
            .insert(&record("run_01b", "/data/run_01"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_insert_missing_mandatory_leaves_store_unchanged() {
        let (backend, _dir) = create_test_backend();
        backend.initialize().await.unwrap();

        let mut doc = Document::new();
        doc.insert("path".to_string(), json!("/data/run_01"));

        let err = backend.insert(&doc).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(backend.query(&Filters::new(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let (backend, _dir) = create_test_backend();
        backend.initialize().await.unwrap();

        backend.insert(&record("a", "/data/a")).await.unwrap();
        backend.insert(&record("b", "/data/b")).await.unwrap();

        let mut updated = record("a", "/data/a");
        updated.insert("description".to_string(), json!("second lap"));
        backend.upsert(&updated).await.unwrap();

        let docs = backend.query(&Filters::new(), None).await.unwrap();
        assert_eq!(docs.len(), 2);
        // insertion order preserved
        assert_eq!(docs[0]["path"], json!("/data/a"));
        assert_eq!(docs[0]["description"], json!("second lap"));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let (backend, _dir) = create_test_backend();
        backend.initialize().await.unwrap();

        let err = backend
            .update("/data/run_01", &Document::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_not_found() {
        let (backend, _dir) = create_test_backend();
        backend.initialize().await.unwrap();

        backend.insert(&record("a", "/data/a")).await.unwrap();
        backend.delete("/data/a").await.unwrap();
        assert!(!backend.exists("/data/a").await.unwrap());

        let err = backend.delete("/data/a").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_filters_and_sort() {
        let (backend, _dir) = create_test_backend();
        backend.initialize().await.unwrap();

        let mut a = record("a", "/data/a");
        a.insert("operator".to_string(), json!("alice"));
        a.insert("start_time".to_string(), json!(200.0));
        let mut b = record("b", "/data/b");
        b.insert("operator".to_string(), json!("alice"));
        b.insert("start_time".to_string(), json!(100.0));
        let mut c = record("c", "/data/c");
        c.insert("operator".to_string(), json!("bob"));
        for doc in [&a, &b, &c] {
            backend.insert(doc).await.unwrap();
        }

        let mut filters = Filters::new();
        filters.insert("operator".to_string(), json!("alice"));

        let docs = backend.query(&filters, Some("start_time")).await.unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_truncate_and_insert_many() {
        let (backend, _dir) = create_test_backend();
        backend.initialize().await.unwrap();

        backend.insert(&record("a", "/data/a")).await.unwrap();
        backend.truncate().await.unwrap();

        backend
            .insert_many(&[record("b", "/data/b"), record("c", "/data/c")])
            .await
            .unwrap();

        let columns = backend.list_columns().await.unwrap();
        assert!(columns.contains("name"));
        assert_eq!(backend.query(&Filters::new(), None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ping_requires_initialized_store() {
        let (backend, _dir) = create_test_backend();
        assert!(!backend.ping().await);

        backend.initialize().await.unwrap();
        assert!(backend.ping().await);
    }
}
