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

// Wide document database backend
//
// One logical collection per configured database name, holding schemaless
// JSON documents keyed by path. The engine enforces no schema of its own;
// mandatory-column validation happens in this layer before every write.
// Scalar filters are pushed down via json_extract, ordering goes through
// the shared comparator so results match the other backends exactly.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use tracing::info;

use crate::error::{RegistryError, Result};
use crate::record::{matches_filters, sort_documents, validate_mandatory, Document, Filters};

use super::backend::DatabaseBackend;

pub struct WideDbBackend {
    conn: Mutex<Connection>,
    collection: String,
    mandatory_columns: Vec<String>,
}

impl WideDbBackend {
    pub fn connect(uri: &str, collection: &str, mandatory_columns: Vec<String>) -> Result<Self> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(RegistryError::connection(
                "wide-db",
                format!("invalid collection name '{collection}'"),
            ));
        }

        let conn = Connection::open(uri).map_err(connection_error)?;
        info!("Opened wide-db collection '{}' at '{}'", collection, uri);

        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
            mandatory_columns,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RegistryError::connection("wide-db", "connection lock poisoned"))
    }

    fn encode(doc: &Document) -> Result<String> {
        serde_json::to_string(&Value::Object(doc.clone())).map_err(connection_error)
    }

    fn decode(raw: &str) -> Result<Document> {
        match serde_json::from_str(raw).map_err(connection_error)? {
            Value::Object(map) => Ok(map),
            other => Err(RegistryError::connection(
                "wide-db",
                format!("non-object document: {other}"),
            )),
        }
    }

    fn key_of(doc: &Document) -> Result<&str> {
        crate::record::doc_path(doc).ok_or_else(|| {
            RegistryError::validation("<unknown>", "record has no 'path' column")
        })
    }

    /// All documents in insertion order, optionally narrowed by scalar
    /// filters pushed into SQL. The shared in-memory match runs afterwards
    /// in any case, so filter semantics stay identical across backends.
    fn fetch(&self, filters: &Filters) -> Result<Vec<Document>> {
        let mut clauses = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();

        for (column, value) in filters {
            let sql_value = match value {
                Value::String(s) => SqlValue::Text(s.clone()),
                Value::Number(n) => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
                Value::Bool(b) => SqlValue::Integer(*b as i64),
                _ => continue,
            };
            clauses.push(format!(
                "json_extract(doc, '$.{}') = ?{}",
                column,
                params.len() + 1
            ));
            params.push(sql_value);
        }

        let mut sql = format!("SELECT doc FROM \"{}\"", self.collection);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY rowid");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(connection_error)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                row.get::<_, String>(0)
            })
            .map_err(connection_error)?;

        let mut docs = Vec::new();
        for raw in rows {
            let doc = Self::decode(&raw.map_err(connection_error)?)?;
            if matches_filters(&doc, filters) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }
}

fn connection_error(err: impl std::fmt::Display) -> RegistryError {
    RegistryError::connection("wide-db", err.to_string())
}

#[async_trait]
impl DatabaseBackend for WideDbBackend {
    async fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (path TEXT PRIMARY KEY, doc TEXT NOT NULL)",
                self.collection
            ),
            [],
        )
        .map_err(connection_error)?;
        Ok(())
    }

    async fn insert(&self, doc: &Document) -> Result<()> {
        validate_mandatory(doc, &self.mandatory_columns)?;
        let path = Self::key_of(doc)?;
        let raw = Self::encode(doc)?;

        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO \"{}\" (path, doc) VALUES (?1, ?2)",
                self.collection
            ),
            rusqlite::params![path, raw],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(inner, _)
                if inner.code == ErrorCode::ConstraintViolation =>
            {
                RegistryError::DuplicateKey {
                    path: path.to_string(),
                }
            }
            other => connection_error(other),
        })?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Document) -> Result<()> {
        let mut doc = self
            .get(path)
            .await?
            .ok_or_else(|| RegistryError::record_not_found(path))?;
        for (column, value) in fields {
            doc.insert(column.clone(), value.clone());
        }
        let raw = Self::encode(&doc)?;

        let conn = self.lock()?;
        conn.execute(
            &format!("UPDATE \"{}\" SET doc = ?2 WHERE path = ?1", self.collection),
            rusqlite::params![path, raw],
        )
        .map_err(connection_error)?;
        Ok(())
    }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        validate_mandatory(doc, &self.mandatory_columns)?;
        let path = Self::key_of(doc)?;
        let raw = Self::encode(doc)?;

        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO \"{}\" (path, doc) VALUES (?1, ?2) \
                 ON CONFLICT(path) DO UPDATE SET doc = excluded.doc",
                self.collection
            ),
            rusqlite::params![path, raw],
        )
        .map_err(connection_error)?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                &format!("DELETE FROM \"{}\" WHERE path = ?1", self.collection),
                rusqlite::params![path],
            )
            .map_err(connection_error)?;

        if changed == 0 {
            return Err(RegistryError::record_not_found(path));
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM \"{}\" WHERE path = ?1", self.collection),
                rusqlite::params![path],
                |row| row.get(0),
            )
            .optional()
            .map_err(connection_error)?;
        Ok(found.is_some())
    }

    async fn get(&self, path: &str) -> Result<Option<Document>> {
        let raw: Option<String> = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT doc FROM \"{}\" WHERE path = ?1", self.collection),
                rusqlite::params![path],
                |row| row.get(0),
            )
            .optional()
            .map_err(connection_error)?
        };

        raw.map(|r| Self::decode(&r)).transpose()
    }

    async fn query(&self, filters: &Filters, sort_by: Option<&str>) -> Result<Vec<Document>> {
        let mut docs = self.fetch(filters)?;
        if let Some(column) = sort_by {
            sort_documents(&mut docs, column);
        }
        Ok(docs)
    }

    async fn list_columns(&self) -> Result<BTreeSet<String>> {
        let mut columns = BTreeSet::new();
        for doc in self.fetch(&Filters::new())? {
            columns.extend(doc.keys().cloned());
        }
        Ok(columns)
    }

    async fn truncate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM \"{}\"", self.collection), [])
            .map_err(connection_error)?;
        Ok(())
    }

    async fn insert_many(&self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            validate_mandatory(doc, &self.mandatory_columns)?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(connection_error)?;
        for doc in docs {
            let path = Self::key_of(doc)?;
            let raw = Self::encode(doc)?;
            tx.execute(
                &format!(
                    "INSERT INTO \"{}\" (path, doc) VALUES (?1, ?2)",
                    self.collection
                ),
                rusqlite::params![path, raw],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(inner, _)
                    if inner.code == ErrorCode::ConstraintViolation =>
                {
                    RegistryError::DuplicateKey {
                        path: path.to_string(),
                    }
                }
                other => connection_error(other),
            })?;
        }
        tx.commit().map_err(connection_error)?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.lock()
            .and_then(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(connection_error)
            })
            .is_ok()
    }

    fn backend_type(&self) -> &str {
        "wide-db"
    }
}
