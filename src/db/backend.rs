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

// Database backend trait for the recording registry

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::Result;
use crate::record::{compare_values, Document, Filters};

/// Which columns participate in categorical-filter metadata.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    /// Free-text columns that never filter categorically.
    pub no_filter: Vec<String>,
    /// Cardinality ceiling; columns with more distinct values are dropped
    /// from the metadata (storage is unaffected).
    pub max_categories: usize,
}

/// Uniform contract implemented by every registry backend
///
/// All backends key records by their `path` column and must agree on
/// `query`/`sort_by`/`exists` results for identical record sets; ordering
/// semantics live in [`crate::record::sort_documents`] so the agreement is
/// structural, not incidental.
///
/// Mandatory-column validation happens in the backend layer before any
/// insert/upsert, never in the underlying engine.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Initialize the backend (create file/index/collection if needed)
    async fn initialize(&self) -> Result<()>;

    /// Strict insert; fails with `DuplicateKey` if the path is present and
    /// with `Validation` if a mandatory column is missing or null.
    async fn insert(&self, doc: &Document) -> Result<()>;

    /// Merge `fields` into the record at `path`; `NotFound` if absent.
    async fn update(&self, path: &str, fields: &Document) -> Result<()>;

    /// Insert-or-replace by path.
    async fn upsert(&self, doc: &Document) -> Result<()>;

    /// Remove the record at `path`; `NotFound` if absent.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Presence check by path.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Fetch one record by path.
    async fn get(&self, path: &str) -> Result<Option<Document>>;

    /// Equality-filtered query. `sort_by = None` means backend-default
    /// order (insertion order for the document store).
    async fn query(&self, filters: &Filters, sort_by: Option<&str>) -> Result<Vec<Document>>;

    /// Union of columns currently present across all records.
    async fn list_columns(&self) -> Result<BTreeSet<String>>;

    /// Clear every record.
    async fn truncate(&self) -> Result<()>;

    /// Bulk strict insert, used to reload the registry in sorted order.
    async fn insert_many(&self, docs: &[Document]) -> Result<()>;

    /// Backend reachability check
    async fn ping(&self) -> bool;

    /// Get backend type identifier
    fn backend_type(&self) -> &str;

    /// Per-column distinct values driving dashboard filter construction.
    /// Exposed, not consumed, by this engine.
    async fn filter_metadata(&self, policy: &FilterPolicy) -> Result<BTreeMap<String, Vec<Value>>> {
        let docs = self.query(&Filters::new(), None).await?;
        Ok(collect_filter_metadata(&docs, policy))
    }
}

/// Distinct scalar values per column, honoring the filter policy.
///
/// Composite values (lists, objects) never filter categorically. A column
/// whose cardinality exceeds `max_categories` is dropped entirely.
pub fn collect_filter_metadata(
    docs: &[Document],
    policy: &FilterPolicy,
) -> BTreeMap<String, Vec<Value>> {
    let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    for doc in docs {
        for (column, value) in doc {
            if policy.no_filter.iter().any(|c| c == column) {
                continue;
            }
            if matches!(value, Value::Array(_) | Value::Object(_) | Value::Null) {
                continue;
            }
            let values = columns.entry(column.clone()).or_default();
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
    }

    columns.retain(|_, values| values.len() <= policy.max_categories);
    for values in columns.values_mut() {
        values.sort_by(|a, b| compare_values(Some(a), Some(b)));
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(operator: &str, size: u64) -> Document {
        let mut d = Document::new();
        d.insert("operator".to_string(), json!(operator));
        d.insert("size".to_string(), json!(size));
        d.insert("topics".to_string(), json!([{ "name": "/gps" }]));
        d
    }

    #[test]
    fn test_filter_metadata_distinct_sorted() {
        let docs = vec![doc("bob", 2), doc("alice", 1), doc("alice", 3)];
        let policy = FilterPolicy {
            no_filter: vec![],
            max_categories: 10,
        };

        let metadata = collect_filter_metadata(&docs, &policy);
        assert_eq!(metadata["operator"], vec![json!("alice"), json!("bob")]);
        assert_eq!(metadata["size"], vec![json!(1), json!(2), json!(3)]);
        // composite columns never filter categorically
        assert!(!metadata.contains_key("topics"));
    }

    #[test]
    fn test_filter_metadata_honors_no_filter_and_cardinality() {
        let docs = vec![doc("a", 1), doc("b", 2), doc("c", 3)];
        let policy = FilterPolicy {
            no_filter: vec!["operator".to_string()],
            max_categories: 2,
        };

        let metadata = collect_filter_metadata(&docs, &policy);
        assert!(!metadata.contains_key("operator"));
        // three distinct sizes exceed the category ceiling of two
        assert!(!metadata.contains_key("size"));
    }
}
