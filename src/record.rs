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

// Recording record model and the query semantics shared by all backends

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RegistryError, Result};

/// Schemaless representation of a record as it crosses the backend boundary.
pub type Document = serde_json::Map<String, Value>;

/// Equality filters applied by `query`, keyed by column name.
pub type Filters = BTreeMap<String, Value>;

/// Per-topic structural facts accumulated from the container channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub count: u64,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub frequency: f64,
}

/// Per-file stats for one container file of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDetails {
    pub path: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub size: u64,
}

/// One normalized registry record. Identity is the storage `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub name: String,
    pub path: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub vehicle: String,
    #[serde(default)]
    pub location: String,
    pub size: u64,
    pub files: Vec<String>,
    pub file_details: Vec<FileDetails>,
    pub topics: Vec<TopicInfo>,
    pub time_added: f64,
    pub time_modified: f64,
}

impl Recording {
    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        serde_json::from_value(Value::Object(doc.clone())).map_err(|e| {
            RegistryError::validation(
                doc_path(doc).unwrap_or("<unknown>"),
                format!("malformed record: {e}"),
            )
        })
    }
}

/// Current UNIX time in fractional seconds.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 * 1e-6
}

/// The unique key of a document, if present.
pub fn doc_path(doc: &Document) -> Option<&str> {
    doc.get("path").and_then(Value::as_str)
}

/// Mandatory-column invariant: every configured column present and non-null.
///
/// Runs before any insert/upsert in every backend. Absence is a validation
/// failure, never a default-filled gap.
pub fn validate_mandatory(doc: &Document, columns: &[String]) -> Result<()> {
    let missing: Vec<&str> = columns
        .iter()
        .filter(|col| matches!(doc.get(col.as_str()), None | Some(Value::Null)))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::validation(
            doc_path(doc).unwrap_or("<unknown>"),
            format!("missing mandatory columns: {}", missing.join(", ")),
        ))
    }
}

/// Equality match of a document against column filters.
/// A document without the column never matches.
pub fn matches_filters(doc: &Document, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(col, expected)| doc.get(col) == Some(expected))
}

/// Total order over optional JSON values used for `sort_by` in every backend.
///
/// Missing and null sort first, then booleans, numbers, strings; composite
/// values compare by their serialized form. Keeping this in one place is what
/// makes the three backends return identical orderings.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (a, b) if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        _ => Ordering::Equal,
    }
}

/// Stable ascending sort by one column.
pub fn sort_documents(docs: &mut [Document], sort_by: &str) {
    docs.sort_by(|a, b| compare_values(a.get(sort_by), b.get(sort_by)));
}
