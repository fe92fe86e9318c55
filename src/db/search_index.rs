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

// Search/index backend implementation
//
// Talks to an Elasticsearch-compatible HTTP API. Columns configured as
// no-filter are mapped as analyzed text; every other column maps to an
// exact-match type (keyword, double for the time/size columns) so term
// filtering and sorting behave identically to the embedded backends.
// Writes pass `refresh=true` so a following query observes them.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

use crate::error::{RegistryError, Result};
use crate::record::{validate_mandatory, Document, Filters};
use crate::secrets::Credentials;

use super::backend::DatabaseBackend;

/// Columns mapped as doubles instead of keywords.
const NUMERIC_COLUMNS: [&str; 6] = [
    "start_time",
    "end_time",
    "duration",
    "size",
    "time_added",
    "time_modified",
];

const QUERY_SIZE: usize = 10_000;

pub struct SearchIndexBackend {
    client: Client,
    base_url: String,
    index: String,
    credentials: Credentials,
    mandatory_columns: Vec<String>,
    no_filter_columns: Vec<String>,
}

impl SearchIndexBackend {
    pub fn connect(
        uri: &str,
        index: &str,
        credentials: Credentials,
        mandatory_columns: Vec<String>,
        no_filter_columns: Vec<String>,
    ) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RegistryError::connection("search-index", e.to_string()))?;

        Ok(Self {
            client,
            base_url: uri.trim_end_matches('/').to_string(),
            index: index.to_string(),
            credentials,
            mandatory_columns,
            no_filter_columns,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.request(method, url);

        if let Some(token) = &self.credentials.api_token {
            request = request.bearer_auth(token);
        } else if let Some(user) = &self.credentials.username {
            request = request.basic_auth(user, self.credentials.password.as_deref());
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::connection("search-index", e.to_string()))?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(RegistryError::connection(
                "search-index",
                format!("authentication rejected ({})", response.status()),
            ));
        }
        Ok(response)
    }

    async fn unexpected(&self, response: reqwest::Response) -> RegistryError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        RegistryError::connection(
            "search-index",
            format!("unexpected status {status}: {body}"),
        )
    }

    fn doc_url(&self, segment: &str, path: &str) -> String {
        format!(
            "{}/{}/{}?refresh=true",
            self.index,
            segment,
            doc_id(path)
        )
    }
}

/// Document id for a storage path, safe inside one URL segment.
pub fn doc_id(path: &str) -> String {
    urlencoding::encode(path).into_owned()
}

/// Index mapping: no-filter columns analyzed, the rest exact-match.
/// Unlisted string columns fall to keyword via a dynamic template.
pub fn build_mapping(mandatory_columns: &[String], no_filter_columns: &[String]) -> Value {
    let mut properties = serde_json::Map::new();

    let mut columns: BTreeSet<&str> = mandatory_columns.iter().map(String::as_str).collect();
    columns.extend(no_filter_columns.iter().map(String::as_str));
    columns.extend(NUMERIC_COLUMNS);

    for column in columns {
        let mapping = if no_filter_columns.iter().any(|c| c == column) {
            json!({ "type": "text" })
        } else if NUMERIC_COLUMNS.contains(&column) {
            json!({ "type": "double" })
        } else {
            json!({ "type": "keyword" })
        };
        properties.insert(column.to_string(), mapping);
    }

    json!({
        "mappings": {
            "dynamic_templates": [{
                "strings_as_keywords": {
                    "match_mapping_type": "string",
                    "mapping": { "type": "keyword" }
                }
            }],
            "properties": properties
        }
    })
}

/// Search body: term filters plus optional single-column ascending sort
/// with missing values first, matching the shared comparator.
pub fn build_query(filters: &Filters, sort_by: Option<&str>) -> Value {
    let query = if filters.is_empty() {
        json!({ "match_all": {} })
    } else {
        let terms: Vec<Value> = filters
            .iter()
            .map(|(column, value)| json!({ "term": { column: { "value": value } } }))
            .collect();
        json!({ "bool": { "filter": terms } })
    };

    let mut body = json!({ "size": QUERY_SIZE, "query": query });
    if let Some(column) = sort_by {
        body["sort"] = json!([{
            column: { "order": "asc", "missing": "_first", "unmapped_type": "keyword" }
        }]);
    }
    body
}

#[async_trait]
impl DatabaseBackend for SearchIndexBackend {
    async fn initialize(&self) -> Result<()> {
        let head = self.send(self.request(Method::HEAD, &self.index)).await?;
        if head.status().is_success() {
            info!("Index '{}' already exists", self.index);
            return Ok(());
        }

        info!("Creating index '{}'", self.index);
        let mapping = build_mapping(&self.mandatory_columns, &self.no_filter_columns);
        let response = self
            .send(self.request(Method::PUT, &self.index).json(&mapping))
            .await?;

        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(RegistryError::connection(
            "search-index",
            format!("failed to create index: {status} - {body}"),
        ))
    }

    async fn insert(&self, doc: &Document) -> Result<()> {
        validate_mandatory(doc, &self.mandatory_columns)?;
        let path = crate::record::doc_path(doc).ok_or_else(|| {
            RegistryError::validation("<unknown>", "record has no 'path' column")
        })?;

        let url = self.doc_url("_create", path);
        let response = self.send(self.request(Method::PUT, &url).json(doc)).await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(RegistryError::DuplicateKey {
                path: path.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(self.unexpected(response).await);
        }
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Document) -> Result<()> {
        let url = self.doc_url("_update", path);
        let body = json!({ "doc": fields });
        let response = self.send(self.request(Method::POST, &url).json(&body)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::record_not_found(path));
        }
        if !response.status().is_success() {
            return Err(self.unexpected(response).await);
        }
        Ok(())
    }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        validate_mandatory(doc, &self.mandatory_columns)?;
        let path = crate::record::doc_path(doc).ok_or_else(|| {
            RegistryError::validation("<unknown>", "record has no 'path' column")
        })?;

        let url = self.doc_url("_doc", path);
        let response = self.send(self.request(Method::PUT, &url).json(doc)).await?;
        if !response.status().is_success() {
            return Err(self.unexpected(response).await);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.doc_url("_doc", path);
        let response = self.send(self.request(Method::DELETE, &url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::record_not_found(path));
        }
        if !response.status().is_success() {
            return Err(self.unexpected(response).await);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let url = format!("{}/_doc/{}", self.index, doc_id(path));
        let response = self.send(self.request(Method::HEAD, &url)).await?;
        Ok(response.status().is_success())
    }

    async fn get(&self, path: &str) -> Result<Option<Document>> {
        let url = format!("{}/_doc/{}", self.index, doc_id(path));
        let response = self.send(self.request(Method::GET, &url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.unexpected(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::connection("search-index", e.to_string()))?;
        match body.get("_source") {
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            _ => Ok(None),
        }
    }

    async fn query(&self, filters: &Filters, sort_by: Option<&str>) -> Result<Vec<Document>> {
        let url = format!("{}/_search", self.index);
        let body = build_query(filters, sort_by);
        let response = self.send(self.request(Method::POST, &url).json(&body)).await?;

        if !response.status().is_success() {
            return Err(self.unexpected(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::connection("search-index", e.to_string()))?;

        let hits = body["hits"]["hits"].as_array().cloned().unwrap_or_default();
        Ok(hits
            .into_iter()
            .filter_map(|hit| match hit.get("_source") {
                Some(Value::Object(map)) => Some(map.clone()),
                _ => None,
            })
            .collect())
    }

    async fn list_columns(&self) -> Result<BTreeSet<String>> {
        let url = format!("{}/_mapping", self.index);
        let response = self.send(self.request(Method::GET, &url)).await?;

        if !response.status().is_success() {
            return Err(self.unexpected(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::connection("search-index", e.to_string()))?;

        let mut columns = BTreeSet::new();
        if let Some(index_body) = body.as_object().and_then(|m| m.values().next()) {
            if let Some(properties) = index_body["mappings"]["properties"].as_object() {
                columns.extend(properties.keys().cloned());
            }
        }
        Ok(columns)
    }

    async fn truncate(&self) -> Result<()> {
        let url = format!("{}/_delete_by_query?refresh=true", self.index);
        let body = json!({ "query": { "match_all": {} } });
        let response = self.send(self.request(Method::POST, &url).json(&body)).await?;

        if !response.status().is_success() {
            return Err(self.unexpected(response).await);
        }
        Ok(())
    }

    async fn insert_many(&self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            self.insert(doc).await?;
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        match self.send(self.request(Method::GET, "")).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn backend_type(&self) -> &str {
        "search-index"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_doc_id_is_single_segment() {
        let id = doc_id("/data/recordings/run_01");
        assert!(!id.contains('/'));
        assert_eq!(id, "%2Fdata%2Frecordings%2Frun_01");
    }

    #[test]
    fn test_mapping_text_vs_keyword_vs_double() {
        let mapping = build_mapping(
            &columns(&["name", "path", "start_time"]),
            &columns(&["description"]),
        );

        let properties = &mapping["mappings"]["properties"];
        assert_eq!(properties["description"]["type"], json!("text"));
        assert_eq!(properties["name"]["type"], json!("keyword"));
        assert_eq!(properties["path"]["type"], json!("keyword"));
        assert_eq!(properties["start_time"]["type"], json!("double"));
        // unlisted string columns become keywords, not analyzed text
        let template = &mapping["mappings"]["dynamic_templates"][0]["strings_as_keywords"];
        assert_eq!(template["mapping"]["type"], json!("keyword"));
    }

    #[test]
    fn test_query_body_match_all_without_filters() {
        let body = build_query(&Filters::new(), None);
        assert_eq!(body["query"], json!({ "match_all": {} }));
        assert!(body.get("sort").is_none());
    }

    #[test]
    fn test_query_body_terms_and_sort() {
        let mut filters = Filters::new();
        filters.insert("operator".to_string(), json!("alice"));

        let body = build_query(&filters, Some("start_time"));
        assert_eq!(
            body["query"]["bool"]["filter"][0],
            json!({ "term": { "operator": { "value": "alice" } } })
        );
        assert_eq!(body["sort"][0]["start_time"]["order"], json!("asc"));
        assert_eq!(body["sort"][0]["start_time"]["missing"], json!("_first"));
    }

    #[test]
    fn test_connect_builds_client() {
        let backend = SearchIndexBackend::connect(
            "http://localhost:9200/",
            "recordings",
            Credentials::default(),
            columns(&["name", "path"]),
            columns(&["description"]),
        )
        .unwrap();
        assert_eq!(backend.backend_type(), "search-index");
        assert_eq!(backend.base_url, "http://localhost:9200");
    }
}
