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

// Backend factory for creating database backends from configuration

use super::backend::DatabaseBackend;
use super::document_store::DocumentStoreBackend;
use super::search_index::SearchIndexBackend;
use super::wide_db::WideDbBackend;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::secrets::SecretsProvider;
use std::sync::Arc;

pub struct BackendFactory;

impl BackendFactory {
    /// Create a database backend from configuration
    ///
    /// The backend set is compile-time-known; `database_type` only selects
    /// among the variants. Credentials come from the injected secrets
    /// provider, never from the URI.
    pub fn create(
        config: &RegistryConfig,
        secrets: &dyn SecretsProvider,
    ) -> Result<Arc<dyn DatabaseBackend>> {
        match config.database_type.as_str() {
            "document-store" => Ok(Arc::new(DocumentStoreBackend::connect(
                &config.database_uri,
                config.database_columns.clone(),
            ))),

            "search-index" => {
                let backend = SearchIndexBackend::connect(
                    &config.database_uri,
                    &config.database_name,
                    secrets.credentials(),
                    config.database_columns.clone(),
                    config.database_columns_no_filter.clone(),
                )?;
                Ok(Arc::new(backend))
            }

            "wide-db" => {
                let backend = WideDbBackend::connect(
                    &config.database_uri,
                    &config.database_name,
                    config.database_columns.clone(),
                )?;
                Ok(Arc::new(backend))
            }

            unknown => Err(RegistryError::connection(
                unknown,
                "unsupported database_type (supported: document-store, search-index, wide-db)",
            )),
        }
    }
}
