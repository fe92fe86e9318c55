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

// Database backend module
//
// Provides a trait-based abstraction over the registry database, with three
// interchangeable implementations behind one CRUD/query contract:
// document-store (single JSON file), search-index (Elasticsearch-compatible
// HTTP API) and wide-db (embedded document collection).
//
// All backends must agree on query/sort/exists results for identical
// record sets; that equivalence is the module's correctness contract.

pub mod backend;
pub mod document_store;
pub mod factory;
pub mod search_index;
pub mod wide_db;

pub use backend::{collect_filter_metadata, DatabaseBackend, FilterPolicy};
pub use document_store::DocumentStoreBackend;
pub use factory::BackendFactory;
pub use search_index::SearchIndexBackend;
pub use wide_db::WideDbBackend;
