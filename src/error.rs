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

// Typed error taxonomy for the registry engine

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::coordinator::JointState;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// The half of a multi-step operation that a `Partial` failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Storage,
    Database,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Storage => write!(f, "storage"),
            Subsystem::Database => write!(f, "database"),
        }
    }
}

/// What a `NotFound` failure targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundTarget {
    StorageObject,
    Record,
}

impl fmt::Display for NotFoundTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundTarget::StorageObject => write!(f, "storage object"),
            NotFoundTarget::Record => write!(f, "database record"),
        }
    }
}

/// Container extraction failures.
///
/// A directory with zero container files is its own variant so callers can
/// distinguish "nothing to parse" from "could not parse".
#[derive(Debug, Error)]
pub enum MetadataParseError {
    #[error("no container found in '{}'", .0.display())]
    NoContainer(PathBuf),

    #[error("unreadable container '{}': {message}", path.display())]
    Unreadable { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("storage error at '{}': {message}", path.display())]
    Storage { path: PathBuf, message: String },

    #[error("{backend} backend connection failed: {message}")]
    Connection { backend: String, message: String },

    #[error("validation failed for '{path}': {message}")]
    Validation { path: String, message: String },

    #[error("record already exists at '{path}'")]
    DuplicateKey { path: String },

    #[error("{target} not found: '{path}'")]
    NotFound { target: NotFoundTarget, path: String },

    #[error(transparent)]
    MetadataParse(#[from] MetadataParseError),

    #[error(
        "partial failure for '{path}': {completed} step succeeded, {failed} step failed \
         (state is now {state}): {message}"
    )]
    Partial {
        path: String,
        completed: Subsystem,
        failed: Subsystem,
        state: JointState,
        message: String,
    },
}

impl RegistryError {
    pub fn storage(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        RegistryError::Storage {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn connection(backend: &str, message: impl Into<String>) -> Self {
        RegistryError::Connection {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        RegistryError::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn storage_not_found(path: impl Into<String>) -> Self {
        RegistryError::NotFound {
            target: NotFoundTarget::StorageObject,
            path: path.into(),
        }
    }

    pub fn record_not_found(path: impl Into<String>) -> Self {
        RegistryError::NotFound {
            target: NotFoundTarget::Record,
            path: path.into(),
        }
    }

    /// Stable failure-kind tag used in CLI output and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Storage { .. } => "storage",
            RegistryError::Connection { .. } => "connection",
            RegistryError::Validation { .. } | RegistryError::DuplicateKey { .. } => "validation",
            RegistryError::NotFound { .. } => "not-found",
            RegistryError::MetadataParse(_) => "metadata-parse",
            RegistryError::Partial { .. } => "partial-failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_container_is_distinct() {
        let err = MetadataParseError::NoContainer(PathBuf::from("/data/rec"));
        assert!(matches!(err, MetadataParseError::NoContainer(_)));
        assert!(err.to_string().contains("no container found"));
    }

    #[test]
    fn test_partial_failure_names_both_halves() {
        let err = RegistryError::Partial {
            path: "/data/rec".to_string(),
            completed: Subsystem::Storage,
            failed: Subsystem::Database,
            state: JointState::StorageOnly,
            message: "insert refused".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("storage step succeeded"));
        assert!(text.contains("database step failed"));
        assert!(text.contains("STORAGE_ONLY"));
        assert_eq!(err.kind(), "partial-failure");
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(
            RegistryError::DuplicateKey { path: "p".into() }.kind(),
            "validation"
        );
        assert_eq!(RegistryError::record_not_found("p").kind(), "not-found");
        let parse: RegistryError = MetadataParseError::NoContainer(PathBuf::from("p")).into();
        assert_eq!(parse.kind(), "metadata-parse");
    }
}
