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

/// Structural metadata extraction from MCAP recording directories
///
/// Given a recording directory, reads every container file and derives a
/// structural summary without mutating anything:
///
/// - per-topic name, message type, message count, time range and frequency
/// - recording time range from the min/max message `log_time` observed
///   across all channels (file-level metadata is not trusted)
/// - total on-disk size and the lexically ordered file list
///
/// Timestamps are fractional UNIX seconds (`log_time` nanoseconds / 1e9).
/// Re-extraction of an unmodified directory is deterministic.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mcap::MessageStream;
use tracing::debug;

use crate::error::MetadataParseError;
use crate::record::{FileDetails, TopicInfo};

const CONTAINER_EXTENSION: &str = "mcap";

/// Structural facts derived from one recording directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub name: String,
    pub path: PathBuf,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub size: u64,
    pub files: Vec<String>,
    pub file_details: Vec<FileDetails>,
    pub topics: Vec<TopicInfo>,
}

#[derive(Default)]
struct TopicAcc {
    message_type: String,
    count: u64,
    start_time: Option<f64>,
    end_time: Option<f64>,
}

/// Extract the structural summary of a recording directory.
///
/// # Errors
///
/// - [`MetadataParseError::NoContainer`] when the directory holds zero
///   `.mcap` files (distinct from a recording with zero messages, which
///   succeeds with empty `topics` and `duration = 0`).
/// - [`MetadataParseError::Unreadable`] when the directory or a container
///   cannot be read or fails to parse.
pub fn extract(recording_dir: &Path) -> Result<Extraction, MetadataParseError> {
    let name = recording_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let all_files = walk_files(recording_dir)?;
    let container_files: Vec<&(String, u64)> = all_files
        .iter()
        .filter(|(rel, _)| {
            !rel.contains('/')
                && Path::new(rel).extension().and_then(|e| e.to_str()) == Some(CONTAINER_EXTENSION)
        })
        .collect();

    if container_files.is_empty() {
        return Err(MetadataParseError::NoContainer(recording_dir.to_path_buf()));
    }

    let mut topics: BTreeMap<String, TopicAcc> = BTreeMap::new();
    let mut file_details = Vec::with_capacity(container_files.len());
    let mut start_time: Option<f64> = None;
    let mut end_time: Option<f64> = None;

    for (rel, size) in &container_files {
        let file_path = recording_dir.join(rel);
        let (file_start, file_end) = scan_container(&file_path, &mut topics)?;

        debug!(
            "Scanned container '{}': {} topics so far",
            file_path.display(),
            topics.len()
        );

        start_time = merge_min(start_time, file_start);
        end_time = merge_max(end_time, file_end);

        let (fs, fe) = (file_start.unwrap_or(0.0), file_end.unwrap_or(0.0));
        file_details.push(FileDetails {
            path: rel.clone(),
            start_time: fs,
            end_time: fe,
            duration: (fe - fs).max(0.0),
            size: *size,
        });
    }

    let (start_time, end_time) = (start_time.unwrap_or(0.0), end_time.unwrap_or(0.0));
    let topics = topics
        .into_iter()
        .map(|(name, acc)| {
            let (ts, te) = (acc.start_time.unwrap_or(0.0), acc.end_time.unwrap_or(0.0));
            let duration = (te - ts).max(0.0);
            TopicInfo {
                name,
                message_type: acc.message_type,
                count: acc.count,
                start_time: ts,
                end_time: te,
                duration,
                frequency: if duration > 0.0 {
                    acc.count as f64 / duration
                } else {
                    0.0
                },
            }
        })
        .collect();

    Ok(Extraction {
        name,
        path: recording_dir.to_path_buf(),
        start_time,
        end_time,
        duration: (end_time - start_time).max(0.0),
        size: all_files.iter().map(|(_, size)| size).sum(),
        files: all_files.into_iter().map(|(rel, _)| rel).collect(),
        file_details,
        topics,
    })
}

/// Stream every message of one container, folding counts and time bounds
/// into the per-topic accumulators. Returns the file's own time bounds.
fn scan_container(
    file_path: &Path,
    topics: &mut BTreeMap<String, TopicAcc>,
) -> Result<(Option<f64>, Option<f64>), MetadataParseError> {
    let unreadable = |message: String| MetadataParseError::Unreadable {
        path: file_path.to_path_buf(),
        message,
    };

    let bytes = std::fs::read(file_path).map_err(|e| unreadable(e.to_string()))?;
    let stream = MessageStream::new(&bytes).map_err(|e| unreadable(e.to_string()))?;

    let mut file_start: Option<f64> = None;
    let mut file_end: Option<f64> = None;

    for message in stream {
        let message = message.map_err(|e| unreadable(e.to_string()))?;
        let timestamp = message.log_time as f64 * 1e-9;

        let acc = topics.entry(message.channel.topic.clone()).or_default();
        acc.count += 1;
        if acc.message_type.is_empty() {
            acc.message_type = message
                .channel
                .schema
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default();
        }
        acc.start_time = merge_min(acc.start_time, Some(timestamp));
        acc.end_time = merge_max(acc.end_time, Some(timestamp));

        file_start = merge_min(file_start, Some(timestamp));
        file_end = merge_max(file_end, Some(timestamp));
    }

    Ok((file_start, file_end))
}

/// Every file under the directory, as (relative path, size), lexically sorted.
fn walk_files(root: &Path) -> Result<Vec<(String, u64)>, MetadataParseError> {
    let unreadable = |message: String| MetadataParseError::Unreadable {
        path: root.to_path_buf(),
        message,
    };

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| unreadable(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| unreadable(e.to_string()))?;
            let path = entry.path();
            let meta = entry.metadata().map_err(|e| unreadable(e.to_string()))?;
            if meta.is_dir() {
                stack.push(path);
            } else {
                let rel = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((rel, meta.len()));
            }
        }
    }

    files.sort();
    Ok(files)
}

fn merge_min(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn merge_max(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
