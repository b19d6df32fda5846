//! Daily task history (`.taskexec/history/{YYYY-MM-DD}.json`).

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::truncate::truncate_head;
use crate::io::json::{read_json_lenient, write_json_atomic};
use crate::io::paths::WorkspacePaths;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub task: String,
    pub response_preview: String,
    pub cached: bool,
}

impl HistoryEntry {
    pub fn new(task: &str, response: &str, cached: bool, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            task: truncate_head(task, PREVIEW_CHARS),
            response_preview: truncate_head(response, PREVIEW_CHARS),
            cached,
        }
    }
}

/// Append `entry` to the history file of its day.
pub fn append_history(paths: &WorkspacePaths, entry: HistoryEntry) -> Result<()> {
    let path = paths.history_path(entry.timestamp.date_naive());
    let mut entries: Vec<HistoryEntry> = read_json_lenient(&path).unwrap_or_default();
    entries.push(entry);
    debug!(path = %path.display(), entries = entries.len(), "appending history");
    write_json_atomic(&path, &entries)
}

/// Entries recorded on the day of `now`.
pub fn load_history(paths: &WorkspacePaths, now: DateTime<Utc>) -> Vec<HistoryEntry> {
    read_json_lenient(&paths.history_path(now.date_naive())).unwrap_or_default()
}
