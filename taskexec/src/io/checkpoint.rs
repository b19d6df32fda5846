//! Durable key/value checkpoint store.
//!
//! Each key maps to exactly one JSON record at `{dir}/{key}.json`. Named
//! sub-checkpoints for a key live under `{dir}/{key}.named/{name}.json`.
//! Writes are whole-record replacements; corrupt records are skipped by every
//! listing or scanning operation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::core::types::TaskState;
use crate::io::json::{read_json_lenient, remove_file_if_exists, write_json_atomic};

const RECORD_EXT: &str = "json";
const NAMED_SUFFIX: &str = ".named";

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`.
    pub fn record_path(&self, key: &str) -> Result<PathBuf> {
        validate_name(key)?;
        Ok(self.dir.join(format!("{key}.{RECORD_EXT}")))
    }

    fn named_dir(&self, key: &str) -> Result<PathBuf> {
        validate_name(key)?;
        Ok(self.dir.join(format!("{key}{NAMED_SUFFIX}")))
    }

    /// Replace the record for `key` with `state`.
    pub fn save<T: Serialize>(&self, key: &str, state: &T) -> Result<PathBuf> {
        let path = self.record_path(key)?;
        debug!(path = %path.display(), "saving checkpoint");
        write_json_atomic(&path, state).with_context(|| format!("save checkpoint {key}"))?;
        Ok(path)
    }

    /// Load the record for `key`. Missing or corrupt records are `None`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = match self.record_path(key) {
            Ok(path) => path,
            Err(err) => {
                warn!(key, err = %err, "invalid checkpoint key");
                return None;
            }
        };
        read_json_lenient(&path)
    }

    /// Delete the record for `key` and its named sub-checkpoints.
    ///
    /// Returns whether the record existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let existed = remove_file_if_exists(&self.record_path(key)?)?;
        let named = self.named_dir(key)?;
        if named.exists() {
            fs::remove_dir_all(&named)
                .with_context(|| format!("remove named checkpoints {}", named.display()))?;
        }
        Ok(existed)
    }

    /// Sorted keys of all records in the store.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .record_files()?
            .into_iter()
            .filter_map(|(path, _)| key_of(&path))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Task records whose status allows resuming, most recently updated first.
    pub fn list_resumable(&self) -> Result<Vec<TaskState>> {
        let mut states: Vec<TaskState> = self
            .record_files()?
            .into_iter()
            .filter_map(|(path, _)| read_json_lenient::<TaskState>(&path))
            .filter(|state| state.status.is_resumable())
            .collect();
        states.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(states)
    }

    /// Most recently updated task record that is not terminal.
    pub fn load_latest_non_terminal(&self) -> Result<Option<TaskState>> {
        Ok(self.list_resumable()?.into_iter().next())
    }

    /// Remove records older than `max_age`, then trim to `max_count` (oldest first).
    pub fn cleanup(&self, max_age: Duration, max_count: usize) -> Result<usize> {
        self.cleanup_at(max_age, max_count, SystemTime::now())
    }

    /// [`CheckpointStore::cleanup`] against an explicit clock.
    pub fn cleanup_at(&self, max_age: Duration, max_count: usize, now: SystemTime) -> Result<usize> {
        let mut records = self.record_files()?;
        let mut deleted = 0usize;

        let mut survivors = Vec::with_capacity(records.len());
        for (path, modified) in records.drain(..) {
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > max_age {
                self.remove_record(&path)?;
                deleted += 1;
            } else {
                survivors.push((path, modified));
            }
        }

        if survivors.len() > max_count {
            survivors.sort_by(|a, b| a.1.cmp(&b.1));
            let excess = survivors.len() - max_count;
            for (path, _) in survivors.iter().take(excess) {
                self.remove_record(path)?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(dir = %self.dir.display(), deleted, "cleaned up checkpoints");
        }
        Ok(deleted)
    }

    /// Store a named snapshot alongside the record for `key`.
    pub fn save_named_checkpoint<T: Serialize>(&self, key: &str, name: &str, state: &T) -> Result<PathBuf> {
        validate_name(name)?;
        let path = self.named_dir(key)?.join(format!("{name}.{RECORD_EXT}"));
        debug!(path = %path.display(), "saving named checkpoint");
        write_json_atomic(&path, state)
            .with_context(|| format!("save named checkpoint {key}/{name}"))?;
        Ok(path)
    }

    pub fn load_named_checkpoint<T: DeserializeOwned>(&self, key: &str, name: &str) -> Option<T> {
        if validate_name(name).is_err() {
            return None;
        }
        let dir = self.named_dir(key).ok()?;
        read_json_lenient(&dir.join(format!("{name}.{RECORD_EXT}")))
    }

    /// Sorted names of the snapshots stored for `key`.
    pub fn list_named_checkpoints(&self, key: &str) -> Result<Vec<String>> {
        let dir = self.named_dir(key)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == RECORD_EXT)
                && let Some(name) = key_of(&path)
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove_record(&self, path: &Path) -> Result<()> {
        remove_file_if_exists(path)?;
        if let Some(key) = key_of(path) {
            let named = self.dir.join(format!("{key}{NAMED_SUFFIX}"));
            if named.exists() {
                fs::remove_dir_all(&named)
                    .with_context(|| format!("remove named checkpoints {}", named.display()))?;
            }
        }
        Ok(())
    }

    /// Record files with their modification times.
    fn record_files(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in
            fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file() || path.extension().is_none_or(|ext| ext != RECORD_EXT) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .with_context(|| format!("stat {}", path.display()))?;
            files.push((path, modified));
        }
        Ok(files)
    }
}

fn key_of(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(anyhow!("invalid checkpoint name '{name}'"))
    }
}
