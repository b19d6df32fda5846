//! JSON record helpers shared by every persisted store.
//!
//! All writes are whole-record replacements (temp file + rename), so a crash
//! mid-write can lose at most the record being written.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Serialize `value` to pretty JSON with a trailing newline and replace `path` atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Atomically replace `path` with `contents`, creating parent directories.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Read and parse a JSON record. Missing files are `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}

/// Like [`read_json`], but corrupt or unreadable records are logged and treated as absent.
pub fn read_json_lenient<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match read_json(path) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), err = %format!("{err:#}"), "ignoring unreadable record");
            None
        }
    }
}

/// Remove a file, returning whether it existed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed record");
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}
