//! Content-addressed response and file-summary cache.
//!
//! Responses are stored at `cache/responses/{fingerprint}.json`, file summaries
//! at `cache/summaries/{path-hash}.json`, counters at `cache/meta.json`.
//!
//! Cache operations never fail the caller: unreadable or corrupt records are
//! misses and failed writes are logged and dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::fingerprint::content_hash;
use crate::io::files::modified_nanos;
use crate::io::json::{read_json, read_json_lenient, remove_file_if_exists, write_json_atomic};
use crate::io::paths::WorkspacePaths;

/// A cached model answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cached_at: DateTime<Utc>,
    pub payload: String,
    pub size_estimate: usize,
}

/// A cached file summary, valid only for the source version it was made from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub cached_at: DateTime<Utc>,
    pub payload: String,
    pub size_estimate: usize,
    pub source_path: String,
    pub source_mtime: Option<u128>,
}

/// Persisted counters (`cache/meta.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheMeta {
    pub hits: u64,
    pub sets: u64,
    pub tokens_saved: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: usize,
    pub hits: u64,
    pub sets: u64,
    pub tokens_saved_estimate: u64,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    responses_dir: PathBuf,
    summaries_dir: PathBuf,
    meta_path: PathBuf,
    ttl: Duration,
    tokens_saved_per_hit: u64,
}

impl ResponseCache {
    pub fn new(paths: &WorkspacePaths, ttl: Duration, tokens_saved_per_hit: u64) -> Self {
        Self {
            responses_dir: paths.responses_dir.clone(),
            summaries_dir: paths.summaries_dir.clone(),
            meta_path: paths.cache_meta_path.clone(),
            ttl,
            tokens_saved_per_hit,
        }
    }

    pub fn tokens_saved_per_hit(&self) -> u64 {
        self.tokens_saved_per_hit
    }

    /// Cached payload for `fingerprint`, if present and unexpired.
    pub fn get(&self, fingerprint: &str) -> Option<String> {
        self.get_at(fingerprint, Utc::now())
    }

    /// [`ResponseCache::get`] against an explicit clock.
    pub fn get_at(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<String> {
        let path = self.response_path(fingerprint)?;
        let entry: CacheEntry = read_json_lenient(&path)?;
        if self.is_expired(entry.cached_at, now) {
            debug!(fingerprint, "cache entry expired");
            self.remove_quietly(&path);
            return None;
        }
        debug!(fingerprint, "cache hit");
        self.update_meta(|meta| {
            meta.hits += 1;
            meta.tokens_saved += self.tokens_saved_per_hit;
        });
        Some(entry.payload)
    }

    /// Store `payload` for `fingerprint`, replacing any previous entry.
    pub fn set(&self, fingerprint: &str, payload: &str) {
        self.set_at(fingerprint, payload, Utc::now());
    }

    /// [`ResponseCache::set`] against an explicit clock.
    pub fn set_at(&self, fingerprint: &str, payload: &str, now: DateTime<Utc>) {
        let Some(path) = self.response_path(fingerprint) else {
            return;
        };
        let entry = CacheEntry {
            cached_at: now,
            payload: payload.to_string(),
            size_estimate: payload.len(),
        };
        if let Err(err) = write_json_atomic(&path, &entry) {
            warn!(fingerprint, err = %format!("{err:#}"), "failed to write cache entry");
            return;
        }
        self.update_meta(|meta| meta.sets += 1);
    }

    /// Cached summary of `source`, valid only while its mtime is unchanged.
    pub fn get_summary(&self, source: &Path) -> Option<String> {
        self.get_summary_at(source, Utc::now())
    }

    pub fn get_summary_at(&self, source: &Path, now: DateTime<Utc>) -> Option<String> {
        let path = self.summary_path(source);
        let entry: SummaryEntry = read_json_lenient(&path)?;
        let current_mtime = modified_nanos(source);
        if current_mtime.is_none() || current_mtime != entry.source_mtime {
            debug!(source = %source.display(), "summary invalidated by source change");
            self.remove_quietly(&path);
            return None;
        }
        if self.is_expired(entry.cached_at, now) {
            self.remove_quietly(&path);
            return None;
        }
        self.update_meta(|meta| {
            meta.hits += 1;
            meta.tokens_saved += self.tokens_saved_per_hit;
        });
        Some(entry.payload)
    }

    pub fn set_summary(&self, source: &Path, summary: &str) {
        self.set_summary_at(source, summary, Utc::now());
    }

    pub fn set_summary_at(&self, source: &Path, summary: &str, now: DateTime<Utc>) {
        let entry = SummaryEntry {
            cached_at: now,
            payload: summary.to_string(),
            size_estimate: summary.len(),
            source_path: source.display().to_string(),
            source_mtime: modified_nanos(source),
        };
        let path = self.summary_path(source);
        if let Err(err) = write_json_atomic(&path, &entry) {
            warn!(source = %source.display(), err = %format!("{err:#}"), "failed to write summary");
            return;
        }
        self.update_meta(|meta| meta.sets += 1);
    }

    /// Remove entries (all, or only those older than `older_than`).
    ///
    /// A full clear also resets the counters. Returns the number of entries removed.
    pub fn clear(&self, older_than: Option<Duration>) -> usize {
        self.clear_at(older_than, Utc::now())
    }

    pub fn clear_at(&self, older_than: Option<Duration>, now: DateTime<Utc>) -> usize {
        let mut removed = 0usize;
        for dir in [&self.responses_dir, &self.summaries_dir] {
            for path in entry_files(dir) {
                let stale = match older_than {
                    None => true,
                    Some(limit) => match cached_at_of(&path) {
                        Some(cached_at) => age_exceeds(cached_at, now, limit),
                        // Unreadable entries are never useful; drop them too.
                        None => true,
                    },
                };
                if stale && remove_file_if_exists(&path).unwrap_or(false) {
                    removed += 1;
                }
            }
        }
        if older_than.is_none() {
            self.remove_quietly(&self.meta_path);
        }
        debug!(removed, "cache cleared");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let meta: CacheMeta = read_json_lenient(&self.meta_path).unwrap_or_default();
        let mut stats = CacheStats {
            hits: meta.hits,
            sets: meta.sets,
            tokens_saved_estimate: meta.tokens_saved,
            ..CacheStats::default()
        };
        for path in entry_files(&self.responses_dir) {
            if let Ok(Some(entry)) = read_json::<CacheEntry>(&path) {
                stats.entries += 1;
                stats.total_size += entry.size_estimate;
            }
        }
        for path in entry_files(&self.summaries_dir) {
            if let Ok(Some(entry)) = read_json::<SummaryEntry>(&path) {
                stats.entries += 1;
                stats.total_size += entry.size_estimate;
            }
        }
        stats
    }

    fn response_path(&self, fingerprint: &str) -> Option<PathBuf> {
        let valid = !fingerprint.is_empty()
            && fingerprint
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            warn!(fingerprint, "ignoring invalid cache key");
            return None;
        }
        Some(self.responses_dir.join(format!("{fingerprint}.json")))
    }

    fn summary_path(&self, source: &Path) -> PathBuf {
        let key = content_hash(&source.display().to_string());
        self.summaries_dir.join(format!("{key}.json"))
    }

    fn is_expired(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        age_exceeds(cached_at, now, self.ttl)
    }

    fn update_meta(&self, update: impl FnOnce(&mut CacheMeta)) {
        let mut meta: CacheMeta = read_json_lenient(&self.meta_path).unwrap_or_default();
        update(&mut meta);
        if let Err(err) = write_json_atomic(&self.meta_path, &meta) {
            warn!(err = %format!("{err:#}"), "failed to write cache meta");
        }
    }

    fn remove_quietly(&self, path: &Path) {
        if let Err(err) = remove_file_if_exists(path) {
            warn!(path = %path.display(), err = %format!("{err:#}"), "failed to remove cache record");
        }
    }
}

fn age_exceeds(cached_at: DateTime<Utc>, now: DateTime<Utc>, limit: Duration) -> bool {
    let limit = TimeDelta::from_std(limit).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(cached_at) > limit
}

#[derive(Deserialize)]
struct CachedAt {
    cached_at: DateTime<Utc>,
}

fn cached_at_of(path: &Path) -> Option<DateTime<Utc>> {
    read_json::<CachedAt>(path)
        .ok()
        .flatten()
        .map(|entry| entry.cached_at)
}

fn entry_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}
