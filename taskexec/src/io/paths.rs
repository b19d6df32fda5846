//! Canonical paths within `.taskexec/` for a workspace root.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// All canonical paths within `.taskexec/` for a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub tasks_dir: PathBuf,
    pub conversation_path: PathBuf,
    pub responses_dir: PathBuf,
    pub summaries_dir: PathBuf,
    pub cache_meta_path: PathBuf,
    pub history_dir: PathBuf,
    pub loop_dir: PathBuf,
}

/// Checkpoint key of the edit loop record inside [`WorkspacePaths::loop_dir`].
pub const LOOP_STATE_KEY: &str = "state";

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".taskexec");
        let cache_dir = state_dir.join("cache");
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            config_path: state_dir.join("config.toml"),
            state_path: state_dir.join("state.json"),
            tasks_dir: state_dir.join("tasks"),
            conversation_path: state_dir.join("conversation.json"),
            responses_dir: cache_dir.join("responses"),
            summaries_dir: cache_dir.join("summaries"),
            cache_meta_path: cache_dir.join("meta.json"),
            history_dir: state_dir.join("history"),
            loop_dir: state_dir.join("loop"),
        }
    }

    /// Daily history file for `date`.
    pub fn history_path(&self, date: NaiveDate) -> PathBuf {
        self.history_dir
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Resolve a workspace-relative path (absolute paths pass through).
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
