//! Executor configuration stored under `.taskexec/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::json::write_atomic;

/// Executor configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Iteration budget for the edit loop.
    pub max_iterations: u32,

    /// Wall-clock limit for one test command run, in seconds.
    pub test_timeout_secs: u64,

    /// Shell command used for test gating. Overrides detection when set.
    pub test_command: Option<String>,

    /// Cache entries older than this are treated as absent.
    pub cache_ttl_secs: u64,

    /// Flat estimate of tokens saved per cache hit.
    pub tokens_saved_per_hit: u64,

    /// Conversation messages kept on disk.
    pub conversation_limit: usize,

    /// Trailing conversation messages that feed the task fingerprint.
    pub fingerprint_history_tail: usize,

    /// Per-file character limit in prompts and context.
    pub file_content_limit: usize,

    /// Character limit for test output stored in checkpoints.
    pub test_output_limit: usize,

    /// Character limit for the previous failure shown in the next prompt.
    pub prompt_failure_limit: usize,

    /// Byte limit for captured stdout/stderr of child processes.
    pub output_limit_bytes: usize,

    /// Task records older than this are removed by cleanup.
    pub cleanup_max_age_days: u64,

    /// Cleanup keeps at most this many task records.
    pub cleanup_max_count: usize,

    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Registry identifier of the completion provider (e.g. `command`).
    pub id: String,
    /// Command line for the `command` provider; the prompt is written to stdin.
    pub command: Vec<String>,
    /// Model name reported in results.
    pub model: String,
    /// Wall-clock limit for one completion, in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "command".to_string(),
            command: vec!["llm".to_string()],
            model: "default".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            test_timeout_secs: 60,
            test_command: None,
            cache_ttl_secs: 24 * 60 * 60,
            tokens_saved_per_hit: 500,
            conversation_limit: 20,
            fingerprint_history_tail: 4,
            file_content_limit: 12_000,
            test_output_limit: 4_000,
            prompt_failure_limit: 3_000,
            output_limit_bytes: 1_000_000,
            cleanup_max_age_days: 30,
            cleanup_max_count: 100,
            provider: ProviderConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.test_timeout_secs == 0 {
            return Err(anyhow!("test_timeout_secs must be > 0"));
        }
        if self
            .test_command
            .as_deref()
            .is_some_and(|cmd| cmd.trim().is_empty())
        {
            return Err(anyhow!("test_command must not be blank when set"));
        }
        if self.cache_ttl_secs == 0 {
            return Err(anyhow!("cache_ttl_secs must be > 0"));
        }
        if self.conversation_limit == 0 {
            return Err(anyhow!("conversation_limit must be > 0"));
        }
        if self.file_content_limit == 0 || self.test_output_limit == 0 {
            return Err(anyhow!("content limits must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.provider.id.trim().is_empty() {
            return Err(anyhow!("provider.id must be non-empty"));
        }
        if self.provider.timeout_secs == 0 {
            return Err(anyhow!("provider.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    pub fn cleanup_max_age(&self) -> Duration {
        Duration::from_secs(self.cleanup_max_age_days * 24 * 60 * 60)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ExecutorConfig::default()`.
pub fn load_config(path: &Path) -> Result<ExecutorConfig> {
    if !path.exists() {
        let cfg = ExecutorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ExecutorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ExecutorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ExecutorConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = ExecutorConfig {
            test_command: Some("make check".to_string()),
            ..ExecutorConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_iterations = 2\n[provider]\nmodel = \"local\"\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_iterations, 2);
        assert_eq!(cfg.provider.model, "local");
        assert_eq!(cfg.provider.id, "command");
        assert_eq!(cfg.test_timeout_secs, 60);
    }

    #[test]
    fn rejects_zero_iterations() {
        let cfg = ExecutorConfig {
            max_iterations: 0,
            ..ExecutorConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }
}
