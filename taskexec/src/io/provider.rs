//! Completion provider abstraction and the provider registry.
//!
//! The [`CompletionProvider`] trait decouples orchestration from the model
//! backend. Providers are resolved once per invocation from the configured id
//! through a [`ProviderRegistry`]; tests register scripted providers instead of
//! spawning processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{Completion, Message, Role};
use crate::errors::{ConfigError, TransportError};
use crate::io::config::ProviderConfig;
use crate::io::process::run_with_timeout;

/// A model backend that turns a prompt into a completion.
pub trait CompletionProvider {
    /// Complete `prompt`, optionally with prior conversation `history`.
    ///
    /// Connectivity failures must be reported as [`TransportError`].
    fn complete(&self, prompt: &str, history: &[Message]) -> Result<Completion>;
}

impl<T: CompletionProvider + ?Sized> CompletionProvider for Box<T> {
    fn complete(&self, prompt: &str, history: &[Message]) -> Result<Completion> {
        (**self).complete(prompt, history)
    }
}

type ProviderFactory = Box<dyn Fn(&ProviderConfig, &Path) -> Result<Box<dyn CompletionProvider>>>;

/// Maps provider ids to factories.
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// A registry with no providers.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with the built-in providers (`command`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("command", |cfg, root| {
            Ok(Box::new(CommandProvider::from_config(cfg, root)?) as Box<dyn CompletionProvider>)
        });
        registry
    }

    pub fn register<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&ProviderConfig, &Path) -> Result<Box<dyn CompletionProvider>> + 'static,
    {
        self.factories.insert(id.to_string(), Box::new(factory));
    }

    pub fn ids(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Build the provider named by `cfg.id`.
    pub fn resolve(&self, cfg: &ProviderConfig, root: &Path) -> Result<Box<dyn CompletionProvider>> {
        let factory = self.factories.get(&cfg.id).ok_or_else(|| ConfigError::UnknownProvider {
            id: cfg.id.clone(),
            known: self.ids(),
        })?;
        debug!(provider = %cfg.id, "resolved completion provider");
        factory(cfg, root)
    }
}

/// Provider that pipes the prompt to an external CLI and reads the answer from stdout.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
    model: String,
    workdir: PathBuf,
    timeout: Duration,
}

const PROVIDER_OUTPUT_LIMIT_BYTES: usize = 4_000_000;

impl CommandProvider {
    pub fn from_config(cfg: &ProviderConfig, root: &Path) -> Result<Self> {
        let (program, args) = cfg.command.split_first().ok_or_else(|| ConfigError::InvalidProvider {
            id: cfg.id.clone(),
            reason: "provider.command must be a non-empty array".to_string(),
        })?;
        if program.trim().is_empty() {
            return Err(ConfigError::InvalidProvider {
                id: cfg.id.clone(),
                reason: "provider.command[0] must be non-empty".to_string(),
            }
            .into());
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            model: cfg.model.clone(),
            workdir: root.to_path_buf(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    fn transport(&self, message: impl Into<String>) -> anyhow::Error {
        TransportError {
            provider: self.program.clone(),
            message: message.into(),
        }
        .into()
    }
}

impl CompletionProvider for CommandProvider {
    #[instrument(skip_all, fields(program = %self.program, timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, prompt: &str, history: &[Message]) -> Result<Completion> {
        info!(history = history.len(), "requesting completion");
        let input = render_transcript(prompt, history);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.workdir);

        let output = run_with_timeout(cmd, Some(input.as_bytes()), self.timeout, PROVIDER_OUTPUT_LIMIT_BYTES)
            .map_err(|err| self.transport(format!("{err:#}")))?;
        if output.timed_out {
            warn!("provider command timed out");
            return Err(self.transport(format!("timed out after {:?}", self.timeout)));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "provider command failed with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        let content = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let token_usage = estimate_tokens(&input) + estimate_tokens(&content);
        debug!(token_usage, "completion received");
        Ok(Completion {
            content,
            model: self.model.clone(),
            token_usage,
        })
    }
}

/// Rough token estimate (four characters per token).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

fn render_transcript(prompt: &str, history: &[Message]) -> String {
    if history.is_empty() {
        return prompt.to_string();
    }
    let mut buf = String::new();
    for message in history {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        buf.push_str(&format!("[{role}]\n{}\n\n", message.content.trim()));
    }
    buf.push_str("[user]\n");
    buf.push_str(prompt);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(command: &[&str]) -> ProviderConfig {
        ProviderConfig {
            id: "command".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            model: "test-model".to_string(),
            timeout_secs: 10,
        }
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let registry = ProviderRegistry::with_builtins();
        let err = registry
            .resolve(
                &ProviderConfig {
                    id: "mystery".to_string(),
                    ..ProviderConfig::default()
                },
                temp.path(),
            )
            .err()
            .expect("should fail");
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownProvider { id, .. }) if id == "mystery"
        ));
    }

    #[test]
    fn empty_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = CommandProvider::from_config(&cfg(&[]), temp.path()).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn command_provider_reads_stdout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let provider = ProviderRegistry::with_builtins()
            .resolve(&cfg(&["cat"]), temp.path())
            .expect("resolve");
        let completion = provider.complete("echo me", &[]).expect("complete");
        assert_eq!(completion.content, "echo me");
        assert_eq!(completion.model, "test-model");
        assert!(completion.token_usage > 0);
    }

    #[test]
    fn command_provider_includes_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let provider = CommandProvider::from_config(&cfg(&["cat"]), temp.path()).expect("build");
        let completion = provider
            .complete("next", &[Message::user("first"), Message::assistant("reply")])
            .expect("complete");
        assert!(completion.content.starts_with("[user]\nfirst"));
        assert!(completion.content.ends_with("[user]\nnext"));
    }

    #[test]
    fn missing_binary_is_transport_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let provider = CommandProvider::from_config(&cfg(&["/no/such/llm"]), temp.path())
            .expect("build");
        let err = provider.complete("hi", &[]).unwrap_err();
        assert!(err.downcast_ref::<TransportError>().is_some());
    }

    #[test]
    fn nonzero_exit_is_plain_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let provider = CommandProvider::from_config(&cfg(&["sh", "-c", "cat >/dev/null; exit 2"]), temp.path())
            .expect("build");
        let err = provider.complete("hi", &[]).unwrap_err();
        assert!(err.downcast_ref::<TransportError>().is_none());
        assert!(err.to_string().contains("status Some(2)"));
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
