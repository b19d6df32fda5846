//! Test-only helpers: scripted providers and throwaway workspaces.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::cancel::CancelToken;
use crate::core::types::{Completion, Message};
use crate::errors::TransportError;
use crate::io::config::{ExecutorConfig, write_config};
use crate::io::paths::WorkspacePaths;
use crate::io::provider::CompletionProvider;

/// One canned provider reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this completion text.
    Content(String),
    /// Fail with an ordinary provider error.
    Fail(String),
    /// Fail with a [`TransportError`].
    Transport(String),
    /// Request cancellation on the token, then return this text.
    CancelAfter(CancelToken, String),
    /// Request cancellation on the token, then fail like a killed child.
    CancelThenFail(CancelToken, String),
}

/// A prompt the scripted provider received.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub prompt: String,
    pub history: Vec<Message>,
}

/// Provider that replays [`ScriptedReply`] values in order and records every call.
#[derive(Debug)]
pub struct ScriptedProvider {
    replies: RefCell<VecDeque<ScriptedReply>>,
    calls: RefCell<Vec<ScriptedCall>>,
    tokens_per_call: u64,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: RefCell::new(Vec::new()),
            tokens_per_call: 10,
        }
    }

    /// Every call answered with the same text.
    pub fn repeating(content: &str, times: usize) -> Self {
        Self::new(vec![ScriptedReply::Content(content.to_string()); times])
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl CompletionProvider for ScriptedProvider {
    fn complete(&self, prompt: &str, history: &[Message]) -> Result<Completion> {
        self.calls.borrow_mut().push(ScriptedCall {
            prompt: prompt.to_string(),
            history: history.to_vec(),
        });
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted provider has no replies left"))?;
        let content = match reply {
            ScriptedReply::Content(content) => content,
            ScriptedReply::Fail(message) => return Err(anyhow!(message)),
            ScriptedReply::Transport(message) => {
                return Err(TransportError {
                    provider: "scripted".to_string(),
                    message,
                }
                .into());
            }
            ScriptedReply::CancelThenFail(token, message) => {
                token.cancel();
                return Err(anyhow!(message));
            }
            ScriptedReply::CancelAfter(token, content) => {
                token.cancel();
                content
            }
        };
        Ok(Completion {
            content,
            model: "scripted-model".to_string(),
            token_usage: self.tokens_per_call,
        })
    }
}

/// A temporary workspace root with `.taskexec/` paths.
pub struct TestWorkspace {
    dir: TempDir,
    pub paths: WorkspacePaths,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let paths = WorkspacePaths::new(dir.path());
        Ok(Self { dir, paths })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, file: &str, contents: &str) -> Result<()> {
        let path = self.root().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn read(&self, file: &str) -> Result<String> {
        Ok(fs::read_to_string(self.root().join(file))?)
    }

    /// Write `config.toml` and return the config for direct use.
    pub fn configure(&self, config: ExecutorConfig) -> Result<ExecutorConfig> {
        write_config(&self.paths.config_path, &config)?;
        Ok(config)
    }
}

/// An `EDIT` block replacing `old` with `new` in `file`.
pub fn edit_block(file: &str, old: &str, new: &str) -> String {
    format!("<<<EDIT file=\"{file}\">>>\n<<<OLD>>>\n{old}\n<<<NEW>>>\n{new}\n<<<END>>>\n")
}

/// A `CREATE` block for `file`.
pub fn create_block(file: &str, contents: &str) -> String {
    format!("<<<CREATE file=\"{file}\">>>\n{contents}\n<<<END>>>\n")
}

/// Test command that fails on its first `passes_on - 1` runs, then passes.
///
/// Keeps its run count in `.runs` under the workspace root.
pub fn pass_on_run(passes_on: u32) -> String {
    format!(
        "n=$(cat .runs 2>/dev/null || echo 0); n=$((n+1)); echo $n > .runs; \
         echo \"run $n\"; [ $n -ge {passes_on} ]"
    )
}
