//! Rolling conversation log (`.taskexec/conversation.json`).

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::types::Message;
use crate::io::json::{read_json_lenient, write_json_atomic};

#[derive(Debug, Clone)]
pub struct ConversationStore {
    path: PathBuf,
    limit: usize,
}

impl ConversationStore {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored messages, oldest first. Missing or corrupt ⇒ empty.
    pub fn load(&self) -> Vec<Message> {
        read_json_lenient(&self.path).unwrap_or_default()
    }

    /// Append `messages` and keep only the newest `limit`.
    pub fn append(&self, messages: &[Message]) -> Result<Vec<Message>> {
        let mut all = self.load();
        all.extend_from_slice(messages);
        if all.len() > self.limit {
            all.drain(..all.len() - self.limit);
        }
        write_json_atomic(&self.path, &all)?;
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_newest_messages() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ConversationStore::new(temp.path().join("conversation.json"), 3);
        assert!(store.load().is_empty());

        store
            .append(&[Message::user("1"), Message::assistant("2")])
            .expect("append");
        let kept = store
            .append(&[Message::user("3"), Message::assistant("4")])
            .expect("append");

        let contents: Vec<&str> = kept.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["2", "3", "4"]);
        assert_eq!(store.load(), kept);
    }
}
