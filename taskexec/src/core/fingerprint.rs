//! Deterministic task fingerprints used as cache and task keys.

use sha2::{Digest, Sha256};

use crate::core::types::Message;

/// Short hex digest of `content` (first 8 bytes of SHA-256, 16 hex chars).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// A referenced file and its modification time in nanoseconds since the epoch.
///
/// `mtime` is `None` when the file does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub path: String,
    pub mtime: Option<u128>,
}

/// Compute the fingerprint for a task.
///
/// Inputs are the task text, the referenced files (sorted here so caller order
/// does not matter), and the last `history_tail` conversation messages.
pub fn task_fingerprint(task: &str, files: &[FileStamp], history: &[Message], history_tail: usize) -> String {
    let mut stamps: Vec<&FileStamp> = files.iter().collect();
    stamps.sort_by(|a, b| a.path.cmp(&b.path));
    stamps.dedup_by(|a, b| a.path == b.path);

    let mut hasher = Sha256::new();
    // Length-prefix every field so adjacent values cannot run together.
    update_field(&mut hasher, "task", task);
    for stamp in stamps {
        update_field(&mut hasher, "file", &stamp.path);
        let mtime = stamp
            .mtime
            .map(|m| m.to_string())
            .unwrap_or_else(|| "missing".to_string());
        update_field(&mut hasher, "mtime", &mtime);
    }
    let start = history.len().saturating_sub(history_tail);
    for message in &history[start..] {
        let role = serde_json::to_string(&message.role).unwrap_or_default();
        update_field(&mut hasher, "role", &role);
        update_field(&mut hasher, "content", &message.content);
    }
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

fn update_field(hasher: &mut Sha256, tag: &str, value: &str) {
    hasher.update(tag.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(path: &str, mtime: u128) -> FileStamp {
        FileStamp {
            path: path.to_string(),
            mtime: Some(mtime),
        }
    }

    #[test]
    fn content_hash_is_deterministic() {
        let hash1 = content_hash("Hello, world!");
        let hash2 = content_hash("Hello, world!");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 16);
        assert_ne!(hash1, content_hash("Hello"));
    }

    #[test]
    fn fingerprint_ignores_file_order() {
        let a = task_fingerprint("task", &[stamp("a.rs", 1), stamp("b.rs", 2)], &[], 4);
        let b = task_fingerprint("task", &[stamp("b.rs", 2), stamp("a.rs", 1)], &[], 4);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn fingerprint_changes_with_mtime() {
        let a = task_fingerprint("task", &[stamp("a.rs", 1)], &[], 4);
        let b = task_fingerprint("task", &[stamp("a.rs", 2)], &[], 4);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_missing_files() {
        let present = task_fingerprint("task", &[stamp("a.rs", 0)], &[], 4);
        let missing = task_fingerprint(
            "task",
            &[FileStamp {
                path: "a.rs".to_string(),
                mtime: None,
            }],
            &[],
            4,
        );
        assert_ne!(present, missing);
    }

    #[test]
    fn fingerprint_only_uses_history_tail() {
        let old = vec![Message::user("first"), Message::assistant("one")];
        let mut longer = vec![Message::user("zeroth")];
        longer.extend(old.clone());

        let a = task_fingerprint("task", &[], &old, 2);
        let b = task_fingerprint("task", &[], &longer, 2);
        assert_eq!(a, b);

        let c = task_fingerprint("task", &[], &longer, 3);
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_changes_with_task_text() {
        assert_ne!(
            task_fingerprint("fix add", &[], &[], 4),
            task_fingerprint("fix sub", &[], &[], 4)
        );
    }
}
