//! Applying parsed edits to the workspace.
//!
//! Conflicts (missing file, `old_content` not found, path outside the
//! workspace) are recorded per edit and never abort the batch.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::core::types::{Edit, EditAction, EditOutcome};

/// Apply `edits` in order under `root`, returning one outcome per edit.
pub fn apply_edits(root: &Path, edits: &[Edit]) -> Vec<EditOutcome> {
    edits.iter().map(|edit| apply_edit(root, edit)).collect()
}

/// Apply a single edit.
///
/// Creation writes the full content (creating parent directories). A
/// modification replaces only the first occurrence of `old_content`.
pub fn apply_edit(root: &Path, edit: &Edit) -> EditOutcome {
    let action = if edit.is_create {
        EditAction::Create
    } else {
        EditAction::Edit
    };
    let result = resolve_in_root(root, &edit.file_path).and_then(|path| {
        if edit.is_create {
            create_file(&path, &edit.new_content)
        } else {
            replace_first(&path, &edit.old_content, &edit.new_content)
        }
    });

    match result {
        Ok(()) => {
            debug!(file = %edit.file_path, ?action, "edit applied");
            EditOutcome {
                file: edit.file_path.clone(),
                action,
                applied: true,
                error: None,
            }
        }
        Err(err) => {
            warn!(file = %edit.file_path, ?action, err = %err, "edit not applied");
            EditOutcome {
                file: edit.file_path.clone(),
                action,
                applied: false,
                error: Some(err.to_string()),
            }
        }
    }
}

fn create_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn replace_first(path: &Path, old: &str, new: &str) -> Result<()> {
    if !path.is_file() {
        return Err(anyhow!("file not found: {}", path.display()));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let Some(at) = contents.find(old) else {
        return Err(anyhow!("old content not found in {}", path.display()));
    };
    let mut updated = String::with_capacity(contents.len() + new.len());
    updated.push_str(&contents[..at]);
    updated.push_str(new);
    updated.push_str(&contents[at + old.len()..]);
    fs::write(path, updated).with_context(|| format!("write {}", path.display()))
}

/// Join a model-supplied relative path onto `root`, refusing anything that escapes it.
fn resolve_in_root(root: &Path, file: &str) -> Result<PathBuf> {
    let relative = Path::new(file);
    if file.trim().is_empty() || relative.is_absolute() {
        return Err(anyhow!("path escapes workspace: {file}"));
    }
    let mut depth = 0i32;
    for component in relative.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(anyhow!("path escapes workspace: {file}"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("path escapes workspace: {file}"));
            }
        }
    }
    Ok(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(file: &str, old: &str, new: &str) -> Edit {
        Edit {
            file_path: file.to_string(),
            old_content: old.to_string(),
            new_content: new.to_string(),
            is_create: false,
        }
    }

    fn create(file: &str, content: &str) -> Edit {
        Edit {
            file_path: file.to_string(),
            old_content: String::new(),
            new_content: content.to_string(),
            is_create: true,
        }
    }

    #[test]
    fn replaces_exact_old_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("calc.py");
        fs::write(&path, "def sub(a, b):\n    return a - b\n").expect("write");

        let outcome = apply_edit(temp.path(), &edit("calc.py", "return a - b", "return a + b"));

        assert!(outcome.applied);
        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents.matches("return a + b").count(), 1);
        assert!(!contents.contains("return a - b"));
    }

    #[test]
    fn replaces_only_first_occurrence() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("dup.txt");
        fs::write(&path, "x = 1\ny = 2\nx = 1\n").expect("write");

        apply_edit(temp.path(), &edit("dup.txt", "x = 1", "x = 9"));

        assert_eq!(fs::read_to_string(&path).expect("read"), "x = 9\ny = 2\nx = 1\n");
    }

    #[test]
    fn missing_file_is_not_created() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = apply_edit(temp.path(), &edit("ghost.py", "a", "b"));

        assert!(!outcome.applied);
        assert_eq!(outcome.action, EditAction::Edit);
        assert!(outcome.error.expect("error").contains("not found"));
        assert!(!temp.path().join("ghost.py").exists());
    }

    #[test]
    fn missing_old_content_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.py"), "hello\n").expect("write");
        let outcome = apply_edit(temp.path(), &edit("a.py", "goodbye", "x"));

        assert!(!outcome.applied);
        assert!(outcome.error.expect("error").contains("old content not found"));
        assert_eq!(fs::read_to_string(temp.path().join("a.py")).expect("read"), "hello\n");
    }

    #[test]
    fn create_makes_parent_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = apply_edit(temp.path(), &create("pkg/sub/new.py", "x = 1\n"));

        assert!(outcome.applied);
        assert_eq!(outcome.action, EditAction::Create);
        assert_eq!(
            fs::read_to_string(temp.path().join("pkg/sub/new.py")).expect("read"),
            "x = 1\n"
        );
    }

    #[test]
    fn failures_do_not_stop_later_edits() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "one").expect("write");
        let outcomes = apply_edits(
            temp.path(),
            &[
                edit("missing.txt", "x", "y"),
                edit("a.txt", "one", "two"),
                create("b.txt", "new"),
            ],
        );

        let applied: Vec<bool> = outcomes.iter().map(|o| o.applied).collect();
        assert_eq!(applied, vec![false, true, true]);
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "two");
    }

    #[test]
    fn rejects_paths_outside_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        for bad in ["../escape.txt", "/etc/passwd", "a/../../b.txt", ""] {
            let outcome = apply_edit(temp.path(), &create(bad, "x"));
            assert!(!outcome.applied, "{bad} should be rejected");
            assert!(outcome.error.expect("error").contains("escapes workspace"));
        }
        let ok = apply_edit(temp.path(), &create("a/../b.txt", "x"));
        assert!(ok.applied);
    }
}
