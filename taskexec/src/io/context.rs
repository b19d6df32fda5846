//! Context assembly for single-completion tasks.

use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::truncate::truncate_middle;
use crate::io::cache::ResponseCache;
use crate::io::paths::WorkspacePaths;

/// Produces the context block placed in front of the task in a completion prompt.
pub trait ContextBuilder {
    fn build(&self, task: &str, files: &[String]) -> Result<String>;
}

/// Builds context from the supplied files only.
///
/// Files at or under the size limit are included verbatim. Larger files are
/// replaced by a head+tail excerpt that is kept in the summary cache until the
/// file changes.
#[derive(Debug, Clone)]
pub struct FileContextBuilder {
    paths: WorkspacePaths,
    cache: ResponseCache,
    file_limit: usize,
}

impl FileContextBuilder {
    pub fn new(paths: WorkspacePaths, cache: ResponseCache, file_limit: usize) -> Self {
        Self {
            paths,
            cache,
            file_limit,
        }
    }

    fn file_section(&self, file: &str) -> Result<String> {
        let path = self.paths.resolve(file);
        let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        if contents.chars().count() <= self.file_limit {
            return Ok(contents);
        }
        if let Some(summary) = self.cache.get_summary(&path) {
            debug!(file, "using cached summary");
            return Ok(summary);
        }
        let summary = truncate_middle(&contents, self.file_limit);
        self.cache.set_summary(&path, &summary);
        Ok(summary)
    }
}

impl ContextBuilder for FileContextBuilder {
    #[instrument(skip_all, fields(files = files.len()))]
    fn build(&self, _task: &str, files: &[String]) -> Result<String> {
        let mut sections = Vec::with_capacity(files.len());
        for file in files {
            let body = self.file_section(file)?;
            sections.push(format!("### {file}\n```\n{}\n```", body.trim_end()));
        }
        Ok(sections.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn builder(root: &std::path::Path, limit: usize) -> FileContextBuilder {
        let paths = WorkspacePaths::new(root);
        let cache = ResponseCache::new(&paths, Duration::from_secs(3600), 500);
        FileContextBuilder::new(paths, cache, limit)
    }

    #[test]
    fn includes_small_files_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.py"), "x = 1\n").expect("write");
        let context = builder(temp.path(), 100)
            .build("explain", &["a.py".to_string()])
            .expect("build");
        assert_eq!(context, "### a.py\n```\nx = 1\n```");
    }

    #[test]
    fn large_files_are_summarized_and_cached() {
        let temp = tempfile::tempdir().expect("tempdir");
        let big = "a".repeat(50) + &"z".repeat(50);
        fs::write(temp.path().join("big.txt"), &big).expect("write");
        let builder = builder(temp.path(), 20);

        let context = builder.build("explain", &["big.txt".to_string()]).expect("build");
        assert!(context.contains("chars truncated"));

        let paths = WorkspacePaths::new(temp.path());
        let cache = ResponseCache::new(&paths, Duration::from_secs(3600), 500);
        assert!(cache.get_summary(&temp.path().join("big.txt")).is_some());
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = builder(temp.path(), 100)
            .build("explain", &["nope.txt".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("read"));
    }
}
