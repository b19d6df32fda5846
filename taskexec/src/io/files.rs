//! Small filesystem queries shared by the cache, context and orchestrator.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::core::fingerprint::FileStamp;
use crate::io::paths::WorkspacePaths;

/// Modification time of `path` in nanoseconds since the epoch, if it exists.
pub fn modified_nanos(path: &Path) -> Option<u128> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_nanos())
}

/// Fingerprint stamps for workspace-relative `files`.
pub fn file_stamps(paths: &WorkspacePaths, files: &[String]) -> Vec<FileStamp> {
    files
        .iter()
        .map(|file| FileStamp {
            path: file.clone(),
            mtime: modified_nanos(&paths.resolve(file)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_report_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "a").expect("write");
        let paths = WorkspacePaths::new(temp.path());

        let stamps = file_stamps(&paths, &["a.txt".to_string(), "b.txt".to_string()]);
        assert!(stamps[0].mtime.is_some());
        assert_eq!(stamps[1].mtime, None);
    }
}
