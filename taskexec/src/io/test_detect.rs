//! Test command detection for the edit loop.
//!
//! Probes run in a fixed order: build manifests and framework config files in
//! the workspace root first, then the extensions of the target files. The
//! first probe that matches wins.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

const PYTEST_MARKERS: &[&str] = &[
    "pytest.ini",
    "pyproject.toml",
    "setup.cfg",
    "tox.ini",
    "conftest.py",
];

/// Detect the shell command that runs the workspace's tests.
///
/// Returns `None` when nothing matches; the loop then runs without test gating.
pub fn detect_test_command(root: &Path, target_files: &[String]) -> Option<String> {
    let detected = detect_from_manifests(root).or_else(|| detect_from_extensions(target_files));
    debug!(command = ?detected, "detected test command");
    detected
}

fn detect_from_manifests(root: &Path) -> Option<String> {
    if root.join("Cargo.toml").is_file() {
        return Some("cargo test".to_string());
    }
    if root.join("go.mod").is_file() {
        return Some("go test ./...".to_string());
    }
    if package_json_has_test_script(&root.join("package.json")) {
        return Some("npm test".to_string());
    }
    if PYTEST_MARKERS.iter().any(|name| root.join(name).is_file()) {
        return Some("python -m pytest".to_string());
    }
    if makefile_has_test_target(&root.join("Makefile")) {
        return Some("make test".to_string());
    }
    if root.join("pom.xml").is_file() {
        return Some("mvn -q test".to_string());
    }
    if root.join("build.gradle").is_file() || root.join("build.gradle.kts").is_file() {
        return Some("gradle test".to_string());
    }
    None
}

fn detect_from_extensions(target_files: &[String]) -> Option<String> {
    target_files.iter().find_map(|file| {
        let ext = Path::new(file).extension()?.to_str()?;
        let command = match ext {
            "rs" => "cargo test",
            "go" => "go test ./...",
            "py" => "python -m pytest",
            "js" | "jsx" | "ts" | "tsx" => "npm test",
            _ => return None,
        };
        Some(command.to_string())
    })
}

fn package_json_has_test_script(path: &Path) -> bool {
    let Ok(contents) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(manifest) = serde_json::from_str::<Value>(&contents) else {
        return false;
    };
    manifest
        .get("scripts")
        .and_then(|scripts| scripts.get("test"))
        .and_then(Value::as_str)
        // npm's placeholder script always fails; treat it as "no tests".
        .is_some_and(|script| !script.contains("no test specified"))
}

fn makefile_has_test_target(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|contents| {
            contents
                .lines()
                .any(|line| line.starts_with("test:") || line.starts_with("test :"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn cargo_manifest_wins() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("Cargo.toml"), "[package]\n").expect("write");
        fs::write(temp.path().join("pytest.ini"), "").expect("write");
        assert_eq!(
            detect_test_command(temp.path(), &files(&["a.py"])),
            Some("cargo test".to_string())
        );
    }

    #[test]
    fn package_json_requires_real_test_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pkg = temp.path().join("package.json");
        fs::write(
            &pkg,
            r#"{"scripts":{"test":"echo \"Error: no test specified\" && exit 1"}}"#,
        )
        .expect("write");
        assert_eq!(detect_test_command(temp.path(), &[]), None);

        fs::write(&pkg, r#"{"scripts":{"test":"jest"}}"#).expect("write");
        assert_eq!(
            detect_test_command(temp.path(), &[]),
            Some("npm test".to_string())
        );
    }

    #[test]
    fn pytest_markers_detected() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("conftest.py"), "").expect("write");
        assert_eq!(
            detect_test_command(temp.path(), &[]),
            Some("python -m pytest".to_string())
        );
    }

    #[test]
    fn makefile_test_target_detected() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("Makefile"), "build:\n\tcc x.c\ntest:\n\t./run\n")
            .expect("write");
        assert_eq!(
            detect_test_command(temp.path(), &[]),
            Some("make test".to_string())
        );
    }

    #[test]
    fn falls_back_to_extensions() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            detect_test_command(temp.path(), &files(&["README.md", "src/app.ts"])),
            Some("npm test".to_string())
        );
    }

    #[test]
    fn nothing_detected() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(detect_test_command(temp.path(), &files(&["notes.txt"])), None);
    }
}
