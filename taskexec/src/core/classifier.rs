//! Deterministic classification of task text into coding vs general tasks.

use std::path::Path;

const CODING_VERBS: &[&str] = &[
    "add", "build", "change", "create", "debug", "delete", "edit", "fix", "implement", "migrate",
    "modify", "optimize", "patch", "refactor", "remove", "rename", "repair", "replace", "rewrite",
    "update", "write",
];

const CODING_NOUNS: &[&str] = &[
    "api", "bug", "class", "code", "compile", "endpoint", "error", "exception", "feature",
    "function", "method", "module", "struct", "test", "tests", "trait", "type", "variable",
];

const CODE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cs", "css", "go", "h", "hpp", "html", "java", "js", "jsx", "kt", "php",
    "py", "rb", "rs", "scss", "sh", "sql", "swift", "toml", "ts", "tsx", "yaml", "yml",
];

/// Whether the task should run through the edit-test loop.
///
/// Requires at least one target file and a coding verb in the task text,
/// together with either a coding noun or a `name.ext` file reference.
pub fn is_coding_task<P: AsRef<Path>>(task: &str, files: &[P]) -> bool {
    if files.is_empty() {
        return false;
    }
    let lowered = task.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '.' && c != '_')
        .map(|word| word.trim_end_matches('.'))
        .filter(|word| !word.is_empty())
        .collect();

    let has_verb = words.iter().any(|word| CODING_VERBS.contains(word));
    let has_noun = words.iter().any(|word| CODING_NOUNS.contains(word));
    let has_file_ref = words.iter().any(|word| has_code_extension(Path::new(word)));
    has_verb && (has_noun || has_file_ref)
}

fn has_code_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
