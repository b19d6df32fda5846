//! Parser for edit blocks in model responses.
//!
//! Two block kinds are recognized, in any number and order:
//!
//! ```text
//! <<<EDIT file="src/calc.py">>>
//! <<<OLD>>>
//! return a - b
//! <<<NEW>>>
//! return a + b
//! <<<END>>>
//!
//! <<<CREATE file="tests/test_calc.py">>>
//! ...full file contents...
//! <<<END>>>
//! ```
//!
//! Anything outside blocks is ignored. Exactly one newline directly after an
//! opening marker and directly before a closing marker is part of the syntax,
//! not the content.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::core::types::Edit;

const OLD_MARKER: &str = "<<<OLD>>>";
const NEW_MARKER: &str = "<<<NEW>>>";

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<<<(EDIT|CREATE)\s+file="([^"]+)"\s*>>>(.*?)<<<END>>>"#)
        .expect("edit block regex should compile")
});

/// Parse all edit blocks from `response`, preserving their order.
///
/// Malformed `EDIT` blocks (missing markers or an empty `OLD` section) are
/// skipped with a warning.
pub fn parse_edits(response: &str) -> Vec<Edit> {
    let mut edits = Vec::new();
    for caps in BLOCK_RE.captures_iter(response) {
        let kind = &caps[1];
        let file_path = caps[2].trim().to_string();
        let body = caps.get(3).map_or("", |m| m.as_str());

        if kind == "CREATE" {
            edits.push(Edit {
                file_path,
                old_content: String::new(),
                new_content: strip_block(body).to_string(),
                is_create: true,
            });
            continue;
        }

        match split_edit_body(body) {
            Some((old, new)) if !old.is_empty() => edits.push(Edit {
                file_path,
                old_content: old.to_string(),
                new_content: new.to_string(),
                is_create: false,
            }),
            Some(_) => warn!(file = %file_path, "skipping edit block with empty OLD section"),
            None => warn!(file = %file_path, "skipping malformed edit block"),
        }
    }
    edits
}

fn split_edit_body(body: &str) -> Option<(&str, &str)> {
    let old_at = body.find(OLD_MARKER)?;
    if !body[..old_at].trim().is_empty() {
        return None;
    }
    let after_old = &body[old_at + OLD_MARKER.len()..];
    let new_at = after_old.find(NEW_MARKER)?;
    let old = strip_block(&after_old[..new_at]);
    let new = strip_block(&after_old[new_at + NEW_MARKER.len()..]);
    Some((old, new))
}

fn strip_block(text: &str) -> &str {
    let text = text
        .strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text);
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}
