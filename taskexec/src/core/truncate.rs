//! Head+tail text truncation for prompts, checkpoints and summaries.

/// Keep the head and tail of `text` so the result is at most about `limit` chars.
///
/// The middle is replaced by a marker that states how many chars were dropped.
/// Cuts always land on char boundaries.
pub fn truncate_middle(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let head_len = limit / 2;
    let tail_len = limit - head_len;
    let dropped = total - head_len - tail_len;

    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();
    format!("{head}\n... [{dropped} chars truncated] ...\n{tail}")
}

/// Keep only the first `limit` chars, appending `...` when something was cut.
pub fn truncate_head(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push_str("...");
    out
}
