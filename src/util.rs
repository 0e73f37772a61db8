//! Small utility helpers used across modules.

/// Normalize a free-text answer for comparison.
/// Drops whitespace and punctuation (ASCII and CJK) and lowercases ASCII letters,
/// so "To eat!" and "to eat" compare equal. Han characters are kept as-is.
pub fn normalize_answer(s: &str) -> String {
  s.chars()
    .filter(|c| c.is_alphanumeric())
    .map(|c| c.to_ascii_lowercase())
    .collect()
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    None => s.to_string(),
    Some((idx, _)) => format!("{}… ({} bytes total)", &s[..idx], s.len()),
  }
}
