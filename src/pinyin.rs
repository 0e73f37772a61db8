//! Pinyin reading for question prompts (tone diacritics, one syllable per Hanzi).
//!
//! Example:
//!   prompt: "潜移默化"
//!   pinyin: "qián yí mò huà"
use pinyin::ToPinyin;

/// Pinyin for the Hanzi in `prompt`, space-separated. Non-Hanzi characters are
/// dropped. Returns None when the prompt has no Hanzi at all.
///
/// Per-character conversion with no word segmentation, so polyphonic characters
/// get their default reading.
pub fn prompt_pinyin(prompt: &str) -> Option<String> {
    let syllables: Vec<&str> = prompt
        .to_pinyin()
        .flatten()
        .map(|py| py.with_tone())
        .collect();

    if syllables.is_empty() {
        None
    } else {
        Some(syllables.join(" "))
    }
}
