//! Extractive summary.

use crate::utils::truncate_chars;

pub const DISCLAIMER: &str = "[This is a summarized version of the original article. \
                              Read the full article for complete details.]";

const CANDIDATE_SENTENCES: usize = 10;
const MIN_SENTENCE_CHARS: usize = 20;
const MAX_SENTENCES: usize = 3;
const FALLBACK_CHARS: usize = 500;

/// First substantial sentences of `text`, followed by [`DISCLAIMER`].
///
/// Only the first ten sentences are considered; up to three longer than
/// twenty characters are kept. When none qualify, the text is returned
/// truncated to 500 characters with `...`, or unchanged when shorter.
pub fn summarize(text: &str) -> String {
    let picked: Vec<&str> = text
        .split(['.', '!', '?'])
        .take(CANDIDATE_SENTENCES)
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .take(MAX_SENTENCES)
        .collect();

    if !picked.is_empty() {
        return format!("{}.\n\n{DISCLAIMER}", picked.join(". "));
    }

    if text.chars().count() > FALLBACK_CHARS {
        format!("{}...", truncate_chars(text, FALLBACK_CHARS))
    } else {
        text.to_string()
    }
}
