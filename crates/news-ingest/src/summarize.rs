//! Summary generation (§4.6 step 8): first three sentences of the body, or
//! of the HTML-stripped feed summary when no body was extracted.

use once_cell::sync::Lazy;
use regex::Regex;

/// Splits on a run of whitespace immediately following a terminal
/// punctuation mark (Chinese or English), mirroring the Python lookbehind
/// split without requiring variable-width lookbehind support.
static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:[。.!?？!])\s+").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn strip_html(input: &str) -> String {
    let without_tags = HTML_TAG.replace_all(input, " ");
    WHITESPACE_RUN.replace_all(without_tags.trim(), " ").to_string()
}

/// First `count` sentences of `text`, trimmed. Empty input yields an empty
/// string rather than a single-element vec of `""`.
pub fn first_sentences(text: &str, count: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut pieces: Vec<&str> = Vec::new();
    let mut last_end = 0;
    for m in SENTENCE_BOUNDARY.find_iter(trimmed) {
        pieces.push(trimmed[last_end..m.end()].trim());
        last_end = m.end();
        if pieces.len() >= count {
            break;
        }
    }
    if pieces.len() < count && last_end < trimmed.len() {
        pieces.push(trimmed[last_end..].trim());
    }
    pieces.retain(|p| !p.is_empty());
    pieces.truncate(count);
    pieces.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags_and_collapses_whitespace() {
        assert_eq!(strip_html("<p>Hello   <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn first_sentences_takes_exactly_three() {
        let text = "One. Two. Three. Four.";
        assert_eq!(first_sentences(text, 3), "One. Two. Three.");
    }

    #[test]
    fn first_sentences_handles_fewer_than_requested() {
        assert_eq!(first_sentences("Only one sentence here", 3), "Only one sentence here");
    }

    #[test]
    fn first_sentences_of_empty_text_is_empty() {
        assert_eq!(first_sentences("   ", 3), "");
    }
}
