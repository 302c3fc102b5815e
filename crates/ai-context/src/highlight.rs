//! Sentence splitting and keyword-scored highlight selection shared by
//! step 2's condensed summaries (§4.7).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:[。.!?？!])\s+").unwrap());
static HAS_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

pub const DEFAULT_HIGHLIGHT_KEYWORDS: &[&str] = &[
    "federal reserve",
    "fed",
    "interest rate",
    "rate cut",
    "rates",
    "fomc",
    "inflation",
    "tariff",
    "treasury",
    "yield",
    "economic",
    "growth",
    "policy",
];

pub fn extract_sentences(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut sentences = Vec::new();
    let mut last_end = 0;
    for m in SENTENCE_BOUNDARY.find_iter(text) {
        let piece = text[last_end..m.end()].trim();
        if !piece.is_empty() {
            sentences.push(piece.to_string());
        }
        last_end = m.end();
    }
    let tail = text[last_end..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Scores each candidate sentence by keyword hits (3 points each) plus a
/// point for containing a digit, keeps the top `max_sentences` by score
/// (ties broken by original order), then re-orders the winners back to
/// their original position. Falls back to the leading sentences when
/// nothing scores.
pub fn select_highlight_sentences(
    sentences: &[String],
    keywords: &[String],
    exclude_lower: &HashSet<String>,
    max_sentences: usize,
) -> Vec<String> {
    let mut scored: Vec<(i32, usize, &String)> = Vec::new();
    for (idx, sent) in sentences.iter().enumerate() {
        let lower = sent.to_lowercase();
        if exclude_lower.contains(&lower) {
            continue;
        }
        let mut score = 0i32;
        for kw in keywords {
            if !kw.is_empty() && lower.contains(&kw.to_lowercase()) {
                score += 3;
            }
        }
        if HAS_DIGIT.is_match(sent) {
            score += 1;
        }
        if score > 0 {
            scored.push((score, idx, sent));
        }
    }

    if scored.is_empty() {
        return sentences.iter().take(max_sentences).cloned().collect();
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut selected: Vec<(usize, &String)> = scored.into_iter().take(max_sentences).map(|(_, idx, s)| (idx, s)).collect();
    selected.sort_by_key(|(idx, _)| *idx);
    selected.into_iter().map(|(_, s)| s.clone()).collect()
}
