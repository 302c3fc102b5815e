//! Step 2 (§4.7): full-text-only articles, condensed to a short summary
//! plus a keyword-scored highlight line, each block capped at 1200 chars.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use context_core::Article;

use crate::highlight::{extract_sentences, select_highlight_sentences, DEFAULT_HIGHLIGHT_KEYWORDS};

const NO_ARTICLES_MESSAGE: &str =
    "No articles with full text available to generate Step 2 AI context for this date and ticker.";
const MAX_CHARS: usize = 1200;
const MAX_HIGHLIGHT_SENTENCES: usize = 3;

fn is_eligible(article: &Article) -> bool {
    article.extraction.fulltext_ok && !article.extraction.content.trim().is_empty()
}

fn sort_key(article: &Article) -> (usize, DateTime<Utc>) {
    (article.metrics.content_len, article.published)
}

/// Condensed summary + "Highlights:" line, truncated to `MAX_CHARS` on a
/// whitespace boundary with a trailing ellipsis.
pub fn build_condensed_content(article: &Article, keywords: &[String]) -> String {
    let full_text = article.extraction.content.trim();
    let mut summary = article.extraction.summary.trim().to_string();
    if summary.is_empty() {
        let sentences = extract_sentences(full_text);
        summary = if !sentences.is_empty() {
            sentences.iter().take(3).cloned().collect::<Vec<_>>().join(" ")
        } else {
            full_text.chars().take(300).collect()
        };
        summary = summary.trim().to_string();
    }

    let mut highlight_text = String::new();
    if !full_text.is_empty() {
        let sentences = extract_sentences(full_text);
        let highlight_keywords: Vec<String> = if keywords.is_empty() {
            DEFAULT_HIGHLIGHT_KEYWORDS.iter().map(|s| s.to_string()).collect()
        } else {
            keywords.to_vec()
        };
        let summary_sentences = extract_sentences(&summary);
        let exclude: HashSet<String> = summary_sentences.iter().map(|s| s.to_lowercase()).collect();
        let highlights = select_highlight_sentences(&sentences, &highlight_keywords, &exclude, MAX_HIGHLIGHT_SENTENCES);
        if !highlights.is_empty() {
            highlight_text = format!("Highlights: {}", highlights.join(" "));
        }
    }

    let mut parts = Vec::new();
    if !summary.is_empty() {
        parts.push(summary);
    }
    if !highlight_text.is_empty() {
        parts.push(highlight_text);
    }
    if parts.is_empty() {
        return String::new();
    }

    let condensed = parts.join("\n").trim().to_string();
    if condensed.chars().count() <= MAX_CHARS {
        return condensed;
    }
    let truncated: String = condensed.chars().take(MAX_CHARS).collect();
    match truncated.rsplit_once(' ') {
        Some((head, _)) => format!("{}...", head.trim_end()),
        None => format!("{}...", truncated.trim_end()),
    }
}

pub fn build(
    articles: &[Article],
    entity_label: &str,
    date: &str,
    generated_at_local: &str,
    timezone_label: &str,
    max_articles_for_context: Option<usize>,
    highlight_keywords: &[String],
) -> String {
    let mut eligible: Vec<&Article> = articles.iter().filter(|a| is_eligible(a)).collect();
    eligible.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    if let Some(cap) = max_articles_for_context.filter(|c| *c > 0) {
        eligible.truncate(cap);
    }

    if eligible.is_empty() {
        return NO_ARTICLES_MESSAGE.to_string();
    }

    let mut blocks = vec![
        format!("--- News AI Context for {} on {date} ---", entity_label.to_uppercase()),
        format!("Generated at (Local {timezone_label}): {generated_at_local}"),
        "Step 2: Filtered and summarised news. This step removes articles without full text \
and uses only the summary of the remaining articles."
            .to_string(),
        String::new(),
    ];

    for (i, article) in eligible.iter().enumerate() {
        let summary = build_condensed_content(article, highlight_keywords);
        blocks.push(format!(
            "--- Article {} ---\nTitle: {}\nSource: {}\nPublished Date: {}\nURL: {}\nSummary:\n{}\n",
            i + 1,
            article.title.trim(),
            article.source.trim(),
            article.published.to_rfc3339(),
            article.url,
            summary
        ));
    }

    blocks.join("\n\n")
}
