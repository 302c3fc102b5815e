//! Step 1 (§4.7): raw concatenation of every article that clears a low
//! quality bar, full text preferred over summary.

use chrono::{DateTime, Utc};
use context_core::Article;

const NO_ARTICLES_MESSAGE: &str = "No high-quality news articles found to generate AI context for this date and ticker.";

fn is_eligible(article: &Article) -> bool {
    (article.extraction.fulltext_ok && article.metrics.content_len > 50)
        || (!article.extraction.summary.trim().is_empty() && article.extraction.summary.trim().chars().count() > 20)
}

fn sort_key(article: &Article) -> (bool, usize, DateTime<Utc>) {
    (article.extraction.fulltext_ok, article.metrics.content_len, article.published)
}

pub fn build(
    articles: &[Article],
    entity_label: &str,
    date: &str,
    generated_at_local: &str,
    timezone_label: &str,
    max_articles_for_context: Option<usize>,
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
        "Step 1: Raw news concatenation. This step concatenates the raw news articles \
(using full text when available, otherwise the summary)."
            .to_string(),
        String::new(),
    ];

    for (i, article) in eligible.iter().enumerate() {
        let content = if article.extraction.fulltext_ok && !article.extraction.content.is_empty() {
            article.extraction.content.as_str()
        } else {
            article.extraction.summary.as_str()
        };
        if content.trim().is_empty() {
            continue;
        }
        blocks.push(format!(
            "--- Article {} ---\nTitle: {}\nSource: {}\nPublished Date: {}\nURL: {}\nContent:\n{}\n",
            i + 1,
            article.title.trim(),
            article.source.trim(),
            article.published.to_rfc3339(),
            article.url,
            content
        ));
    }

    blocks.join("\n\n")
}
