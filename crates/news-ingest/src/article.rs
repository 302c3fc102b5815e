//! Article assembly (§4.6 step 8).

use chrono::{DateTime, Utc};
use context_core::{Article, ArticleMetrics, Extraction};

use crate::summarize::{first_sentences, strip_html};

#[allow(clippy::too_many_arguments)]
pub fn build_article(
    id: String,
    entity_id: String,
    date: String,
    title: String,
    canonical_url: String,
    rss_link: Option<String>,
    published: DateTime<Utc>,
    source: String,
    body: Option<String>,
    feed_summary: &str,
    news_type: String,
    topic: Option<String>,
    topic_group: Option<String>,
) -> Article {
    let fulltext_ok = body.as_deref().map(|b| !b.trim().is_empty()).unwrap_or(false);
    let summary = if fulltext_ok {
        first_sentences(body.as_deref().unwrap_or_default(), 3)
    } else {
        first_sentences(&strip_html(feed_summary), 3)
    };
    let content = body.unwrap_or_default();
    let metrics = ArticleMetrics { title_len: title.chars().count(), content_len: content.chars().count() };

    Article {
        id,
        entity_id,
        date,
        title,
        url: canonical_url,
        rss_link,
        published,
        source,
        extraction: Extraction { summary, content, fulltext_ok },
        metrics,
        news_type,
        topic,
        topic_group,
    }
}
