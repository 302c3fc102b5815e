//! News ingest pipeline (§4.6): feed entries in, deduplicated `Article`s and
//! manifest updates out. Nine steps per entry — parse is the caller's job
//! (via `news-feed-client::FeedAdapter`), everything from canonicalization
//! through persistence path assignment lives here.

pub mod article;
pub mod canonicalize;
pub mod crawl;
pub mod dedupe;
pub mod filters;
pub mod persist;
pub mod summarize;

use chrono::{DateTime, Utc};
use context_core::{EntityConfig, FeedEntry, Manifest, WebFetcher};

pub use crawl::{crawl_entity, CrawlOutcome};
pub use filters::FilterOutcome;

/// Per-entry outcome, surfaced for observability even when nothing is
/// persisted. Grounded on the original crawler's pre-filter/content-filter
/// diagnostic helpers, which log *why* an entry was skipped rather than
/// silently dropping it.
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Kept { path: String, dedupe_hash: String },
    DroppedTooOld,
    DroppedDuplicate,
    DroppedFilter(FilterOutcome),
    FetchFailed(String),
}

#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub articles: Vec<context_core::Article>,
    /// `(dedupe_hash, persisted_path)` pairs appended to the manifest, in
    /// persistence order.
    pub manifest_updates: Vec<(String, String)>,
    /// One diagnostic per input entry, in feed-parse order.
    pub diagnostics: Vec<EntryOutcome>,
}

/// Runs the full per-entity ingest pipeline over already-concatenated feed
/// entries. `existing_manifest` gates dedupe; `force` bypasses it. Does not
/// write to storage itself — callers persist `articles` at the paths
/// recorded in `manifest_updates` and append those pairs to the manifest.
pub async fn ingest_entity(
    entity: &EntityConfig,
    entries: Vec<FeedEntry>,
    web_fetcher: &dyn WebFetcher,
    existing_manifest: &Manifest,
    force: bool,
    now: DateTime<Utc>,
    date: &str,
    news_type: &str,
    topic: Option<&str>,
    topic_group: Option<&str>,
) -> IngestOutcome {
    let mut dated: Vec<(DateTime<Utc>, FeedEntry)> =
        entries.into_iter().map(|e| (parse_published(&e).unwrap_or(now), e)).collect();
    dated.sort_by(|a, b| b.0.cmp(&a.0));

    let mut outcome = IngestOutcome::default();
    let mut seen_hashes: Vec<String> = Vec::new();

    for (published, entry) in dated {
        if outcome.articles.len() >= entity.max_articles {
            break;
        }

        let age_hours = (now - published).num_minutes() as f64 / 60.0;
        if age_hours > entity.max_age_hours as f64 {
            outcome.diagnostics.push(EntryOutcome::DroppedTooOld);
            continue;
        }

        let hash = dedupe::dedupe_hash(&entry.title, &entry.source_title, published);
        if !force && (existing_manifest.contains(&hash) || seen_hashes.contains(&hash)) {
            outcome.diagnostics.push(EntryOutcome::DroppedDuplicate);
            continue;
        }

        let (raw_url, canonical_url) = canonicalize::canonicalize(&entry);
        let domain = canonicalize::domain_of(&canonical_url);

        let pre = filters::pre_filter(entity, &entry.title, &entry.summary, &entry.source_title, &domain);
        if !pre.passed() {
            outcome.diagnostics.push(EntryOutcome::DroppedFilter(pre));
            continue;
        }

        let body = match web_fetcher.extract_body(&canonical_url).await {
            Ok(b) => b,
            Err(e) if e.is_transient() => {
                outcome.diagnostics.push(EntryOutcome::FetchFailed(e.to_string()));
                continue;
            }
            Err(_) => None,
        };

        let content = filters::content_filter(entity, body.as_deref(), &entry.summary);
        if !content.passed() {
            outcome.diagnostics.push(EntryOutcome::DroppedFilter(content));
            continue;
        }

        let url_hash = dedupe::url_hash(&canonical_url);
        let article = article::build_article(
            format!("{date}-{}-{}", entity.key, &url_hash[..16]),
            entity.key.clone(),
            date.to_string(),
            entry.title.clone(),
            canonical_url,
            Some(raw_url),
            published,
            entry.source_title.clone(),
            body,
            &entry.summary,
            news_type.to_string(),
            topic.map(str::to_string),
            topic_group.map(str::to_string),
        );

        let path = persist::article_path(date, &entity.storage_path, now, &entry.source_title, &entry.title, &url_hash);

        seen_hashes.push(hash.clone());
        outcome.manifest_updates.push((hash.clone(), path.clone()));
        outcome.diagnostics.push(EntryOutcome::Kept { path, dedupe_hash: hash });
        outcome.articles.push(article);
    }

    outcome
}

fn parse_published(entry: &FeedEntry) -> Option<DateTime<Utc>> {
    let raw = entry.published_raw.as_deref()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc2822(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use context_core::{EngineError, EngineResult, FetchedPage};

    struct StubFetcher {
        body: Option<String>,
    }

    #[async_trait]
    impl WebFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> EngineResult<FetchedPage> {
            Err(EngineError::config("unused in tests"))
        }

        async fn extract_body(&self, _url: &str) -> EngineResult<Option<String>> {
            Ok(self.body.clone())
        }
    }

    fn entity() -> EntityConfig {
        EntityConfig {
            key: "AAPL".into(),
            identifier: "AAPL".into(),
            storage_path: "equities/AAPL".into(),
            group: "equity".into(),
            rss_sources: vec![],
            required_keywords: vec![],
            excluded_keywords: vec![],
            source_allowlist: vec![],
            source_blocklist: vec![],
            highlight_keywords: vec![],
            min_content_length: 0,
            min_summary_length: 0,
            require_full_text: false,
            enforce_content_filters: false,
            max_articles: 10,
            max_age_hours: 48,
            aliases: vec![],
        }
    }

    fn entry(title: &str, published_raw: &str) -> FeedEntry {
        FeedEntry {
            title: title.to_string(),
            link: "https://example.com/a".to_string(),
            summary: "A short summary sentence.".to_string(),
            source_title: "Reuters".to_string(),
            published_raw: Some(published_raw.to_string()),
            origlink: None,
        }
    }

    #[tokio::test]
    async fn keeps_fresh_entry_and_builds_article() {
        let now = Utc::now();
        let fetcher = StubFetcher { body: Some("Full body text goes here for extraction purposes.".into()) };
        let manifest = Manifest::default();
        let e = entry("Apple beats earnings", &now.to_rfc3339());

        let outcome =
            ingest_entity(&entity(), vec![e], &fetcher, &manifest, false, now, "2026-07-28", "equity", None, None).await;

        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.manifest_updates.len(), 1);
        assert!(matches!(outcome.diagnostics[0], EntryOutcome::Kept { .. }));
    }

    #[tokio::test]
    async fn drops_entry_older_than_max_age() {
        let now = Utc::now();
        let old = now - chrono::Duration::hours(72);
        let fetcher = StubFetcher { body: None };
        let manifest = Manifest::default();
        let e = entry("Old news", &old.to_rfc3339());

        let outcome =
            ingest_entity(&entity(), vec![e], &fetcher, &manifest, false, now, "2026-07-28", "equity", None, None).await;

        assert!(outcome.articles.is_empty());
        assert!(matches!(outcome.diagnostics[0], EntryOutcome::DroppedTooOld));
    }

    #[tokio::test]
    async fn skips_duplicate_already_in_manifest() {
        let now = Utc::now();
        let fetcher = StubFetcher { body: None };
        let e = entry("Apple beats earnings", &now.to_rfc3339());
        let hash = dedupe::dedupe_hash(&e.title, &e.source_title, now);
        let mut manifest = Manifest::default();
        manifest.record(hash, "raw-news/2026-07-28/equities/AAPL/existing.json".into());

        let outcome =
            ingest_entity(&entity(), vec![e], &fetcher, &manifest, false, now, "2026-07-28", "equity", None, None).await;

        assert!(outcome.articles.is_empty());
        assert!(matches!(outcome.diagnostics[0], EntryOutcome::DroppedDuplicate));
    }

    #[tokio::test]
    async fn caps_at_max_articles_after_sorting_descending() {
        let now = Utc::now();
        let fetcher = StubFetcher { body: None };
        let mut e = entity();
        e.max_articles = 1;
        let older = entry("Older", &(now - chrono::Duration::hours(1)).to_rfc3339());
        let newer = entry("Newer", &now.to_rfc3339());
        let manifest = Manifest::default();

        let outcome =
            ingest_entity(&e, vec![older, newer], &fetcher, &manifest, false, now, "2026-07-28", "equity", None, None)
                .await;

        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.articles[0].title, "Newer");
    }
}
