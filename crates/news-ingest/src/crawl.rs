//! Composed per-entity crawl (§6): fetches every configured feed source,
//! runs the nine-step ingest pipeline over the concatenated entries, and
//! persists the kept articles plus the shared per-date manifest.
//!
//! [`ingest_entity`]'s own doc comment is explicit that it neither fetches
//! feeds nor writes to storage — this is that missing wiring, composed the
//! same way `financial-engine`/`trading-data-engine` compose their own
//! adapter-plus-storage operations.

use chrono::{DateTime, Utc};
use context_core::{EngineError, EngineResult, EntityConfig, FeedAdapter, FeedEntry, Manifest, Storage, WebFetcher};

use crate::persist::manifest_path;
use crate::{ingest_entity, EntryOutcome};

/// `crawl_entity(entity_key, date?, force?, max_articles?) → {new_count,
/// skipped_count, total_count}` (§6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub new_count: usize,
    pub skipped_count: usize,
    pub total_count: usize,
}

/// Fetches `entity.rss_sources`, concatenates whatever parses, ingests, and
/// persists. A source that fails to parse is logged and skipped rather than
/// failing the whole crawl — one dead feed shouldn't block every other
/// source configured for the same entity.
#[allow(clippy::too_many_arguments)]
pub async fn crawl_entity(
    entity: &EntityConfig,
    feed_adapter: &dyn FeedAdapter,
    web_fetcher: &dyn WebFetcher,
    storage: &dyn Storage,
    force: bool,
    now: DateTime<Utc>,
    date: &str,
    news_type: &str,
    topic: Option<&str>,
    topic_group: Option<&str>,
) -> EngineResult<CrawlOutcome> {
    let entries = fetch_all_sources(entity, feed_adapter).await;
    let total_count = entries.len();

    let manifest_key = manifest_path(date);
    let mut manifest = load_manifest(storage, &manifest_key).await?;

    let outcome =
        ingest_entity(entity, entries, web_fetcher, &manifest, force, now, date, news_type, topic, topic_group).await;

    for (article, (_, path)) in outcome.articles.iter().zip(outcome.manifest_updates.iter()) {
        let bytes = serde_json::to_vec(article)
            .map_err(|e| EngineError::consistency(format!("serializing article {}: {e}", article.id)))?;
        storage.put(path, bytes, "application/json", None).await?;
    }

    if !outcome.manifest_updates.is_empty() {
        for (hash, path) in outcome.manifest_updates {
            manifest.record(hash, path);
        }
        let bytes = serde_json::to_vec(&manifest)
            .map_err(|e| EngineError::consistency(format!("serializing manifest for {date}: {e}")))?;
        storage.put(&manifest_key, bytes, "application/json", None).await?;
    }

    // Every entry considered but not kept counts as skipped, whatever the
    // reason (too old, duplicate, filtered, fetch failure) — entries beyond
    // `max_articles` are never considered at all and so are neither new nor
    // skipped, mirroring the original crawler's pre-loop truncation.
    let skipped_count = outcome.diagnostics.iter().filter(|d| !matches!(d, EntryOutcome::Kept { .. })).count();

    Ok(CrawlOutcome { new_count: outcome.articles.len(), skipped_count, total_count })
}

async fn fetch_all_sources(entity: &EntityConfig, feed_adapter: &dyn FeedAdapter) -> Vec<FeedEntry> {
    let mut entries = Vec::new();
    for source in &entity.rss_sources {
        match feed_adapter.parse(source).await {
            Ok(mut parsed) => entries.append(&mut parsed),
            Err(e) => tracing::warn!(source, error = %e, "feed source failed, skipping"),
        }
    }
    entries
}

async fn load_manifest(storage: &dyn Storage, path: &str) -> EngineResult<Manifest> {
    match storage.get(path).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::consistency(format!("malformed manifest at {path}: {e}"))),
        None => Ok(Manifest::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use context_core::{BlobMeta, FetchedPage};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct StubFeed(Vec<FeedEntry>);

    #[async_trait]
    impl FeedAdapter for StubFeed {
        async fn parse(&self, _url: &str) -> EngineResult<Vec<FeedEntry>> {
            Ok(self.0.clone())
        }
    }

    struct NoBodyFetcher;

    #[async_trait]
    impl WebFetcher for NoBodyFetcher {
        async fn fetch(&self, _url: &str) -> EngineResult<FetchedPage> {
            Err(EngineError::config("unused in tests"))
        }
        async fn extract_body(&self, _url: &str) -> EngineResult<Option<String>> {
            Ok(None)
        }
    }

    struct MemStorage(Mutex<HashMap<String, Vec<u8>>>);

    impl MemStorage {
        fn empty() -> Self {
            Self(Mutex::new(HashMap::new()))
        }
    }

    #[async_trait]
    impl Storage for MemStorage {
        async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str, _cache_control: Option<&str>) -> EngineResult<()> {
            self.0.lock().await.insert(path.to_string(), bytes);
            Ok(())
        }
        async fn put_if_absent(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> EngineResult<bool> {
            if self.0.lock().await.contains_key(path) {
                return Ok(false);
            }
            self.put(path, bytes, content_type, None).await?;
            Ok(true)
        }
        async fn get(&self, path: &str) -> EngineResult<Option<Vec<u8>>> {
            Ok(self.0.lock().await.get(path).cloned())
        }
        async fn list(&self, prefix: &str) -> EngineResult<Vec<BlobMeta>> {
            Ok(self.0.lock().await.keys().filter(|k| k.starts_with(prefix)).map(|k| BlobMeta { path: k.clone() }).collect())
        }
        async fn age(&self, _path: &str, _now: DateTime<Utc>) -> EngineResult<Option<chrono::Duration>> {
            Ok(None)
        }
    }

    fn entity() -> EntityConfig {
        EntityConfig {
            key: "AAPL".into(),
            identifier: "AAPL".into(),
            storage_path: "equities/AAPL".into(),
            group: "equity".into(),
            rss_sources: vec!["https://feed.example/aapl".into()],
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

    fn five_entries(now: DateTime<Utc>) -> Vec<FeedEntry> {
        (0..5)
            .map(|i| FeedEntry {
                title: format!("Apple headline {i}"),
                link: format!("https://example.com/a{i}"),
                summary: "A short summary sentence about Apple.".into(),
                source_title: "Reuters".into(),
                published_raw: Some((now - chrono::Duration::minutes(i)).to_rfc3339()),
                origlink: None,
            })
            .collect()
    }

    /// §8: cold ingest of 5 AAPL articles yields `{5, 0, 5}` and persists
    /// 5 article files plus a 5-hash manifest; an identical second call
    /// yields `{0, 5, 5}` with nothing new written.
    #[tokio::test]
    async fn cold_then_repeat_crawl_matches_new_skipped_total_counts() {
        let now = Utc::now();
        let feed = StubFeed(five_entries(now));
        let fetcher = NoBodyFetcher;
        let storage = MemStorage::empty();
        let e = entity();

        let first = crawl_entity(&e, &feed, &fetcher, &storage, false, now, "2025-02-03", "equity", None, None)
            .await
            .unwrap();
        assert_eq!(first, CrawlOutcome { new_count: 5, skipped_count: 0, total_count: 5 });

        let article_files = storage.list("raw-news/2025-02-03/equities/AAPL/").await.unwrap();
        assert_eq!(article_files.len(), 5);

        let manifest_bytes = storage.get(&manifest_path("2025-02-03")).await.unwrap().unwrap();
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes).unwrap();
        assert_eq!(manifest.hashes.len(), 5);

        let second = crawl_entity(&e, &feed, &fetcher, &storage, false, now, "2025-02-03", "equity", None, None)
            .await
            .unwrap();
        assert_eq!(second, CrawlOutcome { new_count: 0, skipped_count: 5, total_count: 5 });

        let article_files_after = storage.list("raw-news/2025-02-03/equities/AAPL/").await.unwrap();
        assert_eq!(article_files_after.len(), 5);
    }

    #[tokio::test]
    async fn a_failing_feed_source_is_skipped_not_fatal() {
        struct FailingFeed;
        #[async_trait]
        impl FeedAdapter for FailingFeed {
            async fn parse(&self, _url: &str) -> EngineResult<Vec<FeedEntry>> {
                Err(EngineError::TransientUpstream("feed down".into()))
            }
        }

        let now = Utc::now();
        let storage = MemStorage::empty();
        let result = crawl_entity(&entity(), &FailingFeed, &NoBodyFetcher, &storage, false, now, "2025-02-03", "equity", None, None)
            .await
            .unwrap();
        assert_eq!(result, CrawlOutcome { new_count: 0, skipped_count: 0, total_count: 0 });
    }
}
