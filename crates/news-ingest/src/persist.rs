//! Persisted article path and manifest path conventions (§4.6 step 9).

use chrono::{DateTime, Utc};

/// `raw-news/{date}/{entity_storage_path}/{timestamp}_{slug(source)}_{slug(title)[:60]}_{url_hash[:8]}.json`
pub fn article_path(
    date: &str,
    entity_storage_path: &str,
    now: DateTime<Utc>,
    source: &str,
    title: &str,
    url_hash: &str,
) -> String {
    let title_slug = slug::slugify(title);
    let title_slug: String = title_slug.chars().take(60).collect();
    let source_slug = slug::slugify(source);
    let hash_prefix = &url_hash[..url_hash.len().min(8)];
    format!(
        "raw-news/{date}/{entity_storage_path}/{ts}_{source_slug}_{title_slug}_{hash_prefix}.json",
        ts = now.timestamp()
    )
}

/// `raw-news/{date}/.manifest.json` — one manifest per date, shared by
/// every entity crawled that day. Not nested under any entity segment: the
/// manifest is the dedupe ledger for the whole day's crawl, not one
/// ticker's slice of it.
pub fn manifest_path(date: &str) -> String {
    format!("raw-news/{date}/.manifest.json")
}
