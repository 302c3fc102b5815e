use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineResult;
use crate::types::{FinancialSnapshot, OhlcvRow};

/// Result of a `list(prefix)` call against [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub path: String,
}

/// Uniform content-addressed store over an object store or a local
/// filesystem fallback (§4.1). All writes are whole-object; there is no
/// partial-write surface.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> EngineResult<()>;

    /// Creates only when `path` is absent. Returns `Ok(false)` on a
    /// precondition-failed conflict rather than raising.
    async fn put_if_absent(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> EngineResult<bool>;

    async fn get(&self, path: &str) -> EngineResult<Option<Vec<u8>>>;

    async fn list(&self, prefix: &str) -> EngineResult<Vec<BlobMeta>>;

    /// Age of the object derived from its stored `discovered_at`/`fetched_at`
    /// payload field, not from object-store metadata.
    async fn age(&self, path: &str, now: DateTime<Utc>) -> EngineResult<Option<chrono::Duration>>;
}

/// A single quote snapshot from the market-data adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub as_of: DateTime<Utc>,
}

/// Market-data adapter (§4.3): quote, OHLCV history, statements, and the
/// earnings calendar, normalized to timezone-naive UTC at 00:00:00 for
/// daily granularity.
#[async_trait]
pub trait MarketDataAdapter: Send + Sync {
    async fn quote(&self, ticker: &str) -> EngineResult<Quote>;

    async fn history(
        &self,
        ticker: &str,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> EngineResult<Vec<OhlcvRow>>;

    async fn statements(&self, ticker: &str) -> EngineResult<FinancialSnapshot>;

    async fn earnings_calendar(&self, ticker: &str) -> EngineResult<Option<String>>;
}

/// Supplemental to the distilled spec (see SPEC_FULL §2): the financial
/// refresh gate consults a next-earnings-date source that may be the market
/// data adapter itself or a peer engine call. Kept as its own narrow trait
/// so `cache-singleflight`'s refresh policy doesn't hard-code a transport.
#[async_trait]
pub trait EarningsCalendarSource: Send + Sync {
    async fn next_earnings_date(&self, ticker: &str) -> EngineResult<Option<String>>;
}

#[async_trait]
impl<T: MarketDataAdapter> EarningsCalendarSource for T {
    async fn next_earnings_date(&self, ticker: &str) -> EngineResult<Option<String>> {
        self.earnings_calendar(ticker).await
    }
}

/// A single untrusted feed entry, before canonicalization (§4.6 step 1).
#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source_title: String,
    /// Raw published-time string as the feed provided it, if any.
    pub published_raw: Option<String>,
    /// `feedburner:origLink`-style extension field some feeds carry
    /// alongside a redirector `link`, preferred by canonicalization when set.
    pub origlink: Option<String>,
}

/// RSS/Atom feed adapter (§4.3).
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    async fn parse(&self, url: &str) -> EngineResult<Vec<FeedEntry>>;
}

/// A bounded page fetch result (§4.3): size-capped, browser-like UA.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub content_type: String,
    pub title: String,
    pub text_snippet: String,
    pub links: Vec<String>,
}

/// Web-page fetcher (§4.3): bounded fetch plus a separate full-text
/// extraction call.
#[async_trait]
pub trait WebFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> EngineResult<FetchedPage>;

    /// Downloads and extracts the main body text via a structured
    /// heuristic. Returns `None` rather than erroring when extraction
    /// yields nothing usable.
    async fn extract_body(&self, url: &str) -> EngineResult<Option<String>>;
}

/// Search adapter used by the report-source resolver (§4.3, §4.9).
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> EngineResult<Vec<String>>;
}
