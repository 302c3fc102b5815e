use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three kinds of entity the pipeline tracks. Equities drive all
/// three engines; topics and persons only ever run the news engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Equity,
    Topic,
    Person,
}

/// Which engines an entity participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineFlags {
    pub financials: bool,
    pub trading: bool,
    pub news: bool,
}

impl EngineFlags {
    pub const fn equity_default() -> Self {
        Self { financials: true, trading: true, news: true }
    }

    pub const fn news_only() -> Self {
        Self { financials: false, trading: false, news: true }
    }

    /// Overlay `other` on top of `self`: any flag `other` sets explicitly wins.
    pub fn overlay(self, other: EngineFlagsOverride) -> Self {
        Self {
            financials: other.financials.unwrap_or(self.financials),
            trading: other.trading.unwrap_or(self.trading),
            news: other.news.unwrap_or(self.news),
        }
    }
}

/// A sparse override of [`EngineFlags`], as read from config layers that may
/// only mention a subset of engines.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineFlagsOverride {
    pub financials: Option<bool>,
    pub trading: Option<bool>,
    pub news: Option<bool>,
}

/// The identity and routing metadata for one tracked entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    /// Slash-joined logical key, e.g. `macro/Fed_Funds_Rate`.
    pub storage_path: String,
    /// e.g. `equity`, `macro`, `celebrity`.
    pub group: String,
    pub engines: EngineFlags,
}

impl Entity {
    pub fn equity(ticker: impl Into<String>) -> Self {
        let id = ticker.into();
        Self {
            storage_path: id.clone(),
            group: "equity".to_string(),
            kind: EntityKind::Equity,
            id,
            engines: EngineFlags::equity_default(),
        }
    }
}

/// One row of a financial statement: a date and its raw metrics.
///
/// Metric values are `None` for anything missing or non-finite — the
/// explicit null sentinel called for in the data model, rather than a
/// dropped key or a sentinel float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub metrics: HashMap<String, Option<f64>>,
}

impl StatementRow {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }
}

/// The eight statement kinds a [`FinancialSnapshot`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    AnnualFinancials,
    AnnualBalanceSheet,
    AnnualCashflow,
    QuarterlyFinancials,
    QuarterlyBalanceSheet,
    QuarterlyCashflow,
    AnnualEarnings,
    QuarterlyEarnings,
}

impl StatementKind {
    pub const ALL: [StatementKind; 8] = [
        Self::AnnualFinancials,
        Self::AnnualBalanceSheet,
        Self::AnnualCashflow,
        Self::QuarterlyFinancials,
        Self::QuarterlyBalanceSheet,
        Self::QuarterlyCashflow,
        Self::AnnualEarnings,
        Self::QuarterlyEarnings,
    ];
}

/// Refresh bookkeeping attached to a snapshot, consulted by the cache and
/// refresh-gate policies rather than by the factor engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// `YYYY-MM-DD`, if the upstream calendar has one on file.
    pub next_earnings_date: Option<String>,
    pub refresh_reason: Option<String>,
}

impl Default for CacheMeta {
    fn default() -> Self {
        Self { last_refreshed_at: None, next_earnings_date: None, refresh_reason: None }
    }
}

/// Full merged financial picture for one equity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub ticker: String,
    pub statements: HashMap<StatementKind, Vec<StatementRow>>,
    pub company_info: HashMap<String, serde_json::Value>,
    pub valuations: Valuations,
    pub fetched_at: DateTime<Utc>,
    pub cache_meta: CacheMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Valuations {
    pub trailing_pe: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub price_to_book: Option<f64>,
}

impl FinancialSnapshot {
    pub fn rows(&self, kind: StatementKind) -> &[StatementRow] {
        self.statements.get(&kind).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// `bullish`/`neutral`/`bearish` overall read on a [`FundamentalSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Bullish,
    Neutral,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallScore {
    pub score: f64,
    pub signal: Signal,
    pub confidence: f64,
}

/// One weighted factor's contribution to a [`FundamentalSignal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub weight: f64,
    pub score: f64,
    pub contribution: f64,
    pub available_metrics: u32,
    pub total_metrics: u32,
}

/// The fundamental factor model's output for one [`FinancialSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalSignal {
    pub overall: OverallScore,
    pub factors: Vec<Factor>,
    pub factor_contributions: HashMap<String, f64>,
    pub derived_metrics: HashMap<String, Option<f64>>,
}

/// One daily OHLCV bar, date-keyed at midnight UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRow {
    /// `YYYY-MM-DD`.
    pub date: chrono::NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OhlcvSeries {
    pub ticker: String,
    /// Ascending by date; see `timeseries-merge` for the invariant-preserving
    /// merge operation.
    pub rows: Vec<OhlcvRow>,
}

impl OhlcvSeries {
    pub fn latest(&self) -> Option<&OhlcvRow> {
        self.rows.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaSignal {
    GoldenCross,
    DeathCross,
    GoldenCrossState,
    DeathCrossState,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiSignal {
    Overbought,
    Oversold,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub hist: f64,
}

/// Technical snapshot derived from the tail of an [`OhlcvSeries`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TechnicalFeatures {
    pub latest_close: f64,
    pub return_1d: f64,
    pub ma_20: f64,
    pub ma_50: f64,
    pub ma_200: f64,
    pub rsi_14: f64,
    pub macd: Macd,
    pub trend: Trend,
    pub ma_signal: MaSignal,
    pub rsi_signal: RsiSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSignal {
    Buy,
    Hold,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AsOf {
    pub t: DateTime<Utc>,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CandleWindow {
    pub count: u32,
    pub from: chrono::NaiveDate,
    pub to: chrono::NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Aggregate {
    pub score: f64,
    pub p_up: f64,
    pub p_down: f64,
    pub signal: TradeSignal,
    pub confidence: f64,
}

/// A single-factor line item inside an [`AnalysisReport`], e.g. `macdHist`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFactor {
    pub id: String,
    pub label: String,
    pub value: f64,
    pub score: f64,
    pub weight: f64,
    pub contribution: f64,
    pub stance: Signal,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMeta {
    pub provider: String,
    pub years: u32,
    pub range: String,
    pub fetched_at: DateTime<Utc>,
}

/// The analysis-report factor model's output for `(ticker, date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub ticker: String,
    pub date: chrono::NaiveDate,
    pub as_of: AsOf,
    pub candles: CandleWindow,
    pub aggregate: Aggregate,
    pub factors: Vec<ReportFactor>,
    pub meta: AnalysisMeta,
}

/// A user-supplied directional stance fed into the analysis report as the
/// `user` factor. `+1`/`0`/`-1` per §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFactor {
    pub stance: i8,
}

/// Extracted body/summary text and whether full-text extraction succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub summary: String,
    pub content: String,
    pub fulltext_ok: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ArticleMetrics {
    pub title_len: usize,
    pub content_len: usize,
}

/// One ingested, deduplicated news article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub entity_id: String,
    /// `YYYY-MM-DD`, the ingest date this article was filed under.
    pub date: String,
    pub title: String,
    pub url: String,
    pub rss_link: Option<String>,
    pub published: DateTime<Utc>,
    pub source: String,
    pub extraction: Extraction,
    pub metrics: ArticleMetrics,
    pub news_type: String,
    pub topic: Option<String>,
    pub topic_group: Option<String>,
}

/// Per-`(entity_group, date)` dedupe ledger alongside raw article files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub hashes: Vec<String>,
    pub files: Vec<String>,
}

impl Manifest {
    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.iter().any(|h| h == hash)
    }

    pub fn record(&mut self, hash: String, file: String) {
        self.hashes.push(hash);
        self.files.push(file);
    }
}

/// Which step of the AI-context pipeline produced a given artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiContextStep {
    Raw = 1,
    Summarized = 2,
}

/// One entry in a per-date `ai_context`/`analysis` index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyIndexEntry {
    pub ticker: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyIndex {
    pub entries: Vec<DailyIndexEntry>,
}

impl DailyIndex {
    /// Remove any entry sharing `(ticker, path)` with `entry`, append it,
    /// then re-sort strictly by timestamp descending. Pure set-union keyed
    /// by `(ticker, path)`, so concurrent read-modify-write interleavings
    /// converge regardless of order.
    pub fn append(&mut self, entry: DailyIndexEntry) {
        self.entries.retain(|e| !(e.ticker == entry.ticker && e.path == entry.path));
        self.entries.push(entry);
        self.entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Partial,
    NotFound,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEvidence {
    pub url: String,
    pub score: f64,
    pub mode_hits: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSourceEvidence {
    pub candidate_count: u32,
    pub candidates: Vec<CandidateEvidence>,
    pub ai_enabled: bool,
    pub fallback: Option<FallbackEvidence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackEvidence {
    pub mode: String,
    pub used: bool,
}

/// A company's resolved official investor-relations surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSource {
    pub ticker: String,
    pub company_name: String,
    pub company_website: Option<String>,
    pub ir_home_url: Option<String>,
    pub financial_reports_url: Option<String>,
    pub sec_filings_url: Option<String>,
    pub confidence: f64,
    pub verification_status: VerificationStatus,
    pub discovered_at: DateTime<Utc>,
    pub evidence: ReportSourceEvidence,
}

/// Shared shape between `TopicConfig` and `PersonConfig` (§3); the registry
/// stores both kinds behind the same struct since every field lines up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub key: String,
    pub identifier: String,
    pub storage_path: String,
    pub group: String,
    pub rss_sources: Vec<String>,
    pub required_keywords: Vec<String>,
    pub excluded_keywords: Vec<String>,
    pub source_allowlist: Vec<String>,
    pub source_blocklist: Vec<String>,
    pub highlight_keywords: Vec<String>,
    pub min_content_length: usize,
    pub min_summary_length: usize,
    pub require_full_text: bool,
    pub enforce_content_filters: bool,
    pub max_articles: usize,
    pub max_age_hours: u32,
    pub aliases: Vec<String>,
}
