//! Composes the market-data adapter, the time-series merge, and the
//! technical factor model into the two trading-side core operations (§6):
//! `refresh_trading` and `analyze`.
//!
//! Grounded on `trading_data_engine/main.py`'s `_maybe_refresh_daily_once`
//! (best-effort single-process refresh coalescing, reused here as
//! `cache-singleflight::RefreshGate`) and `_compute_analysis_from_df` (ported
//! as `technical-analysis::compute_analysis_report`).

use std::collections::HashMap;
use std::sync::Arc;

use cache_singleflight::{CacheLayer, RefreshGate};
use chrono::{Duration, NaiveDate, Utc};
use context_core::{
    append_daily_index, DailyIndexEntry, DailyIndexKind, EngineError, EngineResult, MarketDataAdapter, OhlcvSeries, Storage,
    UserFactor,
};
use timeseries_merge::{back_look_start, merge_ohlcv_rows, DEFAULT_OHLCV_BACK_LOOK_DAYS};

/// Cold-start history window when no series is on file yet.
const COLD_START_LOOKBACK_DAYS: i64 = 365 * 5;

pub fn historical_path(ticker: &str) -> String {
    format!("historical_data/{}_historical.json", ticker.to_uppercase())
}

pub fn analysis_path(ticker: &str, date: NaiveDate) -> String {
    format!("analysis/{}/{date}.json", ticker.to_uppercase())
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshedTrading {
    pub last_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct AnalyzeResult {
    pub report: context_core::AnalysisReport,
    /// `Some(CacheLayer::GcsCache)` when the baseline report was served from
    /// its persisted path rather than recomputed (§8 scenario 4); `None` for
    /// every freshly-computed report, baseline or overridden.
    pub served_from: Option<CacheLayer>,
}

pub struct TradingDataEngine {
    adapter: Arc<dyn MarketDataAdapter>,
    storage: Arc<dyn Storage>,
    refresh_gate: RefreshGate,
}

impl TradingDataEngine {
    pub fn new(adapter: Arc<dyn MarketDataAdapter>, storage: Arc<dyn Storage>) -> Self {
        Self { adapter, storage, refresh_gate: RefreshGate::with_defaults() }
    }

    async fn load_series(&self, ticker: &str) -> EngineResult<OhlcvSeries> {
        match self.storage.get(&historical_path(ticker)).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::consistency(format!("malformed historical series for {ticker}: {e}"))),
            None => Ok(OhlcvSeries { ticker: ticker.to_string(), rows: vec![] }),
        }
    }

    async fn save_series(&self, series: &OhlcvSeries) -> EngineResult<()> {
        let bytes = serde_json::to_vec_pretty(series)
            .map_err(|e| EngineError::consistency(format!("serializing historical series: {e}")))?;
        self.storage.put(&historical_path(&series.ticker), bytes, "application/json", Some(LONG_LIVED_CACHE_CONTROL)).await
    }

    async fn fetch_and_merge(&self, ticker: &str, today: NaiveDate) -> EngineResult<()> {
        let existing = self.load_series(ticker).await?;
        let start = match existing.latest() {
            Some(row) => back_look_start(row.date, DEFAULT_OHLCV_BACK_LOOK_DAYS),
            None => today - Duration::days(COLD_START_LOOKBACK_DAYS),
        };
        let fresh_rows = self.adapter.history(ticker, start, today).await?;
        let merged_rows = merge_ohlcv_rows(&existing.rows, &fresh_rows, today);
        self.save_series(&OhlcvSeries { ticker: ticker.to_string(), rows: merged_rows }).await
    }

    /// `refresh_trading(ticker) → {last_date}` (§6). Persists the merged
    /// OHLCV series and then best-effort refreshes the baseline analysis
    /// report, logging and swallowing a failure there rather than failing
    /// the whole refresh over a report that can be recomputed later.
    pub async fn refresh_trading(&self, ticker: &str, today: NaiveDate) -> EngineResult<RefreshedTrading> {
        let ticker = ticker.to_uppercase();
        self.refresh_gate
            .maybe_refresh_once(&ticker, || async {
                match self.fetch_and_merge(&ticker, today).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(ticker = %ticker, error = %e, "trading refresh failed");
                        false
                    }
                }
            })
            .await;

        let series = self.load_series(&ticker).await?;
        let last_date = series.latest().map(|r| r.date).ok_or_else(|| EngineError::config("no historical data available"))?;

        if let Err(e) = self.analyze(&ticker, 1, None, None, today).await {
            tracing::warn!(ticker = %ticker, error = %e, "baseline analysis refresh after trading refresh failed");
        }

        Ok(RefreshedTrading { last_date })
    }

    /// `analyze(ticker, years, weights?, user_factor?) → AnalysisReport` (§6).
    /// A baseline request (no weight overrides, no user factor) is cached
    /// at `analysis/{TICKER}/{date}.json` via put-if-absent and recorded in
    /// the per-date analysis index; any overridden request is computed
    /// fresh and never touches that path (§8 scenario 4).
    pub async fn analyze(
        &self,
        ticker: &str,
        years: u32,
        weight_overrides: Option<&HashMap<String, f64>>,
        user_factor: Option<UserFactor>,
        today: NaiveDate,
    ) -> EngineResult<AnalyzeResult> {
        let ticker = ticker.to_uppercase();
        let baseline = weight_overrides.is_none() && user_factor.is_none();
        let path = analysis_path(&ticker, today);

        if baseline {
            if let Some(bytes) = self.storage.get(&path).await? {
                let report = serde_json::from_slice(&bytes)
                    .map_err(|e| EngineError::consistency(format!("malformed analysis report for {ticker}: {e}")))?;
                return Ok(AnalyzeResult { report, served_from: Some(CacheLayer::GcsCache) });
            }
        }

        let series = self.load_series(&ticker).await?;
        let report = technical_analysis::compute_analysis_report(
            &ticker,
            &series,
            years,
            weight_overrides,
            user_factor,
            "trading-data-engine",
            Utc::now(),
        )?;

        if baseline {
            let bytes = serde_json::to_vec_pretty(&report)
                .map_err(|e| EngineError::consistency(format!("serializing analysis report: {e}")))?;
            let created = self.storage.put_if_absent(&path, bytes, "application/json").await?;
            if created {
                append_daily_index(
                    self.storage.as_ref(),
                    DailyIndexKind::Analysis,
                    &today.format("%Y-%m-%d").to_string(),
                    DailyIndexEntry { ticker: ticker.clone(), path: path.clone(), timestamp: Utc::now(), metadata: None },
                )
                .await?;
            }
        }

        Ok(AnalyzeResult { report, served_from: None })
    }
}

/// §4.1: long-lived artifacts carry a 10 minute cache / 1 day stale grace.
const LONG_LIVED_CACHE_CONTROL: &str = "public, max-age=600, stale-while-revalidate=86400";
