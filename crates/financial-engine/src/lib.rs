//! Composes the market-data adapter, the singleflight cache, and the
//! fundamental factor model into the two ticker-refresh operations the
//! core exposes to external collaborators (§6): `refresh_financials` and
//! `get_interpreted_earnings`.
//!
//! Grounded on `financial_engine/main.py`'s request handler shape: L1/L2
//! cache lookup, an earnings-gated refresh decision, then either serving
//! the cached snapshot or hitting the upstream adapter and persisting the
//! result. The handler itself wasn't in the retrieved source, so the
//! control flow here is rebuilt from the pieces that were: the refresh
//! policy (`cache-singleflight::financial_policy`), the singleflight cache
//! (`cache-singleflight::singleflight`), and the factor model
//! (`fundamental-analysis`).

pub mod interpretation;

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use cache_singleflight::{should_refresh_financials, CacheLayer, SingleflightCache, DEFAULT_NO_EARNINGS_MAX_STALENESS_DAYS};
use chrono::{NaiveDate, Utc};
use context_core::{CacheMeta, EngineError, EngineResult, FinancialSnapshot, MarketDataAdapter, StatementKind, Storage};

pub use interpretation::{interpret_financials, records_to_interpretation_dict, InterpretationData};

/// §4.1: long-lived artifacts carry a 10 minute cache / 1 day stale grace.
const LONG_LIVED_CACHE_CONTROL: &str = "public, max-age=600, stale-while-revalidate=86400";

pub fn snapshot_path(ticker: &str) -> String {
    format!("financials/{}.json", ticker.to_uppercase())
}

#[derive(Debug, Clone)]
pub struct RefreshedFinancials {
    pub snapshot: FinancialSnapshot,
    pub signal: context_core::FundamentalSignal,
    pub cache_layer: CacheLayer,
}

#[derive(Debug, Clone)]
pub struct InterpretedEarnings {
    pub interpretation_data: InterpretationData,
    pub interpretations: Vec<String>,
    pub fundamental_signal: context_core::FundamentalSignal,
    pub cache_meta: CacheMeta,
    pub cache_layer: CacheLayer,
}

pub struct FinancialEngine {
    adapter: Arc<dyn MarketDataAdapter>,
    storage: Arc<dyn Storage>,
    cache: SingleflightCache<FinancialSnapshot>,
}

impl FinancialEngine {
    pub fn new(adapter: Arc<dyn MarketDataAdapter>, storage: Arc<dyn Storage>) -> Self {
        Self { adapter, storage, cache: SingleflightCache::with_defaults() }
    }

    async fn load_snapshot(&self, ticker: &str) -> EngineResult<Option<FinancialSnapshot>> {
        match self.storage.get(&snapshot_path(ticker)).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| EngineError::consistency(format!("malformed financial snapshot for {ticker}: {e}"))),
            None => Ok(None),
        }
    }

    /// `refresh_financials(ticker, force?) → FinancialSnapshot + FundamentalSignal + cache_layer` (§6).
    ///
    /// The next-earnings-date lookup and the statements fetch both happen
    /// inside the singleflight-guarded closures, so a concurrent burst of
    /// callers still hits the market-data adapter at most once per call
    /// (§8 scenario 3) — only `load_l2` and `fetch` run, and only for the
    /// caller that wins the inflight race. `fresh_earnings` and
    /// `refresh_reason` are threaded from `load_l2`/`policy` into `fetch`
    /// through `Cell`s rather than the cache's generic API, since nothing
    /// in `get_or_refresh` carries a policy decision's reason forward on
    /// its own; this is safe because the three closures run sequentially
    /// within one leader's execution, never concurrently.
    pub async fn refresh_financials(&self, ticker: &str, force: bool, today: NaiveDate) -> EngineResult<RefreshedFinancials> {
        let ticker = ticker.to_uppercase();
        let fresh_earnings_date: Cell<Option<NaiveDate>> = Cell::new(None);
        let fresh_earnings: RefCell<Option<String>> = RefCell::new(None);
        let reason: Cell<&'static str> = Cell::new("cold_start");

        let cached = self
            .cache
            .get_or_refresh(
                &ticker,
                force,
                || async {
                    let snapshot = self.load_snapshot(&ticker).await?;
                    let next_earnings = self.adapter.earnings_calendar(&ticker).await?;
                    fresh_earnings_date.set(
                        next_earnings.as_deref().and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
                    );
                    *fresh_earnings.borrow_mut() = next_earnings;
                    Ok(snapshot)
                },
                |snapshot: Option<&FinancialSnapshot>| {
                    let (should_refresh, why) = should_refresh_financials(
                        snapshot.map(|s| &s.cache_meta),
                        fresh_earnings_date.get(),
                        force,
                        today,
                        DEFAULT_NO_EARNINGS_MAX_STALENESS_DAYS,
                    );
                    reason.set(why);
                    (should_refresh, why)
                },
                || async {
                    let mut snapshot = self.adapter.statements(&ticker).await?;
                    snapshot.cache_meta = CacheMeta {
                        last_refreshed_at: Some(Utc::now()),
                        next_earnings_date: fresh_earnings.borrow().clone(),
                        refresh_reason: Some(reason.get().to_string()),
                    };
                    let bytes = serde_json::to_vec_pretty(&snapshot)
                        .map_err(|e| EngineError::consistency(format!("serializing financial snapshot: {e}")))?;
                    self.storage.put(&snapshot_path(&ticker), bytes, "application/json", Some(LONG_LIVED_CACHE_CONTROL)).await?;
                    Ok(snapshot)
                },
            )
            .await?;

        let signal = fundamental_analysis::compute_fundamental_signal(&cached.value);
        Ok(RefreshedFinancials { snapshot: cached.value, signal, cache_layer: cached.layer })
    }

    /// `get_interpreted_earnings(ticker, force?) → {interpretation_data,
    /// interpretations[], fundamental_signal, cache_meta, cache_layer}` (§6).
    pub async fn get_interpreted_earnings(
        &self,
        ticker: &str,
        force: bool,
        today: NaiveDate,
    ) -> EngineResult<InterpretedEarnings> {
        let refreshed = self.refresh_financials(ticker, force, today).await?;
        let snapshot = &refreshed.snapshot;

        let interpretation_data = InterpretationData {
            financials: records_to_interpretation_dict(snapshot.rows(StatementKind::QuarterlyFinancials)),
            earnings: records_to_interpretation_dict(snapshot.rows(StatementKind::QuarterlyEarnings)),
            valuations: snapshot.valuations.clone(),
            info: snapshot.company_info.clone(),
        };
        let interpretations = interpret_financials(&interpretation_data);

        Ok(InterpretedEarnings {
            interpretation_data,
            interpretations,
            fundamental_signal: refreshed.signal,
            cache_meta: snapshot.cache_meta.clone(),
            cache_layer: refreshed.cache_layer,
        })
    }
}
