//! Market-data adapter (§4.3): quotes, OHLCV history, financial statements,
//! and the earnings calendar behind one rate-limited HTTP client.
//!
//! The upstream wire format is explicitly out of scope (§1 non-goals); this
//! client targets a REST shape close enough to real vendors (Polygon-style
//! aggregates, a statements endpoint keyed by timeframe) that the adapter
//! can be pointed at a compatible provider by configuration alone.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use context_core::{
    EngineError, EngineResult, FinancialSnapshot, MarketDataAdapter, OhlcvRow, Quote, StatementKind,
    StatementRow, Valuations,
};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter: at most `max_requests` per `window`.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self { timestamps: Arc::new(Mutex::new(VecDeque::new())), max_requests, window }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = ts.front().unwrap().checked_add(self.window).unwrap();
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(seconds = sleep_dur.as_secs_f64(), "market data rate limiter waiting for a slot");
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Clone)]
pub struct MarketDataClient {
    base_url: String,
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl MarketDataClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("MARKET_DATA_BASE_URL")
            .unwrap_or_else(|_| "https://api.marketdata.example".to_string());
        let rate_limit: usize = std::env::var("MARKET_DATA_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url,
            api_key,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: String, base_url: String) -> Self {
        let mut c = Self::new(api_key);
        c.base_url = base_url;
        c
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> EngineResult<reqwest::Response> {
        let request = builder
            .build()
            .map_err(|e| EngineError::Config(format!("building market data request: {e}")))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| EngineError::Config("market data request body is not clonable".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| EngineError::TransientUpstream(e.to_string()))?;

            if response.status().as_u16() != 429 {
                if response.status().is_server_error() {
                    return Err(EngineError::TransientUpstream(format!("HTTP {}", response.status())));
                }
                if response.status().is_client_error() {
                    return Err(EngineError::PermanentUpstream(format!("HTTP {}", response.status())));
                }
                return Ok(response);
            }

            tracing::warn!(attempt = attempt + 1, "market data 429, backing off");
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        Err(EngineError::TransientUpstream("rate limited after 3 retries".to_string()))
    }
}

#[derive(Deserialize)]
struct QuoteResponse {
    price: f64,
    #[serde(default)]
    as_of: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct BarResponse {
    #[serde(rename = "t")]
    timestamp_ms: i64,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    results: Vec<BarResponse>,
}

#[derive(Deserialize)]
struct RawStatementRow {
    date: String,
    #[serde(default)]
    metrics: HashMap<String, Option<f64>>,
}

#[derive(Deserialize, Default)]
struct StatementsResponse {
    #[serde(default)]
    annual_financials: Vec<RawStatementRow>,
    #[serde(default)]
    annual_balance_sheet: Vec<RawStatementRow>,
    #[serde(default)]
    annual_cashflow: Vec<RawStatementRow>,
    #[serde(default)]
    quarterly_financials: Vec<RawStatementRow>,
    #[serde(default)]
    quarterly_balance_sheet: Vec<RawStatementRow>,
    #[serde(default)]
    quarterly_cashflow: Vec<RawStatementRow>,
    #[serde(default)]
    annual_earnings: Vec<RawStatementRow>,
    #[serde(default)]
    quarterly_earnings: Vec<RawStatementRow>,
    #[serde(default)]
    info: HashMap<String, serde_json::Value>,
    #[serde(default)]
    trailing_pe: Option<f64>,
    #[serde(default)]
    price_to_sales: Option<f64>,
    #[serde(default)]
    price_to_book: Option<f64>,
}

#[derive(Deserialize)]
struct EarningsCalendarResponse {
    next_earnings_date: Option<String>,
}

fn sanitize_rows(rows: Vec<RawStatementRow>) -> Vec<StatementRow> {
    rows.into_iter()
        .map(|r| StatementRow {
            date: r.date,
            metrics: r
                .metrics
                .into_iter()
                .map(|(k, v)| (k, v.filter(|n| n.is_finite())))
                .collect(),
        })
        .collect()
}

#[async_trait]
impl MarketDataAdapter for MarketDataClient {
    async fn quote(&self, ticker: &str) -> EngineResult<Quote> {
        if ticker.trim().is_empty() {
            return Err(EngineError::config("ticker must not be empty"));
        }
        let url = format!("{}/v1/quote/{}", self.base_url, ticker);
        let resp = self.send(self.client.get(&url).query(&[("apiKey", &self.api_key)])).await?;
        let body: QuoteResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::PermanentUpstream(format!("malformed quote payload: {e}")))?;
        Ok(Quote { price: body.price, as_of: body.as_of.unwrap_or_else(Utc::now) })
    }

    async fn history(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> EngineResult<Vec<OhlcvRow>> {
        if ticker.trim().is_empty() {
            return Err(EngineError::config("ticker must not be empty"));
        }
        if start > end {
            return Err(EngineError::config("history start must not be after end"));
        }
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            ticker,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        let resp = self
            .send(self.client.get(&url).query(&[("apiKey", self.api_key.as_str()), ("adjusted", "true")]))
            .await?;
        let body: HistoryResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::PermanentUpstream(format!("malformed history payload: {e}")))?;

        // Normalize to timezone-naive UTC at 00:00:00 for daily granularity (§4.3).
        Ok(body
            .results
            .into_iter()
            .map(|r| {
                let dt = Utc.timestamp_millis_opt(r.timestamp_ms).single().unwrap_or_else(Utc::now);
                OhlcvRow { date: dt.date_naive(), open: r.open, high: r.high, low: r.low, close: r.close, volume: r.volume }
            })
            .collect())
    }

    async fn statements(&self, ticker: &str) -> EngineResult<FinancialSnapshot> {
        if ticker.trim().is_empty() {
            return Err(EngineError::config("ticker must not be empty"));
        }
        let url = format!("{}/vX/reference/financials", self.base_url);
        let resp = self
            .send(self.client.get(&url).query(&[("ticker", ticker), ("apiKey", &self.api_key)]))
            .await?;
        let body: StatementsResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::PermanentUpstream(format!("malformed statements payload: {e}")))?;

        let mut statements = HashMap::new();
        statements.insert(StatementKind::AnnualFinancials, sanitize_rows(body.annual_financials));
        statements.insert(StatementKind::AnnualBalanceSheet, sanitize_rows(body.annual_balance_sheet));
        statements.insert(StatementKind::AnnualCashflow, sanitize_rows(body.annual_cashflow));
        statements.insert(StatementKind::QuarterlyFinancials, sanitize_rows(body.quarterly_financials));
        statements.insert(StatementKind::QuarterlyBalanceSheet, sanitize_rows(body.quarterly_balance_sheet));
        statements.insert(StatementKind::QuarterlyCashflow, sanitize_rows(body.quarterly_cashflow));
        statements.insert(StatementKind::AnnualEarnings, sanitize_rows(body.annual_earnings));
        statements.insert(StatementKind::QuarterlyEarnings, sanitize_rows(body.quarterly_earnings));

        Ok(FinancialSnapshot {
            ticker: ticker.to_string(),
            statements,
            company_info: body.info,
            valuations: Valuations {
                trailing_pe: body.trailing_pe,
                price_to_sales: body.price_to_sales,
                price_to_book: body.price_to_book,
            },
            fetched_at: Utc::now(),
            cache_meta: Default::default(),
        })
    }

    async fn earnings_calendar(&self, ticker: &str) -> EngineResult<Option<String>> {
        if ticker.trim().is_empty() {
            return Err(EngineError::config("ticker must not be empty"));
        }
        let url = format!("{}/v1/earnings-calendar/{}", self.base_url, ticker);
        // §5: earnings-calendar calls carry a 3s deadline.
        let fut = self.send(self.client.get(&url).query(&[("apiKey", &self.api_key)]));
        let resp = tokio::time::timeout(Duration::from_secs(3), fut)
            .await
            .map_err(|_| EngineError::TransientUpstream("earnings calendar call timed out".to_string()))??;
        let body: EarningsCalendarResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::PermanentUpstream(format!("malformed earnings calendar payload: {e}")))?;
        Ok(body.next_earnings_date)
    }
}
