//! HTTP dispatch to the downstream engines (§4.8). Mirrors the POST
//! endpoints the batch job calls; auth-to-upstream concerns are out of
//! scope here, same as everywhere else in this workspace.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use context_core::{EngineError, EngineResult};
use financial_engine::FinancialEngine;
use reqwest::Client;
use serde_json::{json, Value};
use trading_data_engine::TradingDataEngine;

use crate::targets::{NewsTarget, TargetType};

#[async_trait]
pub trait EngineDispatcher: Send + Sync {
    async fn dispatch_financials(&self, tickers: &[String]) -> EngineResult<()>;
    async fn dispatch_trading(&self, tickers: &[String]) -> EngineResult<()>;
    async fn dispatch_news_target(&self, target: &NewsTarget) -> EngineResult<()>;
    async fn dispatch_card(&self, ticker: &str, card_type: &str, backend: &str, model: &str) -> EngineResult<()>;
}

pub struct HttpEngineDispatcher {
    client: Client,
    financial_engine_url: String,
    trading_engine_url: String,
    news_engine_url: String,
    qa_engine_url: String,
}

impl HttpEngineDispatcher {
    pub fn new(
        client: Client,
        financial_engine_url: impl Into<String>,
        trading_engine_url: impl Into<String>,
        news_engine_url: impl Into<String>,
        qa_engine_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            financial_engine_url: financial_engine_url.into(),
            trading_engine_url: trading_engine_url.into(),
            news_engine_url: news_engine_url.into(),
            qa_engine_url: qa_engine_url.into(),
        }
    }

    async fn post_json(&self, url: &str, body: &Value) -> EngineResult<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::TransientUpstream(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(EngineError::TransientUpstream(format!("HTTP {} from {url}", response.status())));
        }
        if response.status().is_client_error() {
            return Err(EngineError::PermanentUpstream(format!("HTTP {} from {url}", response.status())));
        }
        Ok(())
    }
}

#[async_trait]
impl EngineDispatcher for HttpEngineDispatcher {
    async fn dispatch_financials(&self, tickers: &[String]) -> EngineResult<()> {
        let url = format!("{}/batch_refresh", self.financial_engine_url.trim_end_matches('/'));
        self.post_json(&url, &json!({ "tickers": tickers })).await
    }

    async fn dispatch_trading(&self, tickers: &[String]) -> EngineResult<()> {
        let url = format!("{}/trading_data/batch_refresh", self.trading_engine_url.trim_end_matches('/'));
        self.post_json(&url, &json!({ "tickers": tickers })).await
    }

    async fn dispatch_news_target(&self, target: &NewsTarget) -> EngineResult<()> {
        let base = self.news_engine_url.trim_end_matches('/');
        let url = match target.target_type {
            TargetType::Person => {
                let id = target.target_id.as_deref().unwrap_or(&target.ticker);
                format!("{base}/batch/process_person/dynamic/{id}")
            }
            TargetType::Topic => {
                let key = target.topic_key.clone().unwrap_or_else(|| slugify_topic(&target.ticker));
                format!("{base}/batch/process_topic/dynamic/{key}")
            }
            TargetType::Equity => format!("{base}/batch/process_ticker/{}", target.ticker),
        };
        self.post_json(&url, &json!({ "date": target.date })).await
    }

    async fn dispatch_card(&self, ticker: &str, card_type: &str, backend: &str, model: &str) -> EngineResult<()> {
        let url = format!("{}/card/{}", self.qa_engine_url.trim_end_matches('/'), card_type);
        self.post_json(&url, &json!({ "ticker": ticker, "backend": backend, "model": model })).await
    }
}

/// Dispatches financials and trading refreshes to the in-repo engine
/// operations directly, rather than over HTTP to a separately-deployed
/// service. News and card generation still go through a delegate
/// dispatcher — nothing in this workspace composes those into a callable
/// in-process operation the way `financial-engine`/`trading-data-engine`
/// now do for financials and trading.
pub struct InProcessEngineDispatcher {
    financial_engine: Arc<FinancialEngine>,
    trading_engine: Arc<TradingDataEngine>,
    delegate: Arc<dyn EngineDispatcher>,
}

impl InProcessEngineDispatcher {
    pub fn new(financial_engine: Arc<FinancialEngine>, trading_engine: Arc<TradingDataEngine>, delegate: Arc<dyn EngineDispatcher>) -> Self {
        Self { financial_engine, trading_engine, delegate }
    }
}

#[async_trait]
impl EngineDispatcher for InProcessEngineDispatcher {
    async fn dispatch_financials(&self, tickers: &[String]) -> EngineResult<()> {
        let today = Utc::now().date_naive();
        let mut last_err = None;
        let mut succeeded = 0;
        for ticker in tickers {
            match self.financial_engine.refresh_financials(ticker, false, today).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    tracing::warn!(ticker = %ticker, error = %e, "financials refresh failed");
                    last_err = Some(e);
                }
            }
        }
        if succeeded == 0 {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        Ok(())
    }

    async fn dispatch_trading(&self, tickers: &[String]) -> EngineResult<()> {
        let today = Utc::now().date_naive();
        let mut last_err = None;
        let mut succeeded = 0;
        for ticker in tickers {
            match self.trading_engine.refresh_trading(ticker, today).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    tracing::warn!(ticker = %ticker, error = %e, "trading refresh failed");
                    last_err = Some(e);
                }
            }
        }
        if succeeded == 0 {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        Ok(())
    }

    async fn dispatch_news_target(&self, target: &NewsTarget) -> EngineResult<()> {
        self.delegate.dispatch_news_target(target).await
    }

    async fn dispatch_card(&self, ticker: &str, card_type: &str, backend: &str, model: &str) -> EngineResult<()> {
        self.delegate.dispatch_card(ticker, card_type, backend, model).await
    }
}

/// Lowercases and underscores a free-form topic label for use as a URL
/// path segment, mirroring the ticker/topic key slugs the news targets use.
pub fn slugify_topic(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            out.push('_');
        }
    }
    out
}
