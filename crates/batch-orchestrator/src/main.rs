//! batch-orchestrator: nightly refresh of the data engines plus AI card
//! generation fan-out (§4.8).
//!
//! Usage:
//!   cargo run -p batch-orchestrator

use std::sync::Arc;
use std::time::Duration;

use batch_orchestrator::config::{BatchConfig, ConfigPaths};
use batch_orchestrator::{BatchOrchestrator, EngineDispatcher, HttpEngineDispatcher, InProcessEngineDispatcher};
use financial_engine::FinancialEngine;
use market_data_client::MarketDataClient;
use storage_gateway::ObjectStoreGateway;
use trading_data_engine::TradingDataEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batch_orchestrator=info".into()),
        )
        .init();

    let storage = Arc::new(ObjectStoreGateway::from_env()?);
    let config = BatchConfig::load(storage.as_ref(), &ConfigPaths::default()).await?;

    let financial_engine_url = std::env::var("FINANCIAL_ENGINE_URL").unwrap_or_else(|_| "http://localhost:8081".to_string());
    let trading_engine_url = std::env::var("TRADING_ENGINE_URL").unwrap_or_else(|_| "http://localhost:8082".to_string());
    let news_engine_url = std::env::var("NEWS_ENGINE_URL").unwrap_or_else(|_| "http://localhost:8083".to_string());
    let qa_engine_url = std::env::var("QA_ENGINE_URL").unwrap_or_else(|_| "http://localhost:8084".to_string());

    let call_deadline_secs: u64 = std::env::var("BATCH_CALL_DEADLINE_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);

    let http_client = reqwest::Client::builder().timeout(Duration::from_secs(call_deadline_secs)).build()?;
    let http_dispatcher = Arc::new(HttpEngineDispatcher::new(http_client, financial_engine_url, trading_engine_url, news_engine_url, qa_engine_url));

    // Financials and trading are refreshed by calling the in-repo engines
    // directly; news and card generation still go through the HTTP
    // dispatcher, since neither has an in-process composed operation here.
    let market_data_api_key = std::env::var("MARKET_DATA_API_KEY").unwrap_or_default();
    let adapter = Arc::new(MarketDataClient::new(market_data_api_key));
    let financial_engine = Arc::new(FinancialEngine::new(adapter.clone(), storage.clone()));
    let trading_engine = Arc::new(TradingDataEngine::new(adapter, storage.clone()));
    let dispatcher: Arc<dyn EngineDispatcher> =
        Arc::new(InProcessEngineDispatcher::new(financial_engine, trading_engine, http_dispatcher));

    let orchestrator = BatchOrchestrator::new(dispatcher).with_call_deadline(Duration::from_secs(call_deadline_secs));

    let report = orchestrator
        .run(
            &config.equity_universe,
            &config.equity_card_types,
            &config.additional_targets,
            &config.engine_control,
            &config.equities_default_overrides,
            &config.llm_config,
        )
        .await;

    tracing::info!(
        financials_attempted = report.financials.attempted,
        financials_failed = report.financials.failed,
        trading_attempted = report.trading.attempted,
        trading_failed = report.trading.failed,
        news_attempted = report.news.attempted,
        news_failed = report.news.failed,
        cards_attempted = report.cards.attempted,
        cards_failed = report.cards.failed,
        phase2_skipped = report.phase2_skipped,
        "batch run complete"
    );

    if report.phase2_skipped {
        anyhow::bail!("phase 2 was skipped because a phase 1 engine was unreachable");
    }

    Ok(())
}
