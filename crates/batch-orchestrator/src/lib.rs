//! Two-phase nightly batch run (§4.8): Phase 1 refreshes the data engines
//! (financials, trading, news) concurrently; Phase 2 fans out AI card
//! generation over the equity universe plus any additional targets.

pub mod config;
pub mod dispatch;
pub mod targets;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use context_core::{EngineError, EngineResult};

pub use config::{BatchConfig, CardTask, LlmConfig};
pub use dispatch::{EngineDispatcher, HttpEngineDispatcher, InProcessEngineDispatcher};
pub use targets::{build_phase1_sets, AdditionalTarget, EngineFlags, NewsTarget, Phase1Sets, TargetType};

/// Per-call deadline for a single dispatch (§4.8): the default used when a
/// caller doesn't override it.
pub const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
pub struct PhaseOutcome {
    pub attempted: u32,
    pub failed: u32,
}

impl PhaseOutcome {
    fn record(&mut self, result: &EngineResult<()>) {
        self.attempted += 1;
        if result.is_err() {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchRunReport {
    pub financials: PhaseOutcome,
    pub trading: PhaseOutcome,
    pub news: PhaseOutcome,
    pub cards: PhaseOutcome,
    pub phase2_skipped: bool,
}

pub struct BatchOrchestrator {
    dispatcher: Arc<dyn EngineDispatcher>,
    call_deadline: Duration,
}

impl BatchOrchestrator {
    pub fn new(dispatcher: Arc<dyn EngineDispatcher>) -> Self {
        Self { dispatcher, call_deadline: DEFAULT_CALL_DEADLINE }
    }

    pub fn with_call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = deadline;
        self
    }

    async fn call_with_deadline(&self, fut: impl std::future::Future<Output = EngineResult<()>>) -> EngineResult<()> {
        match tokio::time::timeout(self.call_deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::TransientUpstream("dispatch deadline exceeded".to_string())),
        }
    }

    /// Phase 1: refresh financials, trading, and news concurrently. If any
    /// of the three engines comes back entirely unreachable (as opposed to
    /// per-item failures, which are just recorded), Phase 2 is skipped.
    async fn run_phase1(&self, sets: &Phase1Sets) -> (PhaseOutcome, PhaseOutcome, PhaseOutcome, bool) {
        let financials_fut = self.run_financials(&sets.tickers_for_financials);
        let trading_fut = self.run_trading(&sets.tickers_for_trading);
        let news_fut = self.run_news(&sets.news_targets);

        let (financials, trading, news) = tokio::join!(financials_fut, trading_fut, news_fut);

        let any_engine_unreachable = (!sets.tickers_for_financials.is_empty() && financials.attempted == financials.failed)
            || (!sets.tickers_for_trading.is_empty() && trading.attempted == trading.failed)
            || (!sets.news_targets.is_empty() && news.attempted == news.failed);

        (financials, trading, news, any_engine_unreachable)
    }

    async fn run_financials(&self, tickers: &[String]) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();
        if tickers.is_empty() {
            return outcome;
        }
        let result = self.call_with_deadline(self.dispatcher.dispatch_financials(tickers)).await;
        if let Err(ref e) = result {
            tracing::warn!("financials batch dispatch failed: {e}");
        }
        outcome.record(&result);
        outcome
    }

    async fn run_trading(&self, tickers: &[String]) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();
        if tickers.is_empty() {
            return outcome;
        }
        let result = self.call_with_deadline(self.dispatcher.dispatch_trading(tickers)).await;
        if let Err(ref e) = result {
            tracing::warn!("trading batch dispatch failed: {e}");
        }
        outcome.record(&result);
        outcome
    }

    /// News targets are dispatched sequentially, one request per target;
    /// a failure on one target never stops the rest.
    async fn run_news(&self, targets: &[NewsTarget]) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();
        for target in targets {
            let result = self.call_with_deadline(self.dispatcher.dispatch_news_target(target)).await;
            if let Err(ref e) = result {
                tracing::warn!("news dispatch failed for {}: {e}", target.ticker);
            }
            outcome.record(&result);
        }
        outcome
    }

    /// Phase 2: dispatch one card-generation request per (ticker, card_type)
    /// pair across the equity universe and any additional targets, deduped
    /// so a ticker named in both never generates the same card twice.
    async fn run_phase2(
        &self,
        equity_universe: &[String],
        equity_card_types: &[String],
        additional_targets: &[AdditionalTarget],
        llm_config: &LlmConfig,
    ) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();
        let mut processed: HashSet<(String, String)> = HashSet::new();

        let mut pairs: Vec<(String, String)> = Vec::new();
        for ticker in equity_universe {
            for card_type in equity_card_types {
                pairs.push((ticker.clone(), card_type.clone()));
            }
        }
        for target in additional_targets {
            for card_type in &target.card_types {
                pairs.push((target.ticker.clone(), card_type.clone()));
            }
        }

        for (ticker, card_type) in pairs {
            if !processed.insert((ticker.clone(), card_type.clone())) {
                continue;
            }
            let CardTask { backend, model } = llm_config.resolve(&card_type);
            let result = self
                .call_with_deadline(self.dispatcher.dispatch_card(&ticker, &card_type, &backend, &model))
                .await;
            if let Err(ref e) = result {
                tracing::warn!("card dispatch failed for {ticker}/{card_type}: {e}");
            }
            outcome.record(&result);
        }

        outcome
    }

    /// Runs the full two-phase batch. `equity_universe`/`equity_card_types`
    /// describe the cross-product driving Phase 2 for plain equities;
    /// `additional_targets` carries per-target card types, engine overrides,
    /// and (for topics/persons) their own identity.
    pub async fn run(
        &self,
        equity_universe: &[String],
        equity_card_types: &[String],
        additional_targets: &[AdditionalTarget],
        engine_control: &EngineFlags,
        equities_default_overrides: &HashMap<String, bool>,
        llm_config: &LlmConfig,
    ) -> BatchRunReport {
        let sets = build_phase1_sets(equity_universe, additional_targets, engine_control, equities_default_overrides);

        let (financials, trading, news, abort_phase2) = self.run_phase1(&sets).await;

        if abort_phase2 {
            tracing::error!("aborting phase 2: at least one phase 1 engine was entirely unreachable");
            return BatchRunReport { financials, trading, news, cards: PhaseOutcome::default(), phase2_skipped: true };
        }

        let cards = self.run_phase2(equity_universe, equity_card_types, additional_targets, llm_config).await;

        BatchRunReport { financials, trading, news, cards, phase2_skipped: false }
    }
}
