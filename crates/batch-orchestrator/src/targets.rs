//! Phase 1 input shaping (§4.8): per-target engine-flag resolution and the
//! three dispatch sets (financials, trading, news).

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct EngineFlags {
    pub financials: bool,
    pub trading: bool,
    pub news: bool,
}

/// Overlays `overrides` onto `global`, recognizing both the short
/// (`financials`/`trading`/`news`) and long (`run_financials_engine`/...)
/// spellings used by the config files.
pub fn resolve_engine_flags(global: &EngineFlags, overrides: &HashMap<String, bool>) -> EngineFlags {
    let mut resolved = *global;
    for (key, value) in overrides {
        match key.as_str() {
            "financials" | "run_financials_engine" => resolved.financials = *value,
            "trading" | "run_trading_engine" => resolved.trading = *value,
            "news" | "run_news_engine" => resolved.news = *value,
            _ => {}
        }
    }
    resolved
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Equity,
    Topic,
    Person,
}

impl TargetType {
    fn label(self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Topic => "topic",
            Self::Person => "person",
        }
    }
}

/// One entry from the additional-targets config (equities with per-target
/// overrides, topics, persons).
#[derive(Debug, Clone)]
pub struct AdditionalTarget {
    pub ticker: String,
    pub target_type: TargetType,
    pub category: Option<String>,
    pub date: Option<String>,
    pub target_id: Option<String>,
    pub topic_key: Option<String>,
    pub card_types: Vec<String>,
    pub run_overrides: HashMap<String, bool>,
    pub extra_params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NewsTargetKey {
    ticker: String,
    target_type: &'static str,
    category: String,
}

#[derive(Debug, Clone)]
pub struct NewsTarget {
    pub ticker: String,
    pub target_type: TargetType,
    pub category: String,
    pub date: Option<String>,
    pub target_id: Option<String>,
    pub topic_key: Option<String>,
}

pub struct Phase1Sets {
    pub tickers_for_financials: Vec<String>,
    pub tickers_for_trading: Vec<String>,
    pub news_targets: Vec<NewsTarget>,
}

/// Builds the three Phase 1 dispatch sets (§4.8). Per-equity flags start
/// from `engine_control`, overlay the `equities_default` overrides, then
/// the per-target override; `news_targets` are keyed by `(ticker,
/// target_type, category)` with re-insertion replacing the prior entry.
pub fn build_phase1_sets(
    base_tickers: &[String],
    additional_targets: &[AdditionalTarget],
    engine_control: &EngineFlags,
    equities_default_overrides: &HashMap<String, bool>,
) -> Phase1Sets {
    let mut financials = HashSet::new();
    let mut trading = HashSet::new();
    let mut news_map: HashMap<NewsTargetKey, NewsTarget> = HashMap::new();

    let equity_targets_by_ticker: HashMap<&str, &AdditionalTarget> = additional_targets
        .iter()
        .filter(|t| t.target_type == TargetType::Equity)
        .map(|t| (t.ticker.as_str(), t))
        .collect();
    let mut processed_equity_overrides: HashSet<String> = HashSet::new();

    for ticker in base_tickers {
        let mut overrides = equities_default_overrides.clone();
        let override_target = equity_targets_by_ticker.get(ticker.as_str()).copied();

        let (category, date, target_id, topic_key) = match override_target {
            Some(t) => {
                processed_equity_overrides.insert(ticker.clone());
                overrides.extend(t.run_overrides.clone());
                (t.category.clone(), t.date.clone(), t.target_id.clone(), t.topic_key.clone())
            }
            None => (None, None, None, None),
        };

        let flags = resolve_engine_flags(engine_control, &overrides);
        if flags.financials {
            financials.insert(ticker.clone());
        }
        if flags.trading {
            trading.insert(ticker.clone());
        }
        if flags.news {
            let resolved_category = category.clone().unwrap_or_else(|| "equity".to_string());
            let key = NewsTargetKey { ticker: ticker.clone(), target_type: TargetType::Equity.label(), category: resolved_category.clone() };
            news_map.insert(
                key,
                NewsTarget {
                    ticker: ticker.clone(),
                    target_type: TargetType::Equity,
                    category: resolved_category,
                    date,
                    target_id: target_id.or_else(|| Some(ticker.clone())),
                    topic_key,
                },
            );
        }
    }

    let base_ticker_set: HashSet<&str> = base_tickers.iter().map(String::as_str).collect();
    for target in additional_targets {
        if target.target_type == TargetType::Equity && processed_equity_overrides.contains(&target.ticker) {
            continue;
        }

        let mut overrides = HashMap::new();
        if target.target_type == TargetType::Equity && base_ticker_set.contains(target.ticker.as_str()) {
            overrides.extend(equities_default_overrides.clone());
        }
        overrides.extend(target.run_overrides.clone());

        let flags = resolve_engine_flags(engine_control, &overrides);
        if flags.financials {
            financials.insert(target.ticker.clone());
        }
        if flags.trading {
            trading.insert(target.ticker.clone());
        }
        if flags.news {
            let category = target.category.clone().unwrap_or_else(|| target.target_type.label().to_string());
            let key = NewsTargetKey { ticker: target.ticker.clone(), target_type: target.target_type.label(), category: category.clone() };
            news_map.insert(
                key,
                NewsTarget {
                    ticker: target.ticker.clone(),
                    target_type: target.target_type,
                    category,
                    date: target.date.clone(),
                    target_id: target.target_id.clone(),
                    topic_key: target.topic_key.clone(),
                },
            );
        }
    }

    let mut tickers_for_financials: Vec<String> = financials.into_iter().collect();
    tickers_for_financials.sort();
    let mut tickers_for_trading: Vec<String> = trading.into_iter().collect();
    tickers_for_trading.sort();

    let mut news_targets: Vec<NewsTarget> = news_map.into_values().collect();
    news_targets.sort_by(|a, b| {
        let a_is_topic = a.target_type != TargetType::Equity;
        let b_is_topic = b.target_type != TargetType::Equity;
        (a_is_topic, &a.category, &a.ticker).cmp(&(b_is_topic, &b.category, &b.ticker))
    });

    Phase1Sets { tickers_for_financials, tickers_for_trading, news_targets }
}
