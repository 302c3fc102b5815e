//! OHLCVSeries (+ optional user factor) → [`AnalysisReport`] (§4.5 analysis
//! report). Grounded on `trading_data_engine/main.py`'s
//! `_compute_analysis_from_df`: same six factors, same default weights, same
//! probability mapping. `ema200Trend` is computed over the 200-day simple
//! moving average, matching what the original names "ema200" but actually
//! computes as `close.rolling(window=200).mean()`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use context_core::{
    Aggregate, AnalysisMeta, AnalysisReport, AsOf, CandleWindow, EngineError, EngineResult, OhlcvSeries, ReportFactor, Signal,
    UserFactor,
};

use crate::indicators::{macd, rsi, sma, stdev};

const FACTOR_STANCE_DEADBAND: f64 = 0.12;
const USER_FACTOR_STANCE_DEADBAND: f64 = 0.01;

fn default_factor_weights() -> HashMap<&'static str, f64> {
    HashMap::from([
        ("rsi14", 0.22),
        ("macdHist", 0.30),
        ("ema200Trend", 0.22),
        ("momentum20", 0.16),
        ("volumeTrend", 0.10),
        ("user", 0.0),
    ])
}

fn factor_stance(score: f64, deadband: f64) -> Signal {
    if score >= deadband {
        Signal::Bullish
    } else if score <= -deadband {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

fn years_to_range(years: u32) -> &'static str {
    if years <= 1 {
        "1y"
    } else if years <= 2 {
        "2y"
    } else if years <= 5 {
        "5y"
    } else {
        "10y"
    }
}

/// Computes the analysis-report factor model. `weight_overrides` replaces
/// individual entries in the default weight table by factor id; `user_factor`
/// feeds the `user` factor's score directly.
pub fn compute_analysis_report(
    ticker: &str,
    series: &OhlcvSeries,
    years: u32,
    weight_overrides: Option<&HashMap<String, f64>>,
    user_factor: Option<UserFactor>,
    provider: &str,
    fetched_at: DateTime<Utc>,
) -> EngineResult<AnalysisReport> {
    if series.rows.is_empty() {
        return Err(EngineError::config("not enough candles for analysis"));
    }

    let closes = series.closes();
    let volumes: Vec<f64> = series.rows.iter().map(|r| r.volume).collect();
    let latest_close = *closes.last().unwrap();
    let last_row = series.rows.last().unwrap();

    let mut factors = Vec::with_capacity(6);

    // rsi14
    let rsi_val = if closes.len() >= 30 { rsi(&closes, 14).last().copied() } else { None };
    let rsi_score = rsi_val.map(piecewise_rsi_score).unwrap_or(0.0);
    factors.push(ReportFactor {
        id: "rsi14".to_string(),
        label: "RSI(14)".to_string(),
        value: rsi_val.unwrap_or(0.0),
        score: rsi_score,
        weight: 0.0,
        contribution: 0.0,
        stance: factor_stance(rsi_score, FACTOR_STANCE_DEADBAND),
        explanation: "RSI < 30 tends to be oversold (bullish), RSI > 70 tends to be overbought (bearish).".to_string(),
    });

    // macdHist
    let (hist_val, macd_score) = if closes.len() >= 40 {
        let histogram = macd(&closes, 12, 26, 9).histogram;
        match histogram.last().copied() {
            Some(h) => {
                let recent: Vec<f64> = histogram.iter().rev().take(120).rev().copied().collect();
                let denom = if recent.len() >= 30 { stdev(&recent).max(1e-9) } else { 1.0 };
                (h, (h / (denom * 2.0)).tanh())
            }
            None => (0.0, 0.0),
        }
    } else {
        (0.0, 0.0)
    };
    factors.push(ReportFactor {
        id: "macdHist".to_string(),
        label: "MACD Hist".to_string(),
        value: hist_val,
        score: macd_score,
        weight: 0.0,
        contribution: 0.0,
        stance: factor_stance(macd_score, FACTOR_STANCE_DEADBAND),
        explanation: "MACD histogram measures momentum (positive = bullish, negative = bearish).".to_string(),
    });

    // ema200Trend (200-day simple moving average distance, per the original)
    let ma_200 = sma(&closes, 200);
    let (ema_dist, ema_score) = match ma_200.last() {
        Some(&m) if m != 0.0 => {
            let dist = latest_close / m - 1.0;
            (dist, (dist * 8.0).tanh())
        }
        _ => (0.0, 0.0),
    };
    factors.push(ReportFactor {
        id: "ema200Trend".to_string(),
        label: "EMA200 Trend".to_string(),
        value: ema_dist,
        score: ema_score,
        weight: 0.0,
        contribution: 0.0,
        stance: factor_stance(ema_score, FACTOR_STANCE_DEADBAND),
        explanation: "Price vs EMA200 approximates long-term trend (above = bullish, below = bearish).".to_string(),
    });

    // momentum20
    let (mom_val, mom_score) = if closes.len() >= 25 {
        let prev = closes[closes.len() - 21];
        if prev != 0.0 {
            let val = latest_close / prev - 1.0;
            (val, (val * 10.0).tanh())
        } else {
            (0.0, 0.0)
        }
    } else {
        (0.0, 0.0)
    };
    factors.push(ReportFactor {
        id: "momentum20".to_string(),
        label: "Momentum(20D)".to_string(),
        value: mom_val,
        score: mom_score,
        weight: 0.0,
        contribution: 0.0,
        stance: factor_stance(mom_score, FACTOR_STANCE_DEADBAND),
        explanation: "20D return is a simple momentum proxy (positive = bullish).".to_string(),
    });

    // volumeTrend
    let (vol_val, vol_score) = if volumes.len() >= 25 {
        let vol_avg = sma(&volumes, 20).last().copied().unwrap_or(0.0);
        let vol_latest = *volumes.last().unwrap();
        if vol_avg > 0.0 {
            let ratio = vol_latest / vol_avg;
            (ratio, ((ratio - 1.0) * 1.5).tanh())
        } else {
            (0.0, 0.0)
        }
    } else {
        (0.0, 0.0)
    };
    factors.push(ReportFactor {
        id: "volumeTrend".to_string(),
        label: "Volume Trend".to_string(),
        value: vol_val,
        score: vol_score,
        weight: 0.0,
        contribution: 0.0,
        stance: factor_stance(vol_score, FACTOR_STANCE_DEADBAND),
        explanation: "Volume vs 20D average as a participation proxy.".to_string(),
    });

    // user
    let user_score = user_factor.map(|f| f.stance.clamp(-1, 1) as f64).unwrap_or(0.0);
    factors.push(ReportFactor {
        id: "user".to_string(),
        label: "User Factor".to_string(),
        value: user_score,
        score: user_score,
        weight: 0.0,
        contribution: 0.0,
        stance: factor_stance(user_score, USER_FACTOR_STANCE_DEADBAND),
        explanation: "User-provided stance adjustment.".to_string(),
    });

    let weights = default_factor_weights();
    let mut agg_score = 0.0;
    for factor in &mut factors {
        let weight = weight_overrides.and_then(|o| o.get(&factor.id)).copied().unwrap_or_else(|| weights[factor.id.as_str()]);
        factor.weight = weight;
        factor.contribution = weight * factor.score;
        agg_score += factor.contribution;
    }

    let p_up = sigmoid(agg_score * 1.6);
    let p_down = 1.0 - p_up;
    let confidence = (p_up - 0.5).abs() * 2.0;
    let signal = if p_up > 0.6 {
        context_core::TradeSignal::Buy
    } else if p_up < 0.4 {
        context_core::TradeSignal::Sell
    } else {
        context_core::TradeSignal::Hold
    };

    Ok(AnalysisReport {
        ticker: ticker.to_string(),
        date: last_row.date,
        as_of: AsOf { t: fetched_at, close: latest_close },
        candles: CandleWindow { count: series.rows.len() as u32, from: series.rows.first().unwrap().date, to: last_row.date },
        aggregate: Aggregate { score: agg_score, p_up, p_down, signal, confidence },
        factors,
        meta: AnalysisMeta { provider: provider.to_string(), years, range: years_to_range(years).to_string(), fetched_at },
    })
}

fn piecewise_rsi_score(rsi_val: f64) -> f64 {
    let score = if rsi_val <= 30.0 {
        0.5 + 0.5 * (30.0 - rsi_val) / 30.0
    } else if rsi_val >= 70.0 {
        -0.5 - 0.5 * (rsi_val - 70.0) / 30.0
    } else {
        (rsi_val - 50.0) / 40.0
    };
    score.clamp(-1.0, 1.0)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
