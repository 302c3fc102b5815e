//! OHLCV → [`TechnicalFeatures`] (§4.5 technical half).

use context_core::{EngineError, EngineResult, MaSignal, Macd, OhlcvSeries, RsiSignal, TechnicalFeatures, Trend};

use crate::indicators::{ema, linear_slope, macd as macd_indicator, rsi, sma};

const MIN_CLOSES: usize = 200;
const TREND_LOOKBACK: usize = 10;

pub fn compute_technical_features(series: &OhlcvSeries) -> EngineResult<TechnicalFeatures> {
    let closes = series.closes();
    if closes.len() < MIN_CLOSES {
        return Err(EngineError::config(format!(
            "technical features require at least {MIN_CLOSES} valid closes, got {}",
            closes.len()
        )));
    }

    let latest_close = *closes.last().unwrap();
    let prev_close = closes[closes.len() - 2];
    let return_1d = if prev_close != 0.0 { (latest_close - prev_close) / prev_close * 100.0 } else { 0.0 };

    let ma_20 = *sma(&closes, 20).last().unwrap();
    let ma_50_series = sma(&closes, 50);
    let ma_200_series = sma(&closes, 200);
    let ma_50 = *ma_50_series.last().unwrap();
    let ma_200 = *ma_200_series.last().unwrap();

    let rsi_14 = rsi(&closes, 14).last().copied().unwrap_or(50.0);
    let macd_result = macd_indicator(&closes, 12, 26, 9);
    let macd = Macd {
        line: macd_result.macd_line.last().copied().unwrap_or(0.0),
        signal: macd_result.signal_line.last().copied().unwrap_or(0.0),
        hist: macd_result.histogram.last().copied().unwrap_or(0.0),
    };

    let trend_window = &closes[closes.len() - TREND_LOOKBACK.min(closes.len())..];
    let trend = classify_trend(trend_window);

    let ma_signal = classify_ma_signal(&ma_50_series, &ma_200_series);

    let rsi_signal = if rsi_14 > 70.0 {
        RsiSignal::Overbought
    } else if rsi_14 < 30.0 {
        RsiSignal::Oversold
    } else {
        RsiSignal::Neutral
    };

    Ok(TechnicalFeatures { latest_close, return_1d, ma_20, ma_50, ma_200, rsi_14, macd, trend, ma_signal, rsi_signal })
}

/// Classify the slope of a linear fit over the trailing window. The
/// threshold is a small fraction of the window's average price level so it
/// scales across tickers rather than using an absolute epsilon.
fn classify_trend(window: &[f64]) -> Trend {
    if window.len() < TREND_LOOKBACK || window.iter().all(|&c| c == window[0]) {
        return Trend::Unknown;
    }
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let epsilon = mean * 0.001;
    let slope = linear_slope(window);
    if slope > epsilon {
        Trend::Up
    } else if slope < -epsilon {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// Compares yesterday's and today's (ma_50, ma_200) pairs to detect a cross
/// event; when no cross just fired, reports the ongoing state.
fn classify_ma_signal(ma_50: &[f64], ma_200: &[f64]) -> MaSignal {
    let today_50 = *ma_50.last().unwrap();
    let today_200 = *ma_200.last().unwrap();
    let prev = ma_50.len().checked_sub(2).zip(ma_200.len().checked_sub(2));

    if let Some((i50, i200)) = prev {
        let prev_50 = ma_50[i50];
        let prev_200 = ma_200[i200];
        if prev_50 <= prev_200 && today_50 > today_200 {
            return MaSignal::GoldenCross;
        }
        if prev_50 >= prev_200 && today_50 < today_200 {
            return MaSignal::DeathCross;
        }
    }

    if today_50 > today_200 {
        MaSignal::GoldenCrossState
    } else if today_50 < today_200 {
        MaSignal::DeathCrossState
    } else {
        MaSignal::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use context_core::OhlcvRow;

    fn series_of(closes: &[f64]) -> OhlcvSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let rows = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| OhlcvRow { date: start + chrono::Duration::days(i as i64), open: c, high: c, low: c, close: c, volume: 1_000.0 })
            .collect();
        OhlcvSeries { ticker: "TEST".to_string(), rows }
    }

    #[test]
    fn rejects_fewer_than_200_closes() {
        let series = series_of(&vec![1.0; 50]);
        assert!(compute_technical_features(&series).is_err());
    }

    #[test]
    fn rising_series_yields_up_trend_and_golden_state() {
        let closes: Vec<f64> = (0..220).map(|i| 100.0 + i as f64).collect();
        let series = series_of(&closes);
        let features = compute_technical_features(&series).unwrap();
        assert_eq!(features.trend, Trend::Up);
        assert_eq!(features.ma_signal, MaSignal::GoldenCrossState);
        assert_eq!(features.rsi_signal, RsiSignal::Overbought);
    }

    #[test]
    fn flat_series_yields_unknown_trend_and_neutral_ma_signal() {
        let closes = vec![100.0; 210];
        let series = series_of(&closes);
        let features = compute_technical_features(&series).unwrap();
        assert_eq!(features.trend, Trend::Unknown);
        assert_eq!(features.ma_signal, MaSignal::Neutral);
    }
}
