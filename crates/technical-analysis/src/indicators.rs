//! Indicator math shared by [`crate::features`] and [`crate::report`].
//!
//! Carried over from the teacher's candlestick/signal-scoring crate:
//! `sma`/`ema`/`rsi`/`macd` are kept close to verbatim, the rest of that
//! crate's indicator library (Bollinger, ADX, Ichimoku, …) had no
//! counterpart in this factor model and was dropped.

/// Return `val` if finite, otherwise `default`.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }
    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(finite_or(sum / period as f64, 0.0));
    }
    result
}

pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.is_empty() {
        return vec![];
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    if data.len() < period {
        let avg = data.iter().sum::<f64>() / data.len() as f64;
        return vec![finite_or(avg, 0.0)];
    }
    let sma_seed = finite_or(data[..period].iter().sum::<f64>() / period as f64, 0.0);
    let mut result = Vec::with_capacity(data.len());
    for _ in 0..period {
        result.push(sma_seed);
    }
    for i in period..data.len() {
        let prev_ema = result[i - 1];
        let ema_val = (data[i] - prev_ema) * multiplier + prev_ema;
        result.push(finite_or(ema_val, prev_ema));
    }
    result
}

/// Wilder-style RSI: rolling means over gains/losses, seeded by a simple
/// average over the first `period` changes.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }
    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }
    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(data.len() - period);
    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        let rs = if avg_loss == 0.0 { 100.0 } else { avg_gain / avg_loss };
        out.push(finite_or(100.0 - (100.0 / (1.0 + rs)), 50.0));
    }
    out
}

pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdResult {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdResult { macd_line: vec![], signal_line: vec![], histogram: vec![] };
    }
    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);
    let offset = slow_period - fast_period;
    let mut macd_line = Vec::new();
    for i in offset..ema_fast.len() {
        macd_line.push(ema_fast[i] - ema_slow[i - offset]);
    }
    let signal_line = ema(&macd_line, signal_period);
    let mut histogram = Vec::new();
    let hist_offset = macd_line.len().saturating_sub(signal_line.len());
    for i in 0..signal_line.len() {
        histogram.push(macd_line[i + hist_offset] - signal_line[i]);
    }
    MacdResult { macd_line, signal_line, histogram }
}

/// Sample standard deviation (ddof=0, matching pandas' `Series.std` default
/// is ddof=1, but the original clamps the denominator away from zero anyway
/// so the small bias doesn't change behavior at the thresholds used here).
pub fn stdev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    finite_or(variance.sqrt(), 0.0)
}

/// Least-squares slope of `data` against its index `0..len`.
pub fn linear_slope(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    if data.len() < 2 {
        return 0.0;
    }
    let x_mean = (data.len() - 1) as f64 / 2.0;
    let y_mean = data.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in data.iter().enumerate() {
        let x = i as f64 - x_mean;
        num += x * (y - y_mean);
        den += x * x;
    }
    if den == 0.0 {
        0.0
    } else {
        finite_or(num / den, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_matches_manual_average() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&data, 3), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn ema_seed_is_sma_over_first_period() {
        let data = [1.0, 2.0, 3.0, 4.0];
        let out = ema(&data, 2);
        assert_eq!(out[0], 1.5);
        assert_eq!(out[1], 1.5);
    }

    #[test]
    fn rsi_is_100_when_no_losses() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let out = rsi(&data, 14);
        assert_eq!(out.last().copied(), Some(100.0));
    }

    #[test]
    fn linear_slope_detects_uptrend() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(linear_slope(&data) > 0.0);
    }

    #[test]
    fn linear_slope_is_zero_for_flat_series() {
        let data = [5.0, 5.0, 5.0, 5.0];
        assert_eq!(linear_slope(&data), 0.0);
    }

    #[test]
    fn stdev_of_constant_series_is_zero() {
        assert_eq!(stdev(&[3.0, 3.0, 3.0]), 0.0);
    }
}
