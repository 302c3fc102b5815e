//! The fundamental factor model (§4.5): `FinancialSnapshot` → `FundamentalSignal`.
//!
//! Grounded on `financial_engine/main.py`'s `_compute_fundamental_factor_signal`:
//! five weighted factors, each the mean of linearly-mapped sub-scores in
//! `[-1, 1]`, ported metric-for-metric including the exact bound tuples and
//! metric name fallback chains.

use std::collections::HashMap;

use context_core::{Factor, FundamentalSignal, OverallScore, Signal, StatementKind, StatementRow};

const FACTOR_NAMES: [&str; 5] = ["growth", "profitability", "cashflow_quality", "balance_sheet", "valuation"];

fn factor_weight(name: &str) -> f64 {
    match name {
        "growth" => 0.34,
        "profitability" => 0.24,
        "cashflow_quality" => 0.22,
        "balance_sheet" => 0.14,
        "valuation" => 0.06,
        _ => 0.0,
    }
}

/// Linear map of a raw metric into `[-1, 1]` with the given bounds, clipped
/// before mapping. `invert` flips the sign for "higher is worse" metrics
/// (e.g. P/E, debt-to-equity).
fn score_linear(value: Option<f64>, lower: f64, upper: f64, invert: bool) -> Option<f64> {
    let value = value?;
    if upper <= lower {
        return None;
    }
    let clipped = value.clamp(lower, upper);
    let mut s = ((clipped - lower) / (upper - lower)) * 2.0 - 1.0;
    if invert {
        s = -s;
    }
    Some(s.clamp(-1.0, 1.0))
}

/// Mean of the available sub-scores; `(score, available_count, total_count)`.
fn mean_score(values: &[Option<f64>]) -> (f64, u32, u32) {
    let total = values.len() as u32;
    let valid: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if valid.is_empty() {
        return (0.0, 0, total);
    }
    (valid.iter().sum::<f64>() / valid.len() as f64, valid.len() as u32, total)
}

fn pct_change(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    let cur = current?;
    let prev = previous?;
    if prev == 0.0 {
        return None;
    }
    Some(((cur - prev) / prev.abs()) * 100.0)
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let n = numerator?;
    let d = denominator?;
    if d == 0.0 {
        return None;
    }
    Some(n / d)
}

fn sorted_desc(rows: &[StatementRow]) -> Vec<&StatementRow> {
    let mut rows: Vec<&StatementRow> = rows.iter().collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    rows
}

fn metric_from_row(row: Option<&&StatementRow>, candidates: &[&str]) -> Option<f64> {
    let row = row?;
    candidates.iter().find_map(|c| row.metric(c))
}

fn signal_from_score(score: f64) -> Signal {
    if score >= 0.20 {
        Signal::Bullish
    } else if score <= -0.20 {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

/// Computes the five-factor fundamental signal from a merged snapshot.
pub fn compute_fundamental_signal(snapshot: &context_core::FinancialSnapshot) -> FundamentalSignal {
    let q_fin = sorted_desc(snapshot.rows(StatementKind::QuarterlyFinancials));
    let q_bal = sorted_desc(snapshot.rows(StatementKind::QuarterlyBalanceSheet));
    let q_cf = sorted_desc(snapshot.rows(StatementKind::QuarterlyCashflow));
    let q_earn = sorted_desc(snapshot.rows(StatementKind::QuarterlyEarnings));

    let fin0 = q_fin.first();
    let fin1 = q_fin.get(1);
    let fin4 = q_fin.get(4);
    let bal0 = q_bal.first();
    let cf0 = q_cf.first();
    let cf1 = q_cf.get(1);
    let earn0 = q_earn.first();
    let earn1 = q_earn.get(1);
    let earn4 = q_earn.get(4);

    let revenue0 = metric_from_row(fin0, &["Total Revenue", "Revenue"]).or_else(|| metric_from_row(earn0, &["Revenue"]));
    let revenue1 = metric_from_row(fin1, &["Total Revenue", "Revenue"]).or_else(|| metric_from_row(earn1, &["Revenue"]));
    let revenue4 = metric_from_row(fin4, &["Total Revenue", "Revenue"]).or_else(|| metric_from_row(earn4, &["Revenue"]));
    let eps0 = metric_from_row(earn0, &["Earnings", "Diluted EPS", "Basic EPS"]);
    let eps1 = metric_from_row(earn1, &["Earnings", "Diluted EPS", "Basic EPS"]);
    let eps4 = metric_from_row(earn4, &["Earnings", "Diluted EPS", "Basic EPS"]);

    let gross_profit0 = metric_from_row(fin0, &["Gross Profit"]);
    let gross_profit1 = metric_from_row(fin1, &["Gross Profit"]);
    let operating_income0 = metric_from_row(fin0, &["Operating Income"]);
    let net_income0 = metric_from_row(fin0, &["Net Income"]);
    let net_income1 = metric_from_row(fin1, &["Net Income"]);
    let fcf0 = metric_from_row(cf0, &["Free Cash Flow"]);
    let fcf1 = metric_from_row(cf1, &["Free Cash Flow"]);
    let ocf0 = metric_from_row(cf0, &["Operating Cash Flow"]);

    let total_debt0 = metric_from_row(bal0, &["Total Debt"]);
    let equity0 = metric_from_row(bal0, &["Common Stock Equity", "Stockholders Equity", "Total Equity Gross Minority Interest"]);
    let cash0 = metric_from_row(bal0, &["Cash And Cash Equivalents", "Cash Cash Equivalents And Short Term Investments"]);
    let current_assets0 = metric_from_row(bal0, &["Current Assets"]);
    let current_liabilities0 = metric_from_row(bal0, &["Current Liabilities", "Current Liabilities Net Minority Interest"]);

    let revenue_qoq = pct_change(revenue0, revenue1);
    let revenue_yoy = pct_change(revenue0, revenue4);
    let eps_qoq = pct_change(eps0, eps1);
    let eps_yoy = pct_change(eps0, eps4);
    let fcf_qoq = pct_change(fcf0, fcf1);

    let gross_margin = ratio(gross_profit0, revenue0);
    let gross_margin_prev = ratio(gross_profit1, revenue1);
    let operating_margin = ratio(operating_income0, revenue0);
    let net_margin = ratio(net_income0, revenue0);
    let net_margin_prev = ratio(net_income1, revenue1);
    let gross_margin_delta = match (gross_margin, gross_margin_prev) {
        (Some(a), Some(b)) => Some(a - b),
        _ => None,
    };
    let net_margin_delta = match (net_margin, net_margin_prev) {
        (Some(a), Some(b)) => Some(a - b),
        _ => None,
    };

    let fcf_margin = ratio(fcf0, revenue0);
    let ocf_to_net_income = ratio(ocf0, net_income0);

    let debt_to_equity = ratio(total_debt0, equity0);
    let cash_to_debt = ratio(cash0, total_debt0);
    let current_ratio = ratio(current_assets0, current_liabilities0);

    let trailing_pe = snapshot.valuations.trailing_pe;
    let price_to_sales = snapshot.valuations.price_to_sales;
    let price_to_book = snapshot.valuations.price_to_book;

    let factor_metric_scores: HashMap<&str, Vec<Option<f64>>> = HashMap::from([
        (
            "growth",
            vec![
                score_linear(revenue_qoq, -15.0, 15.0, false),
                score_linear(revenue_yoy, -30.0, 30.0, false),
                score_linear(eps_qoq, -25.0, 25.0, false),
                score_linear(eps_yoy, -40.0, 40.0, false),
            ],
        ),
        (
            "profitability",
            vec![
                score_linear(gross_margin, 0.20, 0.65, false),
                score_linear(operating_margin, 0.05, 0.30, false),
                score_linear(net_margin, 0.03, 0.22, false),
                score_linear(gross_margin_delta, -0.03, 0.03, false),
                score_linear(net_margin_delta, -0.02, 0.02, false),
            ],
        ),
        (
            "cashflow_quality",
            vec![
                score_linear(fcf_margin, 0.00, 0.20, false),
                score_linear(ocf_to_net_income, 0.60, 1.60, false),
                score_linear(fcf_qoq, -30.0, 30.0, false),
            ],
        ),
        (
            "balance_sheet",
            vec![
                score_linear(debt_to_equity, 0.20, 2.50, true),
                score_linear(cash_to_debt, 0.10, 1.20, false),
                score_linear(current_ratio, 1.00, 2.50, false),
            ],
        ),
        (
            "valuation",
            vec![
                score_linear(trailing_pe, 10.0, 40.0, true),
                score_linear(price_to_sales, 1.0, 12.0, true),
                score_linear(price_to_book, 1.0, 10.0, true),
            ],
        ),
    ]);

    let mut factors = Vec::with_capacity(FACTOR_NAMES.len());
    let mut total_score = 0.0;
    let mut available_total = 0u32;
    let mut metrics_total = 0u32;
    let mut contributions = HashMap::new();

    for name in FACTOR_NAMES {
        let scores = &factor_metric_scores[name];
        let (score, available, total) = mean_score(scores);
        let weight = factor_weight(name);
        let contribution = score * weight;
        total_score += contribution;
        available_total += available;
        metrics_total += total;
        contributions.insert(name.to_string(), contribution);
        factors.push(Factor {
            name: name.to_string(),
            weight,
            score,
            contribution,
            available_metrics: available,
            total_metrics: total,
        });
    }

    let confidence = if metrics_total > 0 { (available_total as f64 / metrics_total as f64).clamp(0.0, 1.0) } else { 0.0 };
    let overall_score = total_score.clamp(-1.0, 1.0);

    let derived_metrics = HashMap::from([
        ("revenue_qoq_pct".to_string(), revenue_qoq),
        ("revenue_yoy_pct".to_string(), revenue_yoy),
        ("eps_qoq_pct".to_string(), eps_qoq),
        ("eps_yoy_pct".to_string(), eps_yoy),
        ("gross_margin".to_string(), gross_margin),
        ("operating_margin".to_string(), operating_margin),
        ("net_margin".to_string(), net_margin),
        ("gross_margin_delta".to_string(), gross_margin_delta),
        ("net_margin_delta".to_string(), net_margin_delta),
        ("fcf_margin".to_string(), fcf_margin),
        ("ocf_to_net_income".to_string(), ocf_to_net_income),
        ("fcf_qoq_pct".to_string(), fcf_qoq),
        ("debt_to_equity".to_string(), debt_to_equity),
        ("cash_to_debt".to_string(), cash_to_debt),
        ("current_ratio".to_string(), current_ratio),
        ("trailing_pe".to_string(), trailing_pe),
        ("price_to_sales".to_string(), price_to_sales),
        ("price_to_book".to_string(), price_to_book),
    ]);

    FundamentalSignal {
        overall: OverallScore { score: overall_score, signal: signal_from_score(overall_score), confidence },
        factors,
        factor_contributions: contributions,
        derived_metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_core::{FinancialSnapshot, Valuations};
    use std::collections::HashMap as Map;

    fn row(date: &str, metrics: &[(&str, f64)]) -> StatementRow {
        let mut m = Map::new();
        for (k, v) in metrics {
            m.insert(k.to_string(), Some(*v));
        }
        StatementRow { date: date.to_string(), metrics: m }
    }

    fn snapshot() -> FinancialSnapshot {
        let mut statements = Map::new();
        statements.insert(
            StatementKind::QuarterlyFinancials,
            vec![
                row("2025-06-30", &[("Total Revenue", 120.0), ("Gross Profit", 60.0), ("Operating Income", 20.0), ("Net Income", 15.0)]),
                row("2025-03-31", &[("Total Revenue", 110.0), ("Gross Profit", 50.0), ("Operating Income", 15.0), ("Net Income", 10.0)]),
            ],
        );
        statements.insert(StatementKind::QuarterlyBalanceSheet, vec![row("2025-06-30", &[("Total Debt", 40.0), ("Stockholders Equity", 200.0), ("Current Assets", 150.0), ("Current Liabilities", 80.0)])]);
        statements.insert(StatementKind::QuarterlyCashflow, vec![row("2025-06-30", &[("Free Cash Flow", 18.0), ("Operating Cash Flow", 22.0)])]);
        statements.insert(StatementKind::QuarterlyEarnings, vec![row("2025-06-30", &[("Earnings", 1.2)])]);

        FinancialSnapshot {
            ticker: "TEST".to_string(),
            statements,
            company_info: Map::new(),
            valuations: Valuations { trailing_pe: Some(22.0), price_to_sales: Some(5.0), price_to_book: Some(8.0) },
            fetched_at: chrono::Utc::now(),
            cache_meta: Default::default(),
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let sum: f64 = FACTOR_NAMES.iter().map(|n| factor_weight(n)).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_linear_clips_and_inverts() {
        assert_eq!(score_linear(Some(10.0), 0.0, 20.0, false), Some(0.0));
        assert_eq!(score_linear(Some(100.0), 0.0, 20.0, false), Some(1.0));
        assert_eq!(score_linear(Some(-100.0), 0.0, 20.0, false), Some(-1.0));
        assert_eq!(score_linear(Some(0.0), 0.0, 20.0, true), Some(0.0));
        assert_eq!(score_linear(Some(20.0), 0.0, 20.0, true), Some(-1.0));
        assert_eq!(score_linear(None, 0.0, 20.0, false), None);
    }

    #[test]
    fn signal_bounds_and_confidence_in_range() {
        let signal = compute_fundamental_signal(&snapshot());
        assert!(signal.overall.score.abs() <= 1.0);
        assert!(signal.overall.confidence >= 0.0 && signal.overall.confidence <= 1.0);
        assert_eq!(signal.factors.len(), 5);
        let weight_sum: f64 = signal.factors.iter().map(|f| f.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_yields_zero_confidence_and_zero_score() {
        let empty = FinancialSnapshot {
            ticker: "EMPTY".to_string(),
            statements: Map::new(),
            company_info: Map::new(),
            valuations: Valuations::default(),
            fetched_at: chrono::Utc::now(),
            cache_meta: Default::default(),
        };
        let signal = compute_fundamental_signal(&empty);
        assert_eq!(signal.overall.confidence, 0.0);
        assert_eq!(signal.overall.score, 0.0);
        assert!(signal.factors.iter().all(|f| f.score == 0.0));
    }
}
