//! Plain-language earnings interpretation (§6 `get_interpreted_earnings`).
//!
//! Grounded on `financial_engine/main.py`'s `_records_to_interpretation_dict`
//! (sort rows newest-first, pivot from row-per-date to list-per-metric) feeding
//! an `_interpret_financials` pass. The original's interpretation body isn't
//! in the retrieved source; this reimplements the same newest-vs-previous
//! quarter-over-quarter read the pivoted shape is built for.

use std::collections::{BTreeMap, HashMap};

use context_core::{StatementRow, Valuations};
use serde::{Deserialize, Serialize};

/// One metric pivoted across quarters, newest first — the shape
/// `_records_to_interpretation_dict` produces.
pub type MetricSeries = HashMap<String, Vec<Option<f64>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretationData {
    pub financials: MetricSeries,
    pub earnings: MetricSeries,
    pub valuations: Valuations,
    pub info: HashMap<String, serde_json::Value>,
}

/// Sorts `rows` newest-first by date, then pivots into `{metric: [values...]}`.
pub fn records_to_interpretation_dict(rows: &[StatementRow]) -> MetricSeries {
    let mut sorted: Vec<&StatementRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));

    let mut out: MetricSeries = HashMap::new();
    for row in sorted {
        // BTreeMap keeps iteration order stable regardless of the
        // HashMap's own hashing, which matters for interpretation order.
        let sorted_metrics: BTreeMap<&String, &Option<f64>> = row.metrics.iter().collect();
        for (metric, value) in sorted_metrics {
            out.entry(metric.clone()).or_default().push(*value);
        }
    }
    out
}

fn describe_metric(metric: &str, series: &[Option<f64>]) -> Option<String> {
    let latest = series.first().copied().flatten()?;
    let previous = series.get(1).copied().flatten();

    match previous {
        Some(prev) if prev != 0.0 => {
            let pct = (latest - prev) / prev.abs() * 100.0;
            let direction = if pct > 0.0 { "rose" } else if pct < 0.0 { "fell" } else { "held steady" };
            Some(format!("{metric} {direction} {:.1}% quarter-over-quarter to {latest:.2}.", pct.abs()))
        }
        _ => Some(format!("{metric} is {latest:.2}, with no prior quarter to compare against.")),
    }
}

/// One sentence per metric with at least a latest value, `financials` before
/// `earnings`, alphabetical within each group for determinism.
pub fn interpret_financials(data: &InterpretationData) -> Vec<String> {
    let mut out = Vec::new();
    for group in [&data.financials, &data.earnings] {
        let mut metrics: Vec<&String> = group.keys().collect();
        metrics.sort();
        for metric in metrics {
            if let Some(line) = describe_metric(metric, &group[metric]) {
                out.push(line);
            }
        }
    }
    out
}
