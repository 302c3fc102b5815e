//! Append-merge for time-series record lists (§4.4). Both merges are pure
//! and synchronous — they MUST NOT suspend (§5) — and both satisfy
//! `merge(merge(a, b), b) == merge(a, b)`.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, Utc};
use context_core::{OhlcvRow, StatementRow};

pub const DEFAULT_OHLCV_BACK_LOOK_DAYS: i64 = 7;

/// Merge two statement-row lists keyed by `date`, "new overrides old",
/// output strictly descending by `date`. `date` is `YYYY-MM-DD`, so string
/// descending order is calendar-descending order (§9).
pub fn merge_statement_rows(old: &[StatementRow], new: &[StatementRow]) -> Vec<StatementRow> {
    let mut by_date: HashMap<&str, StatementRow> = HashMap::with_capacity(old.len() + new.len());
    for row in old {
        by_date.insert(&row.date, row.clone());
    }
    for row in new {
        by_date.insert(&row.date, row.clone());
    }
    let mut rows: Vec<StatementRow> = by_date.into_values().collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    rows
}

/// Merge two OHLCV row lists keyed by date: concatenate, keep the last
/// occurrence per date ("new overrides old"), sort ascending, and drop any
/// row whose date is in the future relative to `today` (§8 invariant).
pub fn merge_ohlcv_rows(old: &[OhlcvRow], new: &[OhlcvRow], today: NaiveDate) -> Vec<OhlcvRow> {
    let mut by_date: HashMap<NaiveDate, OhlcvRow> = HashMap::with_capacity(old.len() + new.len());
    for row in old {
        by_date.insert(row.date, *row);
    }
    for row in new {
        by_date.insert(row.date, *row);
    }
    let mut rows: Vec<OhlcvRow> = by_date.into_values().filter(|r| r.date <= today).collect();
    rows.sort_by_key(|r| r.date);
    rows
}

/// Convenience wrapper using the current UTC date as the future-date cutoff.
pub fn merge_ohlcv_rows_now(old: &[OhlcvRow], new: &[OhlcvRow]) -> Vec<OhlcvRow> {
    merge_ohlcv_rows(old, new, Utc::now().date_naive())
}

/// The bounded back-look start date: on every incremental refresh, the
/// `back_look_days` most recent stored days are re-fetched to absorb
/// upstream back-corrections (§4.4).
pub fn back_look_start(latest_stored: NaiveDate, back_look_days: i64) -> NaiveDate {
    latest_stored - Duration::days(back_look_days.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, metric: f64) -> StatementRow {
        let mut metrics = std::collections::HashMap::new();
        metrics.insert("Total Revenue".to_string(), Some(metric));
        StatementRow { date: date.to_string(), metrics }
    }

    fn ohlcv(date: &str, close: f64) -> OhlcvRow {
        OhlcvRow { date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(), open: close, high: close, low: close, close, volume: 1.0 }
    }

    #[test]
    fn statement_merge_dedupes_and_sorts_descending() {
        let old = vec![row("2024-12-31", 100.0), row("2024-09-30", 90.0)];
        let new = vec![row("2024-12-31", 105.0), row("2025-03-31", 110.0)];
        let merged = merge_statement_rows(&old, &new);
        let dates: Vec<&str> = merged.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-03-31", "2024-12-31", "2024-09-30"]);
        assert_eq!(merged[1].metric("Total Revenue"), Some(105.0), "new overrides old for the same date");
    }

    #[test]
    fn statement_merge_is_idempotent() {
        let a = vec![row("2024-12-31", 100.0)];
        let b = vec![row("2025-03-31", 110.0)];
        let once = merge_statement_rows(&a, &b);
        let twice = merge_statement_rows(&once, &b);
        assert_eq!(once, twice);
    }

    #[test]
    fn ohlcv_merge_sorts_ascending_and_drops_future_dates() {
        let old = vec![ohlcv("2025-02-01", 1.0), ohlcv("2025-02-02", 2.0)];
        let new = vec![ohlcv("2025-02-02", 2.5), ohlcv("2025-02-03", 3.0), ohlcv("2099-01-01", 999.0)];
        let today = NaiveDate::parse_from_str("2025-02-03", "%Y-%m-%d").unwrap();
        let merged = merge_ohlcv_rows(&old, &new, today);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].close, 2.5, "new overrides old for the same date");
        assert!(merged.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn ohlcv_merge_is_idempotent() {
        let a = vec![ohlcv("2025-02-01", 1.0)];
        let b = vec![ohlcv("2025-02-02", 2.0)];
        let today = NaiveDate::parse_from_str("2025-02-02", "%Y-%m-%d").unwrap();
        let once = merge_ohlcv_rows(&a, &b, today);
        let twice = merge_ohlcv_rows(&once, &b, today);
        assert_eq!(once, twice);
    }

    #[test]
    fn back_look_start_subtracts_days() {
        let latest = NaiveDate::parse_from_str("2025-02-10", "%Y-%m-%d").unwrap();
        assert_eq!(back_look_start(latest, 7), NaiveDate::parse_from_str("2025-02-03", "%Y-%m-%d").unwrap());
    }
}
