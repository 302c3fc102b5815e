//! The financial-snapshot refresh policy: decides, per refresh attempt,
//! whether the cached value is good enough or an upstream refresh is due,
//! and records *why* (§4.2, §8 scenario 2).
//!
//! Grounded on `financial_engine/main.py`'s `_should_refresh_financials`:
//! the boundary captured by the *previous* successful refresh is trusted
//! first (it directly answers "did we already refresh after the earnings
//! day that was pending last time"), and only falls through to the
//! freshly-fetched earnings date when the cached one doesn't resolve the
//! question.

use chrono::NaiveDate;
use context_core::CacheMeta;

pub const DEFAULT_NO_EARNINGS_MAX_STALENESS_DAYS: i64 = 3;

/// Returns whether a refresh should run and a stable machine-readable
/// reason string, matching the source's reason vocabulary exactly so
/// dashboards and tests built against the original behavior keep working.
pub fn should_refresh_financials(
    cache_meta: Option<&CacheMeta>,
    fresh_next_earnings_date: Option<NaiveDate>,
    force_refresh: bool,
    today: NaiveDate,
    no_earnings_max_staleness_days: i64,
) -> (bool, &'static str) {
    if force_refresh {
        return (true, "force_refresh");
    }
    let Some(meta) = cache_meta else {
        return (true, "cold_start");
    };
    let Some(last_refreshed_at) = meta.last_refreshed_at else {
        return (true, "missing_last_refresh_date");
    };
    let last_refresh_date = last_refreshed_at.date_naive();

    let cached_next_earnings_date =
        meta.next_earnings_date.as_deref().and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

    if let Some(cached_earnings) = cached_next_earnings_date {
        if today < cached_earnings {
            return (false, "before_cached_earnings_day");
        }
        if last_refresh_date < cached_earnings {
            return (true, "cached_earnings_day_passed");
        }
        if let Some(fresh) = fresh_next_earnings_date {
            if fresh <= cached_earnings {
                return (false, "already_refreshed_after_cached_earnings");
            }
        }
    }

    match fresh_next_earnings_date {
        None => {
            let stale_days = (today - last_refresh_date).num_days();
            if stale_days >= no_earnings_max_staleness_days.max(1) {
                (true, "no_earnings_date_stale_timeout")
            } else {
                (false, "no_earnings_date_recent")
            }
        }
        Some(next) => {
            if today < next {
                (false, "before_earnings_day")
            } else if last_refresh_date >= next {
                (false, "already_refreshed_after_earnings")
            } else {
                (true, "earnings_day_passed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn meta(last_refreshed: &str, next_earnings: Option<&str>) -> CacheMeta {
        CacheMeta {
            last_refreshed_at: Some(Utc.datetime_from_str(last_refreshed, "%Y-%m-%dT%H:%M:%SZ").unwrap()),
            next_earnings_date: next_earnings.map(|s| s.to_string()),
            refresh_reason: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn cold_start_with_no_cache_meta() {
        let (refresh, reason) = should_refresh_financials(None, None, false, date("2025-02-22"), 3);
        assert!(refresh);
        assert_eq!(reason, "cold_start");
    }

    #[test]
    fn force_refresh_always_wins() {
        let m = meta("2025-02-20T18:00:00Z", Some("2025-02-21"));
        let (refresh, reason) = should_refresh_financials(Some(&m), Some(date("2025-05-22")), true, date("2025-02-22"), 3);
        assert!(refresh);
        assert_eq!(reason, "force_refresh");
    }

    /// §8 scenario 2: cached earnings day already passed without a refresh.
    #[test]
    fn cached_earnings_day_passed_triggers_refresh() {
        let m = meta("2025-02-20T18:00:00Z", Some("2025-02-21"));
        let (refresh, reason) =
            should_refresh_financials(Some(&m), Some(date("2025-05-22")), false, date("2025-02-22"), 3);
        assert!(refresh);
        assert_eq!(reason, "cached_earnings_day_passed");
    }

    #[test]
    fn before_cached_earnings_day_holds() {
        let m = meta("2025-02-10T18:00:00Z", Some("2025-02-21"));
        let (refresh, reason) =
            should_refresh_financials(Some(&m), Some(date("2025-02-21")), false, date("2025-02-15"), 3);
        assert!(!refresh);
        assert_eq!(reason, "before_cached_earnings_day");
    }

    #[test]
    fn already_refreshed_after_cached_earnings_holds() {
        let m = meta("2025-02-22T18:00:00Z", Some("2025-02-21"));
        let (refresh, reason) =
            should_refresh_financials(Some(&m), Some(date("2025-02-21")), false, date("2025-02-23"), 3);
        assert!(!refresh);
        assert_eq!(reason, "already_refreshed_after_cached_earnings");
    }

    #[test]
    fn no_earnings_date_recent_then_stale_timeout() {
        let m = meta("2025-02-20T18:00:00Z", None);
        let (refresh, reason) = should_refresh_financials(Some(&m), None, false, date("2025-02-21"), 3);
        assert!(!refresh);
        assert_eq!(reason, "no_earnings_date_recent");

        let (refresh, reason) = should_refresh_financials(Some(&m), None, false, date("2025-02-24"), 3);
        assert!(refresh);
        assert_eq!(reason, "no_earnings_date_stale_timeout");
    }

    #[test]
    fn earnings_day_passed_without_cached_boundary() {
        let m = meta("2025-02-10T18:00:00Z", None);
        let (refresh, reason) = should_refresh_financials(Some(&m), Some(date("2025-02-21")), false, date("2025-02-22"), 3);
        assert!(refresh);
        assert_eq!(reason, "earnings_day_passed");
    }
}
