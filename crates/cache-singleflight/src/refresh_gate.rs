//! A small, separate refresh-coalescing primitive for OHLCV refreshes,
//! distinct from the layered [`crate::singleflight::SingleflightCache`] used
//! for financial snapshots (§9 supplemental note, SPEC_FULL §2).
//!
//! Grounded on `trading_data_engine/main.py`'s `_maybe_refresh_daily_once`:
//! best-effort, single-process de-duplication of refresh calls — not a
//! distributed lock. A successful refresh is remembered for
//! `min_interval`; a failed one backs off for `fail_backoff`. A follower
//! that finds a refresh already in flight waits up to 12s for it to finish
//! rather than starting a second one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

const FOLLOWER_WAIT: Duration = Duration::from_secs(12);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller ran the refresh; carries whether it succeeded.
    Refreshed { ok: bool },
    /// A refresh was already in flight; this caller waited (bounded) for it.
    WaitedForLeader,
    /// Skipped: a successful refresh happened within `min_interval`.
    SkippedFresh,
    /// Skipped: a failed refresh happened within `fail_backoff`.
    SkippedBackoff,
}

struct TickerState {
    last_ok_at: Option<Instant>,
    last_fail_at: Option<Instant>,
    inflight: Option<Arc<Notify>>,
}

impl Default for TickerState {
    fn default() -> Self {
        Self { last_ok_at: None, last_fail_at: None, inflight: None }
    }
}

pub struct RefreshGate {
    min_interval: Duration,
    fail_backoff: Duration,
    state: Mutex<HashMap<String, TickerState>>,
}

impl RefreshGate {
    pub fn new(min_interval: Duration, fail_backoff: Duration) -> Self {
        Self { min_interval, fail_backoff, state: Mutex::new(HashMap::new()) }
    }

    /// `MIN_REFRESH_INTERVAL_SECONDS` / `FAIL_BACKOFF_SECONDS` defaults (§6).
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(600), Duration::from_secs(60))
    }

    /// Runs `refresh` for `ticker` unless a recent refresh makes it
    /// unnecessary or one is already in flight, in which case this caller
    /// waits (bounded at 12s) instead of duplicating the call.
    pub async fn maybe_refresh_once<F, Fut>(&self, ticker: &str, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let key = ticker.to_uppercase();
        let now = Instant::now();

        let wait_on = {
            let mut map = self.state.lock().await;
            let entry = map.entry(key.clone()).or_default();

            if let Some(last_ok) = entry.last_ok_at {
                if now.duration_since(last_ok) < self.min_interval {
                    return RefreshOutcome::SkippedFresh;
                }
            }
            if let Some(last_fail) = entry.last_fail_at {
                if now.duration_since(last_fail) < self.fail_backoff {
                    return RefreshOutcome::SkippedBackoff;
                }
            }

            if let Some(notify) = &entry.inflight {
                Some(notify.clone())
            } else {
                entry.inflight = Some(Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = wait_on {
            let _ = tokio::time::timeout(FOLLOWER_WAIT, notify.notified()).await;
            return RefreshOutcome::WaitedForLeader;
        }

        let ok = refresh().await;

        let notify = {
            let mut map = self.state.lock().await;
            let entry = map.entry(key).or_default();
            if ok {
                entry.last_ok_at = Some(Instant::now());
            } else {
                entry.last_fail_at = Some(Instant::now());
            }
            entry.inflight.take()
        };
        if let Some(notify) = notify {
            notify.notify_waiters();
        }

        RefreshOutcome::Refreshed { ok }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_call_within_interval_is_skipped() {
        let gate = RefreshGate::new(Duration::from_secs(600), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let first = gate.maybe_refresh_once("aapl", || async move {
            c.fetch_add(1, Ordering::SeqCst);
            true
        }).await;
        assert_eq!(first, RefreshOutcome::Refreshed { ok: true });

        let c = calls.clone();
        let second = gate.maybe_refresh_once("AAPL", || async move {
            c.fetch_add(1, Ordering::SeqCst);
            true
        }).await;
        assert_eq!(second, RefreshOutcome::SkippedFresh);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_backs_off() {
        let gate = RefreshGate::new(Duration::from_secs(600), Duration::from_secs(60));
        let first = gate.maybe_refresh_once("tsla", || async { false }).await;
        assert_eq!(first, RefreshOutcome::Refreshed { ok: false });

        let second = gate.maybe_refresh_once("tsla", || async { true }).await;
        assert_eq!(second, RefreshOutcome::SkippedBackoff);
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce_to_one_refresh() {
        let gate = Arc::new(RefreshGate::new(Duration::from_secs(600), Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                gate.maybe_refresh_once("nvda", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    true
                }).await
            }));
        }
        let mut refreshed = 0;
        let mut waited = 0;
        for h in handles {
            match h.await.unwrap() {
                RefreshOutcome::Refreshed { .. } => refreshed += 1,
                RefreshOutcome::WaitedForLeader => waited += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(refreshed, 1);
        assert_eq!(waited, 7);
    }
}
