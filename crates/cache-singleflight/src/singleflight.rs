//! The layered L1 (in-process) + L2 (persisted) cache with per-key
//! singleflight coalescing (§4.2).
//!
//! Grounded on `financial_engine/main.py`'s `_FINANCIAL_L1_CACHE` /
//! `_FINANCIAL_INFLIGHT` pair, re-architected per §9 as an explicit,
//! dependency-injected service instead of module globals: every instance
//! owns its own L1 table and inflight table, so tests get fresh state for
//! free.
//!
//! The inflight marker is released on every exit path — success, a typed
//! failure, or an early return — via [`InflightGuard`]'s `Drop` impl, per
//! §9's "scoped cleanup" note.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use context_core::{EngineError, EngineResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::layer::{CacheLayer, CachedValue};

const FOLLOWER_WAIT: Duration = Duration::from_secs(12);

struct L1Entry<T> {
    value: T,
    expires_at: Instant,
    generation: u64,
    stale: bool,
    stale_reason: Option<String>,
}

/// Releases the inflight marker for `key` on drop, whichever way the
/// leader's turn ends.
struct InflightGuard<'a, T> {
    table: &'a DashMap<String, Arc<Notify>>,
    key: String,
    _t: std::marker::PhantomData<T>,
}

impl<'a, T> Drop for InflightGuard<'a, T> {
    fn drop(&mut self) {
        if let Some((_, notify)) = self.table.remove(&self.key) {
            notify.notify_waiters();
        }
    }
}

pub struct SingleflightCache<T: Clone + Send + Sync + 'static> {
    l1: DashMap<String, L1Entry<T>>,
    inflight: DashMap<String, Arc<Notify>>,
    hit_ttl: Duration,
    miss_ttl: Duration,
    generation: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> SingleflightCache<T> {
    pub fn new(hit_ttl: Duration, miss_ttl: Duration) -> Self {
        Self { l1: DashMap::new(), inflight: DashMap::new(), hit_ttl, miss_ttl, generation: AtomicU64::new(0) }
    }

    /// `FINANCIAL_L1_HIT_TTL_SECONDS` / `FINANCIAL_L1_MISS_TTL_SECONDS` defaults (§6).
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(600), Duration::from_secs(120))
    }

    fn peek(&self, key: &str) -> Option<CachedValue<T>> {
        let entry = self.l1.get(key)?;
        if Instant::now() >= entry.expires_at {
            return None;
        }
        Some(CachedValue {
            value: entry.value.clone(),
            layer: CacheLayer::L1,
            stale: entry.stale,
            stale_reason: entry.stale_reason.clone(),
            generation: entry.generation,
        })
    }

    fn store(&self, key: &str, value: T, stale: bool, stale_reason: Option<String>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ttl = if stale { self.miss_ttl } else { self.hit_ttl };
        self.l1.insert(
            key.to_string(),
            L1Entry { value, expires_at: Instant::now() + ttl, generation, stale, stale_reason },
        );
        generation
    }

    /// Resolves `key` against L1, falling through to a singleflight-guarded
    /// upstream refresh when `force_refresh` is set or no fresh L1 entry
    /// exists. `needs_refresh` encodes the caller's own refresh policy
    /// decision (e.g. [`crate::financial_policy::should_refresh_financials`])
    /// applied to whatever L2 already holds; when it says no refresh is
    /// due, the L2 value is adopted into L1 and served directly.
    pub async fn get_or_refresh<L2, L2Fut, P, F, Fut>(
        &self,
        key: &str,
        force_refresh: bool,
        load_l2: L2,
        policy: P,
        fetch: F,
    ) -> EngineResult<CachedValue<T>>
    where
        L2: Fn() -> L2Fut,
        L2Fut: Future<Output = EngineResult<Option<T>>>,
        P: Fn(Option<&T>) -> (bool, &'static str),
        F: Fn() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        if !force_refresh {
            if let Some(cached) = self.peek(key) {
                return Ok(cached);
            }
        }

        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(e) => {
                let notify = e.get().clone();
                drop(e);
                let _ = tokio::time::timeout(FOLLOWER_WAIT, notify.notified()).await;
                if let Some(cached) = self.peek(key) {
                    let layer = if cached.stale { CacheLayer::L2AfterWait } else { CacheLayer::L1AfterWait };
                    return Ok(CachedValue { layer, ..cached });
                }
                Err(EngineError::TransientUpstream(format!("{key}: leader refresh did not complete in time")))
            }
            Entry::Vacant(e) => {
                let notify = Arc::new(Notify::new());
                e.insert(notify);
                let _guard = InflightGuard::<T> { table: &self.inflight, key: key.to_string(), _t: std::marker::PhantomData };

                let l2_value = load_l2().await?;
                let (should_refresh, reason) = policy(l2_value.as_ref());

                if !should_refresh {
                    if let Some(value) = l2_value {
                        let generation = self.store(key, value.clone(), false, None);
                        return Ok(CachedValue { value, layer: CacheLayer::L2, stale: false, stale_reason: None, generation });
                    }
                    return Err(EngineError::Config(format!("{key}: policy declined refresh with no L2 value ({reason})")));
                }

                match fetch().await {
                    Ok(value) => {
                        let generation = self.store(key, value.clone(), false, None);
                        Ok(CachedValue { value, layer: CacheLayer::Upstream, stale: false, stale_reason: None, generation })
                    }
                    Err(err) if err.is_transient() => {
                        if let Some(value) = l2_value {
                            let stale_reason = format!("refresh_failed_serving_stale: {err}");
                            let generation = self.store(key, value.clone(), true, Some(stale_reason.clone()));
                            Ok(CachedValue { value, layer: CacheLayer::L2, stale: true, stale_reason: Some(stale_reason), generation })
                        } else {
                            Err(err)
                        }
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn cold_start_leader_fetches_followers_wait() {
        let cache = Arc::new(SingleflightCache::<i32>::with_defaults());
        let upstream_calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            let upstream_calls = upstream_calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(
                        "AAPL",
                        false,
                        || async { Ok(None) },
                        |_| (true, "cold_start"),
                        || {
                            let upstream_calls = upstream_calls.clone();
                            async move {
                                upstream_calls.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(10)).await;
                                Ok(42)
                            }
                        },
                    )
                    .await
            }));
        }

        let mut generations = Vec::new();
        let mut layers = Vec::new();
        for h in handles {
            let cached = h.await.unwrap().unwrap();
            assert_eq!(cached.value, 42);
            generations.push(cached.generation);
            layers.push(cached.layer);
        }

        assert_eq!(upstream_calls.load(Ordering::SeqCst), 1, "exactly one upstream call under a burst");
        assert!(generations.iter().all(|g| *g == generations[0]), "every caller observes one generation");
        assert!(layers.iter().any(|l| matches!(l, CacheLayer::Upstream)));
        assert!(layers.iter().any(|l| matches!(l, CacheLayer::L1AfterWait)));
    }

    #[tokio::test]
    async fn l2_serves_without_refresh_when_policy_says_no() {
        let cache = SingleflightCache::<i32>::with_defaults();
        let cached = cache
            .get_or_refresh(
                "MSFT",
                false,
                || async { Ok(Some(7)) },
                |_| (false, "before_earnings_day"),
                || async { panic!("must not fetch upstream") },
            )
            .await
            .unwrap();
        assert_eq!(cached.value, 7);
        assert_eq!(cached.layer, CacheLayer::L2);
        assert!(!cached.stale);
    }

    #[tokio::test]
    async fn transient_failure_falls_back_to_stale_l2() {
        let cache = SingleflightCache::<i32>::with_defaults();
        let cached = cache
            .get_or_refresh(
                "NVDA",
                false,
                || async { Ok(Some(99)) },
                |_| (true, "earnings_day_passed"),
                || async { Err(EngineError::TransientUpstream("network blip".to_string())) },
            )
            .await
            .unwrap();
        assert_eq!(cached.value, 99);
        assert!(cached.stale);
        assert!(cached.stale_reason.is_some());
    }

    #[tokio::test]
    async fn l1_hit_skips_l2_and_upstream_entirely() {
        let cache = SingleflightCache::<i32>::with_defaults();
        cache
            .get_or_refresh("TSLA", false, || async { Ok(Some(1)) }, |_| (true, "cold_start"), || async { Ok(1) })
            .await
            .unwrap();

        let cached = cache
            .get_or_refresh(
                "TSLA",
                false,
                || async { panic!("must not touch L2 on L1 hit") },
                |_| (true, "cold_start"),
                || async { panic!("must not touch upstream on L1 hit") },
            )
            .await
            .unwrap();
        assert_eq!(cached.value, 1);
        assert_eq!(cached.layer, CacheLayer::L1);
    }
}
