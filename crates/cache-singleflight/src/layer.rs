use serde::{Deserialize, Serialize};

/// Where a cached value was served from, reported back to callers for
/// observability (§8 scenario 3: "99 callers return `cacheLayer` ∈
/// {l1-after-wait, l2-after-wait}, one returns `cacheLayer = upstream`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheLayer {
    #[serde(rename = "upstream")]
    Upstream,
    #[serde(rename = "l1")]
    L1,
    #[serde(rename = "l2")]
    L2,
    #[serde(rename = "l1-after-wait")]
    L1AfterWait,
    #[serde(rename = "l2-after-wait")]
    L2AfterWait,
    #[serde(rename = "gcs-cache")]
    GcsCache,
}

impl CacheLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L1AfterWait => "l1-after-wait",
            Self::L2AfterWait => "l2-after-wait",
            Self::GcsCache => "gcs-cache",
        }
    }
}

/// A cached value plus the provenance a caller needs to report staleness
/// transparently (never silent, per §7).
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    pub value: T,
    pub layer: CacheLayer,
    pub stale: bool,
    pub stale_reason: Option<String>,
    /// Monotonically increasing per successful refresh; used by tests to
    /// assert all callers in a singleflight burst observed one generation.
    pub generation: u64,
}
