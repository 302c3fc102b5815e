use thiserror::Error;

/// The error taxonomy shared by every engine in the pipeline.
///
/// Each variant maps to one policy in the error handling design: transient
/// upstream failures are retried at the cache boundary and may fall back to
/// stale data, permanent ones are recorded and skipped, config/input errors
/// fail fast before any I/O, storage errors always surface, partial-engine
/// failures are recorded per item, and consistency failures are programmer
/// errors that must never produce an artifact.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    #[error("permanent upstream failure: {0}")]
    PermanentUpstream(String),

    #[error("config or input error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("partial engine failure: {0}")]
    PartialFailure(String),

    #[error("consistency violation: {0}")]
    Consistency(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Transient failures are the only kind the cache layer is allowed to
    /// convert into a stale-serving fallback.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientUpstream(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// The outcome of a cache-guarded read: a fresh value, a stale value served
/// because the leader's refresh failed or was skipped, or no value at all.
///
/// This is the typed replacement for exception-based control flow around
/// transient upstream errors (§9): only the cache boundary may turn an
/// `Unavailable` leader outcome into a flagged `Stale` result by consulting
/// L2; nothing downstream of the cache sees a raw transient error silently
/// swallowed.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome<T> {
    /// Served fresh, either straight from cache or after a successful refresh.
    Fresh(T),
    /// Served from a previous generation because the refresh attempt failed.
    Stale { value: T, reason: String },
    /// No cached value exists and the refresh attempt failed.
    Unavailable(EngineError),
}

impl<T> CacheOutcome<T> {
    pub fn into_result(self) -> EngineResult<T> {
        match self {
            Self::Fresh(v) => Ok(v),
            Self::Stale { value, .. } => Ok(value),
            Self::Unavailable(e) => Err(e),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}
