//! Per-day index read-modify-write (§4.7, §4.8, §6 `list_daily_index`).
//! Both the AI-context pipeline and the trading/analysis path share this:
//! load whatever is persisted, append under the `(ticker, path)` set-union
//! rule, and write the whole index back. Concurrent writers converge
//! because `DailyIndex::append` is a pure set-union plus a deterministic
//! sort, not an in-place mutation that depends on write order.

use crate::error::{EngineError, EngineResult};
use crate::traits::Storage;
use crate::types::{DailyIndex, DailyIndexEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyIndexKind {
    AiContext,
    Analysis,
}

impl DailyIndexKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::AiContext => "ai_context",
            Self::Analysis => "analysis",
        }
    }
}

pub fn daily_index_path(kind: DailyIndexKind, date: &str) -> String {
    format!("{}/daily_index/{date}.json", kind.prefix())
}

pub async fn load_daily_index(storage: &dyn Storage, kind: DailyIndexKind, date: &str) -> EngineResult<DailyIndex> {
    match storage.get(&daily_index_path(kind, date)).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::consistency(format!("malformed daily index at {date}: {e}"))),
        None => Ok(DailyIndex::default()),
    }
}

async fn save_daily_index(storage: &dyn Storage, kind: DailyIndexKind, date: &str, index: &DailyIndex) -> EngineResult<()> {
    let bytes = serde_json::to_vec_pretty(index)
        .map_err(|e| EngineError::consistency(format!("serializing daily index for {date}: {e}")))?;
    storage.put(&daily_index_path(kind, date), bytes, "application/json", None).await
}

/// Appends `entry` to the index for `(kind, date)`, read-modify-write, and
/// returns the index as it now stands.
pub async fn append_daily_index(
    storage: &dyn Storage,
    kind: DailyIndexKind,
    date: &str,
    entry: DailyIndexEntry,
) -> EngineResult<DailyIndex> {
    let mut index = load_daily_index(storage, kind, date).await?;
    index.append(entry);
    save_daily_index(storage, kind, date, &index).await?;
    Ok(index)
}

/// `list_daily_index(kind, date) → [...]` (§6): reads the persisted index
/// back without mutating it.
pub async fn list_daily_index(storage: &dyn Storage, kind: DailyIndexKind, date: &str) -> EngineResult<Vec<DailyIndexEntry>> {
    Ok(load_daily_index(storage, kind, date).await?.entries)
}
