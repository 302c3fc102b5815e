//! AI-context generation (§4.7): two independent text-artifact steps over
//! an entity's articles for one day, plus the persisted path convention and
//! the daily-index "only the highest step wins" rule.

pub mod highlight;
pub mod step1;
pub mod step2;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use context_core::{
    append_daily_index, AiContextStep, Article, DailyIndexEntry, DailyIndexKind, EngineError, EngineResult, Storage,
};

/// Renders `now_utc` in the configured local timezone for the document
/// header's "Generated at (Local {timezone_label})" line. Callers pass the
/// result as `run_pipeline`'s `generated_at_local`; this crate only owns
/// the conversion, not the per-call timezone choice.
pub fn local_timestamp(now_utc: DateTime<Utc>, timezone_label: &str) -> EngineResult<String> {
    let tz: chrono_tz::Tz = timezone_label
        .parse()
        .map_err(|_| EngineError::config(format!("unknown timezone label: {timezone_label}")))?;
    Ok(now_utc.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string())
}

/// `ai_context/{ENTITY}/{YYYY-MM-DD}__step{N}_{timestamp}_UTC.txt`
pub fn context_path(entity_label: &str, date: &str, step: AiContextStep, now_utc: DateTime<Utc>) -> String {
    format!(
        "ai_context/{entity}/{date}__step{n}_{ts}_UTC.txt",
        entity = entity_label,
        n = step as u8,
        ts = now_utc.format("%Y%m%d%H%M%S")
    )
}

/// Only the highest-numbered step a caller emits updates the daily index
/// (§4.7); lower steps are written but left out of it.
pub fn highest_step(steps: &[AiContextStep]) -> Option<AiContextStep> {
    steps.iter().copied().max_by_key(|s| *s as u8)
}

/// One step's generated text, keyed by step number.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub step: AiContextStep,
    pub content: String,
}

/// Runs every requested step (both, by default) over the same article set.
/// Each step applies its own filtering/sorting independently; there is no
/// shared intermediate state between them.
#[allow(clippy::too_many_arguments)]
pub fn run_pipeline(
    articles: &[Article],
    entity_label: &str,
    date: &str,
    steps_to_output: Option<&[AiContextStep]>,
    max_articles_for_context: Option<usize>,
    generated_at_local: &str,
    timezone_label: &str,
    highlight_keywords: &[String],
) -> Vec<StepOutput> {
    let steps: Vec<AiContextStep> = match steps_to_output {
        Some(s) if !s.is_empty() => s.to_vec(),
        _ => vec![AiContextStep::Raw, AiContextStep::Summarized],
    };

    let mut outputs = Vec::with_capacity(steps.len());
    for step in steps {
        let content = match step {
            AiContextStep::Raw => {
                step1::build(articles, entity_label, date, generated_at_local, timezone_label, max_articles_for_context)
            }
            AiContextStep::Summarized => step2::build(
                articles,
                entity_label,
                date,
                generated_at_local,
                timezone_label,
                max_articles_for_context,
                highlight_keywords,
            ),
        };
        outputs.push(StepOutput { step, content });
    }
    outputs
}

/// Runs every output step's content through a single write-and-index pass:
/// persists each at its [`context_path`], then appends only the
/// highest-numbered step (§4.7) to the `ai_context` daily index. Shared by
/// [`persist_pipeline`] and [`build_ai_context`] so the write/index logic
/// exists in exactly one place.
async fn write_steps(
    storage: &dyn Storage,
    outputs: &[StepOutput],
    entity_label: &str,
    date: &str,
    now_utc: DateTime<Utc>,
) -> EngineResult<Vec<(AiContextStep, String)>> {
    let steps: Vec<AiContextStep> = outputs.iter().map(|o| o.step).collect();
    let winner = highest_step(&steps);

    let mut written = Vec::with_capacity(outputs.len());
    let mut winner_path = None;
    for output in outputs {
        let path = context_path(entity_label, date, output.step, now_utc);
        storage.put(&path, output.content.clone().into_bytes(), "text/plain", None).await?;
        if Some(output.step) == winner {
            winner_path = Some(path.clone());
        }
        written.push((output.step, path));
    }

    if let Some(path) = winner_path {
        append_daily_index(
            storage,
            DailyIndexKind::AiContext,
            date,
            DailyIndexEntry { ticker: entity_label.to_string(), path, timestamp: now_utc, metadata: None },
        )
        .await?;
    }

    Ok(written)
}

/// Runs [`run_pipeline`] and persists every emitted [`StepOutput`] at its
/// [`context_path`], then appends only the highest-numbered step (§4.7) to
/// the `ai_context` daily index. Returns the written paths, in step order.
#[allow(clippy::too_many_arguments)]
pub async fn persist_pipeline(
    storage: &dyn Storage,
    articles: &[Article],
    entity_label: &str,
    date: &str,
    steps_to_output: Option<&[AiContextStep]>,
    max_articles_for_context: Option<usize>,
    generated_at_local: &str,
    timezone_label: &str,
    highlight_keywords: &[String],
    now_utc: DateTime<Utc>,
) -> EngineResult<Vec<String>> {
    let outputs = run_pipeline(
        articles,
        entity_label,
        date,
        steps_to_output,
        max_articles_for_context,
        generated_at_local,
        timezone_label,
        highlight_keywords,
    );
    let written = write_steps(storage, &outputs, entity_label, date, now_utc).await?;
    Ok(written.into_iter().map(|(_, path)| path).collect())
}

/// `build_ai_context(entity_key, date?, steps?) → {saved_steps: {step →
/// path}, final_path}` (§6): the named external operation over the same
/// pipeline [`persist_pipeline`] drives, shaped to the spec's literal
/// return contract for callers that need the per-step path map rather than
/// a flat list.
#[derive(Debug, Clone)]
pub struct BuiltAiContext {
    pub saved_steps: HashMap<AiContextStep, String>,
    pub final_path: String,
}

#[allow(clippy::too_many_arguments)]
pub async fn build_ai_context(
    storage: &dyn Storage,
    articles: &[Article],
    entity_label: &str,
    date: &str,
    steps_to_output: Option<&[AiContextStep]>,
    max_articles_for_context: Option<usize>,
    generated_at_local: &str,
    timezone_label: &str,
    highlight_keywords: &[String],
    now_utc: DateTime<Utc>,
) -> EngineResult<BuiltAiContext> {
    let outputs = run_pipeline(
        articles,
        entity_label,
        date,
        steps_to_output,
        max_articles_for_context,
        generated_at_local,
        timezone_label,
        highlight_keywords,
    );
    let steps: Vec<AiContextStep> = outputs.iter().map(|o| o.step).collect();
    let winner = highest_step(&steps).ok_or_else(|| EngineError::config("no steps requested"))?;

    let written = write_steps(storage, &outputs, entity_label, date, now_utc).await?;
    let final_path = written
        .iter()
        .find(|(step, _)| *step == winner)
        .map(|(_, path)| path.clone())
        .ok_or_else(|| EngineError::consistency("winning step produced no path"))?;
    let saved_steps = written.into_iter().collect();

    Ok(BuiltAiContext { saved_steps, final_path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_timestamp_converts_out_of_utc() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let rendered = local_timestamp(now, "America/New_York").unwrap();
        assert!(rendered.starts_with("2026-07-28 08:00:00"));
    }

    #[test]
    fn local_timestamp_rejects_unknown_label() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        assert!(local_timestamp(now, "Not/A_Zone").is_err());
    }

    #[test]
    fn highest_step_picks_summarized_over_raw() {
        assert_eq!(highest_step(&[AiContextStep::Raw, AiContextStep::Summarized]), Some(AiContextStep::Summarized));
        assert_eq!(highest_step(&[AiContextStep::Raw]), Some(AiContextStep::Raw));
        assert_eq!(highest_step(&[]), None);
    }

    #[test]
    fn context_path_has_expected_shape() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let path = context_path("AAPL", "2026-07-28", AiContextStep::Summarized, now);
        assert_eq!(path, "ai_context/AAPL/2026-07-28__step2_20260728120000_UTC.txt");
    }

    #[test]
    fn run_pipeline_defaults_to_both_steps() {
        let outputs = run_pipeline(&[], "AAPL", "2026-07-28", None, None, "now", "UTC", &[]);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].step, AiContextStep::Raw);
        assert_eq!(outputs[1].step, AiContextStep::Summarized);
    }

    #[test]
    fn run_pipeline_runs_only_requested_step() {
        let outputs = run_pipeline(&[], "AAPL", "2026-07-28", Some(&[AiContextStep::Summarized]), None, "now", "UTC", &[]);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].step, AiContextStep::Summarized);
    }

    use async_trait::async_trait;
    use context_core::BlobMeta;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MemStorage(Mutex<HashMap<String, Vec<u8>>>);

    impl MemStorage {
        fn empty() -> Self {
            Self(Mutex::new(HashMap::new()))
        }
    }

    #[async_trait]
    impl Storage for MemStorage {
        async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str, _cache_control: Option<&str>) -> EngineResult<()> {
            self.0.lock().await.insert(path.to_string(), bytes);
            Ok(())
        }
        async fn put_if_absent(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> EngineResult<bool> {
            if self.0.lock().await.contains_key(path) {
                return Ok(false);
            }
            self.put(path, bytes, content_type, None).await?;
            Ok(true)
        }
        async fn get(&self, path: &str) -> EngineResult<Option<Vec<u8>>> {
            Ok(self.0.lock().await.get(path).cloned())
        }
        async fn list(&self, _prefix: &str) -> EngineResult<Vec<BlobMeta>> {
            Ok(vec![])
        }
        async fn age(&self, _path: &str, _now: DateTime<Utc>) -> EngineResult<Option<chrono::Duration>> {
            Ok(None)
        }
    }

    /// §8 scenario 6: AAPL@10:00, MSFT@10:05, then AAPL@11:00 at a
    /// different path — three final entries, sorted descending. The
    /// AAPL@10:00 entry survives because it shares no `(ticker, path)` pair
    /// with the 11:00 one; same-path reappends are covered separately in
    /// `context-core::daily_index`.
    #[tokio::test]
    async fn daily_index_keeps_distinct_paths_sorted_descending() {
        let storage = MemStorage::empty();
        let aapl_10 = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let msft_10_05 = Utc.with_ymd_and_hms(2026, 7, 28, 10, 5, 0).unwrap();
        let aapl_11 = Utc.with_ymd_and_hms(2026, 7, 28, 11, 0, 0).unwrap();

        persist_pipeline(&storage, &[], "AAPL", "2026-07-28", Some(&[AiContextStep::Raw]), None, "now", "UTC", &[], aapl_10)
            .await
            .unwrap();
        persist_pipeline(&storage, &[], "MSFT", "2026-07-28", Some(&[AiContextStep::Raw]), None, "now", "UTC", &[], msft_10_05)
            .await
            .unwrap();
        persist_pipeline(
            &storage,
            &[],
            "AAPL",
            "2026-07-28",
            Some(&[AiContextStep::Summarized]),
            None,
            "now",
            "UTC",
            &[],
            aapl_11,
        )
        .await
        .unwrap();

        let entries = context_core::list_daily_index(&storage, DailyIndexKind::AiContext, "2026-07-28").await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].ticker, "AAPL");
        assert_eq!(entries[0].timestamp, aapl_11);
    }

    #[tokio::test]
    async fn persist_pipeline_only_indexes_the_highest_step() {
        let storage = MemStorage::empty();
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let paths = persist_pipeline(&storage, &[], "AAPL", "2026-07-28", None, None, "now", "UTC", &[], now).await.unwrap();
        assert_eq!(paths.len(), 2);

        let entries = context_core::list_daily_index(&storage, DailyIndexKind::AiContext, "2026-07-28").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, context_path("AAPL", "2026-07-28", AiContextStep::Summarized, now));
    }

    #[tokio::test]
    async fn build_ai_context_reports_both_saved_steps_and_the_final_path() {
        let storage = MemStorage::empty();
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let result = build_ai_context(&storage, &[], "AAPL", "2026-07-28", None, None, "now", "UTC", &[], now).await.unwrap();

        assert_eq!(result.saved_steps.len(), 2);
        let summarized_path = context_path("AAPL", "2026-07-28", AiContextStep::Summarized, now);
        assert_eq!(result.final_path, summarized_path);
        assert_eq!(result.saved_steps[&AiContextStep::Summarized], summarized_path);
        assert_eq!(result.saved_steps[&AiContextStep::Raw], context_path("AAPL", "2026-07-28", AiContextStep::Raw, now));
    }

    #[tokio::test]
    async fn build_ai_context_honors_a_single_requested_step() {
        let storage = MemStorage::empty();
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let result = build_ai_context(
            &storage,
            &[],
            "AAPL",
            "2026-07-28",
            Some(&[AiContextStep::Raw]),
            None,
            "now",
            "UTC",
            &[],
            now,
        )
        .await
        .unwrap();

        assert_eq!(result.saved_steps.len(), 1);
        assert_eq!(result.final_path, context_path("AAPL", "2026-07-28", AiContextStep::Raw, now));
    }
}
