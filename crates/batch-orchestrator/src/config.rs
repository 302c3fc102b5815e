//! Loads the five JSON configs the nightly run is driven by: equity
//! universe, card types, LLM backend/model selection, global engine
//! control, and additional targets (topics, persons, per-equity overrides).

use std::collections::HashMap;

use context_core::{EngineError, EngineResult, Storage};
use serde::Deserialize;

use crate::targets::{AdditionalTarget, EngineFlags, TargetType};

#[derive(Debug, Clone, Deserialize)]
pub struct CardTask {
    pub backend: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub default: CardTask,
    #[serde(default)]
    pub tasks: HashMap<String, CardTask>,
}

impl LlmConfig {
    /// Task-specific backend/model wins over the default (§4.8).
    pub fn resolve(&self, card_type: &str) -> CardTask {
        self.tasks.get(card_type).cloned().unwrap_or_else(|| self.default.clone())
    }
}

/// Paths the five config blobs live at, relative to whatever [`Storage`]
/// backend is configured (GCS bucket or local root).
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub equity_universe: String,
    pub card_types: String,
    pub llm_config: String,
    pub engine_control: String,
    pub targets: String,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            equity_universe: "config/equity_universe.json".to_string(),
            card_types: "config/card_types.json".to_string(),
            llm_config: "config/llm_config.json".to_string(),
            engine_control: "config/engine_control.json".to_string(),
            targets: "config/targets.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawAdditionalTarget {
    id: String,
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(rename = "type", default)]
    type_field: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    target_id: Option<String>,
    #[serde(default)]
    topic_key: Option<String>,
    #[serde(default)]
    card_types: Vec<String>,
    #[serde(default)]
    run_overrides: HashMap<String, bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawTargetsFile {
    #[serde(default)]
    targets: Vec<RawAdditionalTarget>,
}

fn infer_target_type(category: Option<&str>, type_field: Option<&str>) -> TargetType {
    let label = type_field.or(category).unwrap_or("").to_lowercase();
    match label.as_str() {
        "celebrity" | "person" | "people" => TargetType::Person,
        "equity" | "ticker" => TargetType::Equity,
        _ => TargetType::Topic,
    }
}

/// The fully loaded, ready-to-run batch configuration.
pub struct BatchConfig {
    pub equity_universe: Vec<String>,
    pub equity_card_types: Vec<String>,
    pub llm_config: LlmConfig,
    pub engine_control: EngineFlags,
    pub additional_targets: Vec<AdditionalTarget>,
    pub equities_default_overrides: HashMap<String, bool>,
}

impl BatchConfig {
    pub async fn load(storage: &dyn Storage, paths: &ConfigPaths) -> EngineResult<Self> {
        let equity_universe: Vec<String> = load_json(storage, &paths.equity_universe).await?;
        let equity_card_types: Vec<String> = load_json(storage, &paths.card_types).await?;
        let llm_config: LlmConfig = load_json(storage, &paths.llm_config).await?;
        let engine_control: EngineFlags = load_json(storage, &paths.engine_control).await?;
        let raw_targets: RawTargetsFile = load_json(storage, &paths.targets).await?;

        let mut additional_targets = Vec::new();
        let mut equities_default_overrides = HashMap::new();

        for raw in raw_targets.targets {
            if raw.id == "equities_default" {
                equities_default_overrides = raw.run_overrides;
                continue;
            }
            let ticker = raw.ticker.unwrap_or_else(|| raw.id.clone());
            let target_type = infer_target_type(raw.category.as_deref(), raw.type_field.as_deref());
            additional_targets.push(AdditionalTarget {
                ticker,
                target_type,
                category: raw.category,
                date: raw.date,
                target_id: raw.target_id,
                topic_key: raw.topic_key,
                card_types: raw.card_types,
                run_overrides: raw.run_overrides,
                extra_params: Default::default(),
            });
        }

        Ok(Self { equity_universe, equity_card_types, llm_config, engine_control, additional_targets, equities_default_overrides })
    }
}

async fn load_json<T: for<'de> Deserialize<'de>>(storage: &dyn Storage, path: &str) -> EngineResult<T> {
    let bytes = storage
        .get(path)
        .await?
        .ok_or_else(|| EngineError::config(format!("missing required config blob: {path}")))?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::config(format!("malformed config at {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use context_core::BlobMeta;
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::Mutex;

    struct MemStorage(Mutex<StdHashMap<String, Vec<u8>>>);

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
        async fn age(&self, _path: &str, _now: chrono::DateTime<chrono::Utc>) -> EngineResult<Option<chrono::Duration>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn load_splits_equities_default_from_additional_targets() {
        let storage = MemStorage(Mutex::new(StdHashMap::new()));
        storage.put("config/equity_universe.json", br#"["AAPL"]"#.to_vec(), "application/json", None).await.unwrap();
        storage.put("config/card_types.json", br#"["summary"]"#.to_vec(), "application/json", None).await.unwrap();
        storage
            .put("config/llm_config.json", br#"{"default":{"backend":"vertex","model":"gemini"},"tasks":{}}"#.to_vec(), "application/json", None)
            .await
            .unwrap();
        storage
            .put("config/engine_control.json", br#"{"financials":true,"trading":true,"news":true}"#.to_vec(), "application/json", None)
            .await
            .unwrap();
        storage
            .put(
                "config/targets.json",
                br#"{"targets":[
                    {"id":"equities_default","run_overrides":{"news":false}},
                    {"id":"inflation","category":"macro","type":"topic","card_types":["summary"],"run_overrides":{"news":true}}
                ]}"#
                .to_vec(),
                "application/json",
                None,
            )
            .await
            .unwrap();

        let config = BatchConfig::load(&storage, &ConfigPaths::default()).await.unwrap();
        assert_eq!(config.equities_default_overrides.get("news"), Some(&false));
        assert_eq!(config.additional_targets.len(), 1);
        assert_eq!(config.additional_targets[0].target_type, TargetType::Topic);
    }

    #[tokio::test]
    async fn load_fails_fast_on_missing_blob() {
        let storage = MemStorage(Mutex::new(StdHashMap::new()));
        let err = BatchConfig::load(&storage, &ConfigPaths::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
