//! The generic JSON-backed registry (§4.10): normalize on refresh, resolve
//! by key or any of its aliases, later registration wins on alias
//! collision.

use std::collections::HashMap;

use context_core::EntityConfig;
use serde_json::Value;

use crate::normalize::{bool_field, ensure_list, normalize_key, normalize_keywords, str_field, u32_field, usize_field};

const DEFAULT_MAX_ARTICLES: usize = 20;
const DEFAULT_MAX_AGE_HOURS: u32 = 48;

#[derive(Debug, Default)]
pub struct ConfigRegistry {
    default_group: String,
    configs: HashMap<String, EntityConfig>,
    alias_index: HashMap<String, String>,
}

impl ConfigRegistry {
    pub fn new(default_group: impl Into<String>) -> Self {
        Self { default_group: default_group.into(), configs: HashMap::new(), alias_index: HashMap::new() }
    }

    /// Loads from `local` then overlays `remote` (remote wins key
    /// collisions), normalizes every entry, and rebuilds the alias index
    /// from scratch. `local`/`remote` are each `{raw_key: config_object}`
    /// maps; non-object entries are skipped with a warning.
    pub fn refresh(&mut self, local: Option<&Value>, remote: Option<&Value>) {
        let mut merged: HashMap<String, Value> = HashMap::new();
        if let Some(Value::Object(map)) = local {
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }
        if let Some(Value::Object(map)) = remote {
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }

        // Sorted rather than JSON source order, for a deterministic (if not
        // insertion-order) registration sequence on alias-collision ties.
        let mut raw_keys: Vec<&String> = merged.keys().collect();
        raw_keys.sort();

        let mut configs = HashMap::new();
        for raw_key in raw_keys {
            let raw_config = &merged[raw_key];
            match normalize_entry(raw_key, raw_config, &self.default_group) {
                Some(config) => {
                    configs.insert(config.key.clone(), config);
                }
                None => tracing::warn!("config for key '{raw_key}' is not an object, skipping"),
            }
        }

        let mut alias_index = HashMap::new();
        for (key_norm, config) in &configs {
            for alias in &config.aliases {
                alias_index.insert(alias.clone(), key_norm.clone());
            }
        }

        tracing::info!("loaded {} configs", configs.len());
        self.configs = configs;
        self.alias_index = alias_index;
    }

    pub fn get(&self, key: &str) -> Option<&EntityConfig> {
        if key.is_empty() {
            return None;
        }
        let key_norm = normalize_key(key);

        if let Some(direct) = self.configs.get(&key_norm) {
            return Some(direct);
        }
        if let Some(canonical) = self.alias_index.get(&key_norm) {
            return self.configs.get(canonical);
        }
        if let Some(tail) = key_norm.rsplit('/').next().filter(|_| key_norm.contains('/')) {
            if let Some(canonical) = self.alias_index.get(tail) {
                return self.configs.get(canonical);
            }
        }
        if let Some(tail) = key_norm.rsplit('.').next().filter(|_| key_norm.contains('.')) {
            if let Some(canonical) = self.alias_index.get(tail) {
                return self.configs.get(canonical);
            }
        }
        None
    }

    pub fn all_configs(&self) -> &HashMap<String, EntityConfig> {
        &self.configs
    }
}

fn normalize_entry(raw_key: &str, raw: &Value, default_group: &str) -> Option<EntityConfig> {
    if !raw.is_object() {
        return None;
    }

    let key_norm = normalize_key(raw_key);
    let identifier = str_field(raw, "topic_identifier")
        .or_else(|| str_field(raw, "person_identifier"))
        .unwrap_or(&key_norm)
        .to_string();

    let storage_path = str_field(raw, "topic_storage_path")
        .or_else(|| str_field(raw, "person_storage_path"))
        .unwrap_or(&identifier)
        .replace('.', "/");

    let rss_sources = {
        let mut sources = ensure_list(raw.get("rss_sources"));
        if sources.is_empty() {
            sources = ensure_list(raw.get("feed_urls"));
        }
        sources
    };

    let group = str_field(raw, "topic_group")
        .map(str::to_string)
        .unwrap_or_else(|| match storage_path.split_once('/') {
            Some((head, _)) => head.to_string(),
            None => default_group.to_string(),
        });

    let aliases = build_aliases(&key_norm, &identifier, &storage_path);

    Some(EntityConfig {
        key: key_norm,
        identifier,
        storage_path,
        group,
        rss_sources,
        required_keywords: normalize_keywords(raw.get("required_keywords")),
        excluded_keywords: normalize_keywords(raw.get("excluded_keywords")),
        source_allowlist: ensure_list(raw.get("source_allowlist")),
        source_blocklist: ensure_list(raw.get("source_blocklist")),
        highlight_keywords: normalize_keywords(raw.get("highlight_keywords")),
        min_content_length: usize_field(raw, "min_content_length", 0),
        min_summary_length: usize_field(raw, "min_summary_length", 0),
        require_full_text: bool_field(raw, "require_full_text", false),
        enforce_content_filters: bool_field(raw, "enforce_content_filters", false),
        max_articles: usize_field(raw, "max_articles", DEFAULT_MAX_ARTICLES),
        max_age_hours: u32_field(raw, "max_age_hours", DEFAULT_MAX_AGE_HOURS),
        aliases,
    })
}

fn build_aliases(key_norm: &str, identifier: &str, storage_path: &str) -> Vec<String> {
    let mut aliases = std::collections::BTreeSet::new();
    aliases.insert(key_norm.to_string());

    let identifier_norm = normalize_key(identifier);
    aliases.insert(identifier_norm.clone());
    aliases.insert(identifier_norm.replace('.', "/"));

    let storage_norm = normalize_key(storage_path);
    aliases.insert(storage_norm.clone());
    if let Some((_, tail)) = storage_norm.rsplit_once('/') {
        aliases.insert(tail.to_string());
    }

    aliases.into_iter().collect()
}
