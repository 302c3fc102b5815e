//! Field-level normalization rules shared by every entry the registry loads
//! (§4.10).

use serde_json::Value;

/// Lowercase, trimmed, with backslashes unified to forward slashes.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace('\\', "/")
}

pub fn str_field<'a>(raw: &'a Value, field: &str) -> Option<&'a str> {
    raw.get(field).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

pub fn bool_field(raw: &Value, field: &str, default: bool) -> bool {
    raw.get(field).and_then(Value::as_bool).unwrap_or(default)
}

pub fn usize_field(raw: &Value, field: &str, default: usize) -> usize {
    raw.get(field).and_then(Value::as_u64).map(|v| v as usize).unwrap_or(default)
}

pub fn u32_field(raw: &Value, field: &str, default: u32) -> u32 {
    raw.get(field).and_then(Value::as_u64).map(|v| v as u32).unwrap_or(default)
}

/// Accepts either a comma-separated string or a JSON array of strings;
/// drops empties, does not change case.
pub fn ensure_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s.split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Same as `ensure_list` but additionally lower-cases every entry, used for
/// keyword fields that are matched case-insensitively.
pub fn normalize_keywords(value: Option<&Value>) -> Vec<String> {
    ensure_list(value).into_iter().map(|s| s.to_lowercase()).collect()
}
