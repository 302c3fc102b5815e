//! Dedupe and URL hashing (§4.6 steps 4 and 8).

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// `sha256("{slug(title)}|{slug(source)}|{YYYY-MM-DD HH:MM}")`, full 64 hex.
pub fn dedupe_hash(title: &str, source: &str, published: DateTime<Utc>) -> String {
    let key = format!(
        "{}|{}|{}",
        slug::slugify(title),
        slug::slugify(source),
        published.format("%Y-%m-%d %H:%M")
    );
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// `sha256(canonical_url)`, first 16 hex chars — used in the persisted
/// filename, not for dedupe.
pub fn url_hash(canonical_url: &str) -> String {
    let digest = hex::encode(Sha256::digest(canonical_url.as_bytes()));
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dedupe_hash_is_64_hex_chars() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 28, 9, 31, 0).unwrap();
        let h = dedupe_hash("Fed Holds Rates", "Reuters", ts);
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn dedupe_hash_ignores_seconds() {
        let a = Utc.with_ymd_and_hms(2026, 7, 28, 9, 31, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 7, 28, 9, 31, 59).unwrap();
        assert_eq!(dedupe_hash("t", "s", a), dedupe_hash("t", "s", b));
    }

    #[test]
    fn dedupe_hash_is_case_insensitive_via_slug() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 28, 9, 31, 0).unwrap();
        assert_eq!(dedupe_hash("Fed Holds", "Reuters", ts), dedupe_hash("fed holds", "reuters", ts));
    }

    #[test]
    fn url_hash_is_16_hex_chars() {
        let h = url_hash("https://example.com/a");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
