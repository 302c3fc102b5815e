//! URL canonicalization (§4.6 step 2): unwrap search-engine redirectors so
//! dedupe hashing and domain filters operate on the article's real home, not
//! the aggregator's redirect link.

use context_core::FeedEntry;
use url::Url;

/// Host prefix for the one well-known redirector this system has to unwrap:
/// Google News links like `news.google.com` and its per-country variants
/// (`news.google.co.uk`, `news.google.de`, ...).

/// `(raw_url, canonical_url)`. `raw_url` is the feed's link verbatim;
/// `canonical_url` is the best-effort unwrapped target.
pub fn canonicalize(entry: &FeedEntry) -> (String, String) {
    let raw_url = entry.link.trim().to_string();
    if raw_url.is_empty() {
        return (raw_url.clone(), raw_url);
    }

    let parsed = match Url::parse(&raw_url) {
        Ok(u) => u,
        Err(_) => return (raw_url.clone(), fix_scheme(&raw_url)),
    };

    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if !is_redirector(&host) {
        return (raw_url.clone(), fix_scheme(&raw_url));
    }

    if let Some(orig) = entry.origlink.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return (raw_url, fix_scheme(orig));
    }

    for key in ["url", "q", "u"] {
        if let Some(value) = parsed.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned()) {
            let candidate = value.trim();
            if !candidate.is_empty() {
                return (raw_url, fix_scheme(candidate));
            }
        }
    }

    let decoded_path = percent_encoding::percent_decode_str(parsed.path()).decode_utf8_lossy().to_string();
    if let Some(idx) = decoded_path.find("http") {
        let candidate = decoded_path[idx..].trim();
        if !candidate.is_empty() {
            return (raw_url, fix_scheme(candidate));
        }
    }

    (raw_url.clone(), fix_scheme(&raw_url))
}

fn is_redirector(host: &str) -> bool {
    host.starts_with("news.google.")
}

/// `http:/example.com` → `http://example.com`; leaves well-formed URLs alone.
fn fix_scheme(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("http:/").filter(|r| !r.starts_with('/')) {
        return format!("http://{rest}");
    }
    if let Some(rest) = raw.strip_prefix("https:/").filter(|r| !r.starts_with('/')) {
        return format!("https://{rest}");
    }
    raw.to_string()
}

/// Registrable-ish domain for allowlist/blocklist comparisons: lower-cased
/// host with a leading `www.` stripped.
pub fn domain_of(canonical_url: &str) -> String {
    Url::parse(canonical_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .map(|h| h.strip_prefix("www.").map(str::to_string).unwrap_or(h))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(link: &str, origlink: Option<&str>) -> FeedEntry {
        FeedEntry { link: link.to_string(), origlink: origlink.map(str::to_string), ..Default::default() }
    }

    #[test]
    fn non_redirector_link_passes_through() {
        let (raw, canonical) = canonicalize(&entry("https://www.reuters.com/markets/a", None));
        assert_eq!(raw, "https://www.reuters.com/markets/a");
        assert_eq!(canonical, "https://www.reuters.com/markets/a");
    }

    #[test]
    fn google_news_link_prefers_origlink() {
        let (_, canonical) = canonicalize(&entry(
            "https://news.google.com/rss/articles/abc?oc=5",
            Some("https://www.bloomberg.com/news/x"),
        ));
        assert_eq!(canonical, "https://www.bloomberg.com/news/x");
    }

    #[test]
    fn google_news_link_falls_back_to_query_param() {
        let (_, canonical) = canonicalize(&entry(
            "https://news.google.com/url?url=https://example.com/story&ct=1",
            None,
        ));
        assert_eq!(canonical, "https://example.com/story");
    }

    #[test]
    fn malformed_scheme_is_normalized() {
        let (_, canonical) = canonicalize(&entry("http:/example.com/a", None));
        assert_eq!(canonical, "http://example.com/a");
    }

    #[test]
    fn domain_of_strips_www() {
        assert_eq!(domain_of("https://www.example.com/a"), "example.com");
        assert_eq!(domain_of("https://example.com/a"), "example.com");
    }
}
