//! Cache lookup, TTL, lightweight recheck, and persistence (§4.9 steps 1, 9).

use chrono::{DateTime, Duration, Utc};
use context_core::{EngineResult, FetchedPage, ReportSource, Storage, VerificationStatus, WebFetcher};

use crate::score::extract_domain;

pub const CACHE_TTL: Duration = Duration::seconds(86_400);

/// Long-lived artifact cache-control (§4.1): a 10 minute browser/CDN cache
/// backed by a day of stale-while-revalidate grace.
pub const LONG_LIVED_CACHE_CONTROL: &str = "public, max-age=600, stale-while-revalidate=86400";

pub fn report_source_path(ticker: &str) -> String {
    format!("report_sources/{}.json", ticker.to_uppercase())
}

pub async fn load_cached(storage: &dyn Storage, ticker: &str) -> EngineResult<Option<ReportSource>> {
    let path = report_source_path(ticker);
    match storage.get(&path).await? {
        Some(bytes) => match serde_json::from_slice::<ReportSource>(&bytes) {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                tracing::warn!("malformed cached report source at {path}: {e}");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

pub async fn save(storage: &dyn Storage, report: &ReportSource) -> EngineResult<()> {
    let path = report_source_path(&report.ticker);
    let bytes = serde_json::to_vec_pretty(report)
        .map_err(|e| context_core::EngineError::consistency(format!("serializing report source: {e}")))?;
    storage.put(&path, bytes, "application/json", Some(LONG_LIVED_CACHE_CONTROL)).await
}

pub fn is_within_ttl(discovered_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(discovered_at) <= CACHE_TTL
}

const IR_HINT_WORDS: &[&str] = &["investor relations", "shareholder", "investors"];

/// Lightweight recheck of a stale-but-verified cache entry (§4.9 step 1):
/// refetch `ir_home_url`, accept on a healthy status, a company-domain-ish
/// host, and an IR-hint word somewhere on the page.
pub async fn recheck_is_still_valid(
    fetcher: &dyn WebFetcher,
    ir_home_url: &str,
    company_domain: Option<&str>,
) -> EngineResult<bool> {
    let page: FetchedPage = match fetcher.fetch(ir_home_url).await {
        Ok(page) => page,
        Err(e) if e.is_transient() => return Ok(false),
        Err(e) => return Err(e),
    };
    Ok(recheck_page_is_valid(&page, company_domain))
}

fn recheck_page_is_valid(page: &FetchedPage, company_domain: Option<&str>) -> bool {
    if !(200..400).contains(&page.status) {
        return false;
    }
    let host_ok = match extract_domain(&page.final_url) {
        Some(domain) => {
            let is_company_domain = company_domain.is_some_and(|cd| domain == cd || domain.ends_with(&format!(".{cd}")));
            is_company_domain || domain.starts_with("ir.") || domain.starts_with("investor.") || domain.starts_with("investors.")
        }
        None => false,
    };
    if !host_ok {
        return false;
    }
    let haystack = format!("{} {}", page.title, page.text_snippet).to_lowercase();
    IR_HINT_WORDS.iter().any(|hint| haystack.contains(hint))
}

/// Whether `report` should be trusted as-is without a full resolve, given
/// `now`: fresh-and-any-status, or verified-and-rechecked.
pub fn cache_result(report: ReportSource, now: DateTime<Utc>, recheck_ok: Option<bool>) -> CacheDecision {
    if is_within_ttl(report.discovered_at, now) {
        return CacheDecision::Fresh(report);
    }
    match (report.verification_status, recheck_ok) {
        (VerificationStatus::Verified, Some(true)) => CacheDecision::RecheckAccepted(report),
        _ => CacheDecision::Stale,
    }
}

pub enum CacheDecision {
    Fresh(ReportSource),
    RecheckAccepted(ReportSource),
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(final_url: &str, status: u16, title: &str, text: &str) -> FetchedPage {
        FetchedPage { final_url: final_url.to_string(), status, content_type: "text/html".into(), title: title.to_string(), text_snippet: text.to_string(), links: vec![] }
    }

    #[test]
    fn report_source_path_uppercases_ticker() {
        assert_eq!(report_source_path("aapl"), "report_sources/AAPL.json");
    }

    #[test]
    fn is_within_ttl_true_just_under_a_day() {
        let now = DateTime::parse_from_rfc3339("2026-01-02T00:00:00Z").unwrap().with_timezone(&Utc);
        let discovered = now - Duration::hours(23);
        assert!(is_within_ttl(discovered, now));
    }

    #[test]
    fn is_within_ttl_false_past_a_day() {
        let now = DateTime::parse_from_rfc3339("2026-01-02T00:00:00Z").unwrap().with_timezone(&Utc);
        let discovered = now - Duration::hours(25);
        assert!(!is_within_ttl(discovered, now));
    }

    #[test]
    fn recheck_accepts_healthy_ir_subdomain_with_hint() {
        let p = page("https://investor.apple.com/", 200, "Investor Relations", "Shareholder information and filings");
        assert!(recheck_page_is_valid(&p, Some("apple.com")));
    }

    #[test]
    fn recheck_rejects_bad_status() {
        let p = page("https://investor.apple.com/", 404, "Not found", "");
        assert!(!recheck_page_is_valid(&p, Some("apple.com")));
    }

    #[test]
    fn recheck_rejects_unrelated_host() {
        let p = page("https://seekingalpha.com/aapl", 200, "AAPL", "investor relations coverage");
        assert!(!recheck_page_is_valid(&p, Some("apple.com")));
    }

    #[test]
    fn recheck_rejects_missing_ir_hint() {
        let p = page("https://investor.apple.com/", 200, "Page", "nothing relevant here");
        assert!(!recheck_page_is_valid(&p, Some("apple.com")));
    }
}
