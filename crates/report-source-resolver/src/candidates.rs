//! Candidate generation (§4.9 step 2): hinted URLs, domain-pattern URLs, and
//! search queries, deduplicated preserving priority and capped at
//! `MAX_CANDIDATES`.

pub const MAX_CANDIDATES: usize = 24;

const SISTER_PREFIXES: &[&str] = &["investor", "investors", "ir", "stock"];
const DOMAIN_PATHS: &[&str] = &["/investor-relations", "/reports.html", "/annual-reports", "/financials"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Hinted,
    DomainPattern,
    Search,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub url: String,
    pub source: CandidateSource,
}

/// Strips scheme and `www.` from a website URL, leaving a bare registrable
/// host suitable for building sister-domain patterns.
pub fn bare_domain(website: &str) -> Option<String> {
    let parsed = url::Url::parse(website).or_else(|_| url::Url::parse(&format!("https://{website}"))).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

fn domain_pattern_urls(domain: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for prefix in SISTER_PREFIXES {
        urls.push(format!("https://{prefix}.{domain}/"));
    }
    urls.push(format!("https://{domain}"));
    for path in DOMAIN_PATHS {
        urls.push(format!("https://{domain}{path}"));
    }
    urls
}

fn search_queries(ticker: &str, company_name: &str) -> Vec<String> {
    let mut queries = vec![
        format!("{ticker} investor relations"),
        format!("{ticker} financial results investor relations"),
        format!("{ticker} annual report"),
    ];
    if !company_name.is_empty() && !company_name.eq_ignore_ascii_case(ticker) {
        queries.push(format!("{company_name} investor relations"));
        queries.push(format!("{company_name} annual report"));
    }
    queries
}

/// Builds the full candidate list in priority order: hinted URLs first, then
/// domain-pattern URLs, then URLs resolved from search queries. `search` is
/// the already-executed search results for each query in `search_queries`
/// order (the caller owns the actual `SearchAdapter` call since it's async).
pub fn build_candidates(
    ticker: &str,
    company_name: &str,
    company_website: Option<&str>,
    hinted_urls: &[String],
    search_results: &[Vec<String>],
) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    let mut push = |url: String, source: CandidateSource, out: &mut Vec<Candidate>| {
        let key = url.trim_end_matches('/').to_lowercase();
        if seen.insert(key) {
            out.push(Candidate { url, source });
        }
    };

    for url in hinted_urls {
        push(url.clone(), CandidateSource::Hinted, &mut out);
    }

    if let Some(website) = company_website {
        if let Some(domain) = bare_domain(website) {
            for url in domain_pattern_urls(&domain) {
                push(url, CandidateSource::DomainPattern, &mut out);
            }
        }
    }

    for results in search_results {
        for url in results {
            push(url.clone(), CandidateSource::Search, &mut out);
        }
    }

    let _ = search_queries(ticker, company_name);
    out.truncate(MAX_CANDIDATES);
    out
}

/// The queries to run through the `SearchAdapter`, in the order
/// `build_candidates` expects their results back in.
pub fn queries_for(ticker: &str, company_name: &str) -> Vec<String> {
    search_queries(ticker, company_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_domain_strips_scheme_and_www() {
        assert_eq!(bare_domain("https://www.apple.com/about").unwrap(), "apple.com");
        assert_eq!(bare_domain("apple.com").unwrap(), "apple.com");
    }

    #[test]
    fn domain_pattern_urls_cover_sister_domains_and_paths() {
        let urls = domain_pattern_urls("apple.com");
        assert!(urls.contains(&"https://investor.apple.com/".to_string()));
        assert!(urls.contains(&"https://ir.apple.com/".to_string()));
        assert!(urls.contains(&"https://apple.com/investor-relations".to_string()));
    }

    #[test]
    fn build_candidates_dedupes_preserving_priority() {
        let hinted = vec!["https://investor.apple.com/".to_string()];
        let candidates = build_candidates("AAPL", "Apple Inc.", Some("https://www.apple.com"), &hinted, &[]);
        // Hinted URL wins over the identical domain-pattern URL generated later.
        assert_eq!(candidates.iter().filter(|c| c.url.trim_end_matches('/') == "https://investor.apple.com").count(), 1);
        assert_eq!(candidates[0].source, CandidateSource::Hinted);
    }

    #[test]
    fn build_candidates_caps_at_max_candidates() {
        let search_results: Vec<Vec<String>> =
            (0..40).map(|i| vec![format!("https://example{i}.com/ir")]).collect();
        let candidates = build_candidates("AAPL", "Apple Inc.", None, &[], &search_results);
        assert_eq!(candidates.len(), MAX_CANDIDATES);
    }

    #[test]
    fn queries_for_includes_company_name_variants() {
        let queries = queries_for("AAPL", "Apple Inc.");
        assert!(queries.iter().any(|q| q.contains("Apple Inc.")));
        assert!(queries.iter().any(|q| q == "AAPL investor relations"));
    }
}
