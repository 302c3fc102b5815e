//! Candidate scoring and mode selection (§4.9 steps 4 and 6).

use std::collections::HashSet;

use context_core::FetchedPage;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::candidates::{Candidate, CandidateSource};

pub const BAD_HOST_KEYWORDS: &[&str] = &[
    "seekingalpha.com",
    "investing.com",
    "marketwatch.com",
    "fool.com",
    "benzinga.com",
    "tipranks.com",
    "finance.yahoo.com",
    "sec.report",
    "stockanalysis.com",
    "nasdaq.com",
    "prnewswire.com",
    "quartr.com",
    "secfilings.com",
    "daloopa.com",
    "businesswire.com",
    "globenewswire.com",
];

const IR_KEYWORDS: &[&str] =
    &["investor relations", "shareholder", "investors", "stock information", "corporate governance", "annual meeting"];
const FINANCIAL_PAGE_KEYWORDS: &[&str] =
    &["financial results", "quarterly report", "annual report", "earnings release", "financial statements"];
const SEC_PAGE_KEYWORDS: &[&str] = &["sec filings", "10-k", "10-q", "8-k", "proxy statement", "edgar"];

const IR_URL_HINTS: &[&str] = &["investor", "/ir/", "/ir-", "shareholder"];
const REPORT_URL_HINTS: &[&str] = &["financial-results", "annual-report", "reports", "earnings", "financials"];
const SEC_URL_HINTS: &[&str] = &["sec-filings", "sec_filings", "edgar", "filings"];

const MAX_MATCHED_KEYWORDS: usize = 8;

static ERROR_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(page not found|404 error|access denied|are you a robot|captcha)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Ir,
    Reports,
    Sec,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub url: String,
    pub final_url: String,
    pub source: CandidateSource,
    pub score: f64,
    pub matched_keywords: Vec<String>,
    pub status: u16,
    pub company_domain_match: bool,
    pub ai_verified: Option<bool>,
    pub ai_confidence: Option<f64>,
}

pub fn extract_domain(url_str: &str) -> Option<String> {
    let parsed = url::Url::parse(url_str).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_lowercase())
}

/// Registrable-domain tokens used for company-name matching, handling
/// `about`/`at`-prefixed sister domains (`aboutamazon.com` -> `amazon`,
/// `atmeta.com` -> `meta`). Tokens shorter than 3 chars are dropped.
pub fn extract_domain_tokens(domain: &str) -> Vec<String> {
    let root = domain.split('.').next().unwrap_or(domain);
    let mut candidates = vec![root.to_string()];
    if let Some(rest) = root.strip_prefix("about") {
        candidates.push(rest.to_string());
    }
    if let Some(rest) = root.strip_prefix("at") {
        candidates.push(rest.to_string());
    }
    candidates.into_iter().filter(|t| t.len() >= 3).collect()
}

fn is_bad_host(domain: &str) -> bool {
    BAD_HOST_KEYWORDS.iter().any(|bad| domain == *bad || domain.ends_with(&format!(".{bad}")))
}

fn company_domain_match(candidate_domain: &str, company_domain: &str) -> Option<f64> {
    if candidate_domain == company_domain {
        return Some(20.0);
    }
    let company_root = company_domain.split('.').next().unwrap_or(company_domain);
    let candidate_root = candidate_domain.split('.').next().unwrap_or(candidate_domain);
    if candidate_domain.ends_with(&format!(".{company_domain}")) || candidate_root == company_root {
        return Some(11.0);
    }
    None
}

fn keyword_hits(haystack: &str, keywords: &[&str]) -> Vec<String> {
    keywords.iter().filter(|kw| haystack.contains(*kw)).map(|kw| kw.to_string()).collect()
}

fn url_segment_hits(url_str: &str, hints: &[&str]) -> usize {
    let lower = url_str.to_lowercase();
    hints.iter().filter(|h| lower.contains(*h)).count()
}

/// Scores one fetched candidate page (§4.9 step 4).
pub fn score_candidate(
    candidate: &Candidate,
    page: &FetchedPage,
    company_domain: Option<&str>,
    company_name_tokens: &[String],
) -> ScoredCandidate {
    let mut score = 0.0;
    let mut matched = Vec::new();

    let ir_like_url = IR_URL_HINTS.iter().any(|h| candidate.url.to_lowercase().contains(h));
    match page.status {
        200..=299 => score += 12.0,
        300..=399 => score += 4.0,
        403 | 429 if ir_like_url => score += 18.0,
        403 | 429 => score += 8.0,
        _ => score -= 20.0,
    }

    if page.content_type.to_lowercase().contains("html") {
        score += 2.0;
    }

    let candidate_domain = extract_domain(&page.final_url).or_else(|| extract_domain(&candidate.url));
    let domain_match_bonus = match (candidate_domain.as_deref(), company_domain) {
        (Some(cd), Some(company)) => company_domain_match(cd, company),
        _ => None,
    };
    if let Some(bonus) = domain_match_bonus {
        score += bonus;
    }

    let body = format!("{} {} {}", page.title, page.text_snippet, candidate.url).to_lowercase();

    let ir_hits = keyword_hits(&body, IR_KEYWORDS);
    score += 6.0 * ir_hits.len().min(MAX_MATCHED_KEYWORDS) as f64;
    matched.extend(ir_hits);

    let fin_hits = keyword_hits(&body, FINANCIAL_PAGE_KEYWORDS);
    score += 4.0 * fin_hits.len().min(MAX_MATCHED_KEYWORDS) as f64;
    matched.extend(fin_hits);

    let sec_hits = keyword_hits(&body, SEC_PAGE_KEYWORDS);
    score += 4.0 * sec_hits.len().min(MAX_MATCHED_KEYWORDS) as f64;
    matched.extend(sec_hits);

    let segment_hits = url_segment_hits(&candidate.url, IR_URL_HINTS)
        + url_segment_hits(&candidate.url, REPORT_URL_HINTS)
        + url_segment_hits(&candidate.url, SEC_URL_HINTS);
    if segment_hits > 0 {
        score += (8.0 + segment_hits.min(2) as f64).min(10.0);
    }

    for token in company_name_tokens.iter().take(2) {
        if !token.is_empty() && body.contains(&token.to_lowercase()) {
            score += 3.0;
        }
    }

    let is_challenge = ERROR_PAGE.is_match(&page.text_snippet) || ERROR_PAGE.is_match(&page.title);
    if is_challenge {
        let dedicated_ir_subdomain = candidate_domain.as_deref().is_some_and(|d| {
            d.starts_with("investor.") || d.starts_with("investors.") || d.starts_with("ir.")
        });
        if !dedicated_ir_subdomain {
            score -= 120.0;
        }
    }

    if let Some(domain) = candidate_domain.as_deref() {
        if is_bad_host(domain) {
            score -= 45.0;
        }
    }

    matched.truncate(MAX_MATCHED_KEYWORDS);

    ScoredCandidate {
        url: candidate.url.clone(),
        final_url: page.final_url.clone(),
        source: candidate.source,
        score,
        matched_keywords: matched,
        status: page.status,
        company_domain_match: domain_match_bonus.is_some(),
        ai_verified: None,
        ai_confidence: None,
    }
}

static HOME_LIKE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^/?(|[a-z]{2}-[a-z]{2}|home|index(\.\w+)?|default(\.\w+)?)/?$").unwrap());

pub fn is_home_like_path(url_str: &str) -> bool {
    match url::Url::parse(url_str) {
        Ok(parsed) => HOME_LIKE_PATH.is_match(parsed.path()),
        Err(_) => false,
    }
}

fn has_mode_path_signal(url_str: &str, mode: Mode) -> bool {
    let hints: &[&str] = match mode {
        Mode::Ir => IR_URL_HINTS,
        Mode::Reports => REPORT_URL_HINTS,
        Mode::Sec => SEC_URL_HINTS,
    };
    url_segment_hits(url_str, hints) > 0
}

fn is_dedicated_ir_subdomain(url_str: &str) -> bool {
    extract_domain(url_str)
        .is_some_and(|d| d.starts_with("investor.") || d.starts_with("investors.") || d.starts_with("ir."))
}

/// Mode-specific hard-signal gate: does this candidate carry the minimum
/// evidence needed to even be considered for `mode`?
fn passes_hard_signal(candidate: &ScoredCandidate, mode: Mode) -> bool {
    let path_signal = has_mode_path_signal(&candidate.url, mode) || has_mode_path_signal(&candidate.final_url, mode);
    match mode {
        Mode::Ir => path_signal || candidate.company_domain_match,
        Mode::Reports | Mode::Sec => {
            let domain_ok = candidate.company_domain_match
                || (mode == Mode::Sec && extract_domain(&candidate.final_url).as_deref() == Some("sec.gov"));
            domain_ok && path_signal
        }
    }
}

/// Picks the best-scoring survivor for `mode` (§4.9 step 6): hard-signal
/// gate, home-like-path penalty, minimum-score threshold.
pub fn pick_best(scored: &[ScoredCandidate], mode: Mode) -> Option<&ScoredCandidate> {
    let mut best: Option<(&ScoredCandidate, f64)> = None;
    for candidate in scored {
        if !passes_hard_signal(candidate, mode) {
            continue;
        }
        let mut effective = candidate.score;
        let home_like = is_home_like_path(&candidate.final_url);
        let dedicated = is_dedicated_ir_subdomain(&candidate.final_url);
        if home_like && !(mode == Mode::Ir && dedicated) {
            effective -= 14.0;
        }

        let has_hard_signal = has_mode_path_signal(&candidate.url, mode) || has_mode_path_signal(&candidate.final_url, mode);
        let threshold = match mode {
            Mode::Ir if has_hard_signal => 18.0,
            Mode::Ir => 24.0,
            Mode::Reports | Mode::Sec => 30.0,
        };
        if effective < threshold {
            continue;
        }

        let better = match best {
            Some((_, best_score)) => effective > best_score,
            None => true,
        };
        if better {
            best = Some((candidate, effective));
        }
    }
    best.map(|(c, _)| c)
}
