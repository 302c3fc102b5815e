//! Bounded, cacheable, verifiable lookup of a company's official
//! investor-relations surface (§4.9).

pub mod candidates;
pub mod persist;
pub mod score;
pub mod verify;

use std::sync::Arc;

use candidates::{build_candidates, queries_for, Candidate, CandidateSource};
use chrono::{DateTime, Utc};
use context_core::{
    CandidateEvidence, EngineResult, FallbackEvidence, FetchedPage, ReportSource, ReportSourceEvidence, SearchAdapter,
    Storage, VerificationStatus, WebFetcher,
};
use persist::CacheDecision;
use score::{score_candidate, Mode, ScoredCandidate};
use verify::AiVerifier;

const MAX_EVIDENCE_CANDIDATES: usize = 12;
const SEARCH_RESULTS_PER_QUERY: usize = 5;
const SECONDARY_LINK_SCORE_THRESHOLD: f64 = 10.0;
const MAX_SECONDARY_LINKS_CHECKED: usize = 20;

pub struct ReportSourceResolver {
    storage: Arc<dyn Storage>,
    web_fetcher: Arc<dyn WebFetcher>,
    search_adapter: Arc<dyn SearchAdapter>,
    ai_verifier: Arc<dyn AiVerifier>,
}

impl ReportSourceResolver {
    pub fn new(
        storage: Arc<dyn Storage>,
        web_fetcher: Arc<dyn WebFetcher>,
        search_adapter: Arc<dyn SearchAdapter>,
        ai_verifier: Arc<dyn AiVerifier>,
    ) -> Self {
        Self { storage, web_fetcher, search_adapter, ai_verifier }
    }

    pub async fn resolve(
        &self,
        ticker: &str,
        company_name: &str,
        company_website: Option<&str>,
        hinted_urls: &[String],
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<ReportSource> {
        if !force_refresh {
            if let Some(cached) = persist::load_cached(self.storage.as_ref(), ticker).await? {
                let company_domain = company_website.and_then(candidates::bare_domain);
                let recheck_ok = if persist::is_within_ttl(cached.discovered_at, now) {
                    None
                } else if cached.verification_status == VerificationStatus::Verified {
                    match &cached.ir_home_url {
                        Some(ir_url) => Some(
                            persist::recheck_is_still_valid(self.web_fetcher.as_ref(), ir_url, company_domain.as_deref())
                                .await
                                .unwrap_or(false),
                        ),
                        None => Some(false),
                    }
                } else {
                    None
                };

                match persist::cache_result(cached, now, recheck_ok) {
                    CacheDecision::Fresh(report) => return Ok(report),
                    CacheDecision::RecheckAccepted(mut report) => {
                        report.discovered_at = now;
                        persist::save(self.storage.as_ref(), &report).await?;
                        return Ok(report);
                    }
                    CacheDecision::Stale => {}
                }
            }
        }

        self.full_resolve(ticker, company_name, company_website, hinted_urls, now).await
    }

    async fn full_resolve(
        &self,
        ticker: &str,
        company_name: &str,
        company_website: Option<&str>,
        hinted_urls: &[String],
        now: DateTime<Utc>,
    ) -> EngineResult<ReportSource> {
        let queries = queries_for(ticker, company_name);
        let mut search_results = Vec::with_capacity(queries.len());
        for query in &queries {
            let results = self.search_adapter.search(query, SEARCH_RESULTS_PER_QUERY).await.unwrap_or_default();
            search_results.push(results);
        }

        let candidate_list = build_candidates(ticker, company_name, company_website, hinted_urls, &search_results);
        let company_domain = company_website.and_then(candidates::bare_domain);
        let company_tokens = company_name_tokens(company_name);

        let mut fetched: Vec<(Candidate, FetchedPage)> = Vec::new();
        for candidate in &candidate_list {
            match self.web_fetcher.fetch(&candidate.url).await {
                Ok(page) => fetched.push((candidate.clone(), page)),
                Err(e) => tracing::debug!("skipping candidate {}: {e}", candidate.url),
            }
        }

        let mut scored: Vec<ScoredCandidate> =
            fetched.iter().map(|(c, p)| score_candidate(c, p, company_domain.as_deref(), &company_tokens)).collect();

        let ai_enabled = self.ai_verifier.is_configured();
        if ai_enabled {
            self.verify_top_candidates(&mut scored, ticker, company_name).await;
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let ir_best = score::pick_best(&scored, Mode::Ir).cloned();
        let reports_best = score::pick_best(&scored, Mode::Reports).cloned();
        let sec_best = score::pick_best(&scored, Mode::Sec).cloned();

        let (ir_url, mut reports_url, mut sec_url, fallback) = if ir_best.is_none() && !hinted_urls.is_empty() {
            (Some(hinted_urls[0].clone()), reports_best.as_ref().map(|c| c.final_url.clone()), sec_best.as_ref().map(|c| c.final_url.clone()), Some(FallbackEvidence { mode: "ir".to_string(), used: true }))
        } else {
            (ir_best.as_ref().map(|c| c.final_url.clone()), reports_best.as_ref().map(|c| c.final_url.clone()), sec_best.as_ref().map(|c| c.final_url.clone()), None)
        };

        if fallback.is_none() {
            if let Some(ir_url) = &ir_url {
                if reports_url.is_none() || sec_url.is_none() {
                    let enriched = self.enrich_secondary_links(ir_url, company_domain.as_deref(), &company_tokens).await;
                    if reports_url.is_none() {
                        reports_url = enriched.get(&Mode::Reports).cloned();
                    }
                    if sec_url.is_none() {
                        sec_url = enriched.get(&Mode::Sec).cloned();
                    }
                }
            }
        }

        let verification_status = if ir_url.is_none() {
            VerificationStatus::NotFound
        } else if reports_url.is_some() || sec_url.is_some() {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Partial
        };

        let confidence = if fallback.is_some() {
            0.22
        } else {
            match verification_status {
                VerificationStatus::NotFound | VerificationStatus::Error => 0.0,
                VerificationStatus::Partial => (ir_best.as_ref().map(|c| c.score).unwrap_or(0.0) / 70.0).clamp(0.0, 0.75),
                VerificationStatus::Verified => (ir_best.as_ref().map(|c| c.score).unwrap_or(0.0) / 70.0).clamp(0.0, 1.0),
            }
        };

        let candidates_evidence: Vec<CandidateEvidence> = scored
            .iter()
            .take(MAX_EVIDENCE_CANDIDATES)
            .map(|c| CandidateEvidence { url: c.url.clone(), score: c.score, mode_hits: mode_hits_for(c) })
            .collect();

        let report = ReportSource {
            ticker: ticker.to_uppercase(),
            company_name: company_name.to_string(),
            company_website: company_website.map(str::to_string),
            ir_home_url: ir_url,
            financial_reports_url: reports_url,
            sec_filings_url: sec_url,
            confidence,
            verification_status,
            discovered_at: now,
            evidence: ReportSourceEvidence {
                candidate_count: candidate_list.len() as u32,
                candidates: candidates_evidence,
                ai_enabled,
                fallback,
            },
        };

        persist::save(self.storage.as_ref(), &report).await?;
        Ok(report)
    }

    async fn verify_top_candidates(&self, scored: &mut [ScoredCandidate], ticker: &str, company_name: &str) {
        let mut indices: Vec<usize> = (0..scored.len()).collect();
        indices.sort_by(|&a, &b| scored[b].score.partial_cmp(&scored[a].score).unwrap_or(std::cmp::Ordering::Equal));
        for &idx in indices.iter().take(3) {
            let page = FetchedPage { final_url: scored[idx].final_url.clone(), status: scored[idx].status, ..Default::default() };
            match self.ai_verifier.verify(ticker, company_name, &page).await {
                Ok(Some(verdict)) => {
                    scored[idx].score = verify::apply_verdict(scored[idx].score, &verdict);
                    scored[idx].ai_verified = Some(verdict.is_official_ir_page);
                    scored[idx].ai_confidence = Some(verdict.confidence);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("ai verification failed for {}: {e}", scored[idx].url),
            }
        }
    }

    async fn enrich_secondary_links(
        &self,
        ir_url: &str,
        company_domain: Option<&str>,
        company_tokens: &[String],
    ) -> std::collections::HashMap<Mode, String> {
        let mut found = std::collections::HashMap::new();
        let ir_page = match self.web_fetcher.fetch(ir_url).await {
            Ok(page) => page,
            Err(_) => return found,
        };

        for link in ir_page.links.iter().take(MAX_SECONDARY_LINKS_CHECKED) {
            let page = match self.web_fetcher.fetch(link).await {
                Ok(page) => page,
                Err(_) => continue,
            };
            let candidate = Candidate { url: link.clone(), source: CandidateSource::DomainPattern };
            let scored = score_candidate(&candidate, &page, company_domain, company_tokens);
            for mode in [Mode::Reports, Mode::Sec] {
                if found.contains_key(&mode) {
                    continue;
                }
                if scored.score >= SECONDARY_LINK_SCORE_THRESHOLD {
                    found.insert(mode, scored.final_url.clone());
                }
            }
            if found.len() == 2 {
                break;
            }
        }
        found
    }
}

fn company_name_tokens(company_name: &str) -> Vec<String> {
    const SUFFIXES: &[&str] = &["inc", "inc.", "corp", "corp.", "corporation", "ltd", "ltd.", "plc", "co", "co.", "llc"];
    company_name
        .split_whitespace()
        .filter(|w| !SUFFIXES.contains(&w.to_lowercase().as_str()))
        .map(str::to_string)
        .take(2)
        .collect()
}

fn mode_hits_for(candidate: &ScoredCandidate) -> Vec<String> {
    let mut hits = Vec::new();
    for (mode, label) in [(Mode::Ir, "ir"), (Mode::Reports, "reports"), (Mode::Sec, "sec")] {
        if score::pick_best(std::slice::from_ref(candidate), mode).is_some() {
            hits.push(label.to_string());
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use context_core::EngineError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubFetcher {
        pages: Mutex<HashMap<String, FetchedPage>>,
    }

    #[async_trait]
    impl WebFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> EngineResult<FetchedPage> {
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| EngineError::TransientUpstream(format!("no stub page for {url}")))
        }

        async fn extract_body(&self, _url: &str) -> EngineResult<Option<String>> {
            Ok(None)
        }
    }

    struct StubSearch;

    #[async_trait]
    impl SearchAdapter for StubSearch {
        async fn search(&self, _query: &str, _limit: usize) -> EngineResult<Vec<String>> {
            Ok(vec![])
        }
    }

    struct MemStorage {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemStorage {
        fn new() -> Self {
            Self { objects: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl Storage for MemStorage {
        async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str, _cache_control: Option<&str>) -> EngineResult<()> {
            self.objects.lock().unwrap().insert(path.to_string(), bytes);
            Ok(())
        }

        async fn put_if_absent(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> EngineResult<bool> {
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(path) {
                return Ok(false);
            }
            objects.insert(path.to_string(), bytes);
            let _ = content_type;
            Ok(true)
        }

        async fn get(&self, path: &str) -> EngineResult<Option<Vec<u8>>> {
            Ok(self.objects.lock().unwrap().get(path).cloned())
        }

        async fn list(&self, _prefix: &str) -> EngineResult<Vec<context_core::BlobMeta>> {
            Ok(vec![])
        }

        async fn age(&self, _path: &str, _now: DateTime<Utc>) -> EngineResult<Option<chrono::Duration>> {
            Ok(None)
        }
    }

    fn page(final_url: &str, status: u16, title: &str, text: &str, links: Vec<String>) -> FetchedPage {
        FetchedPage { final_url: final_url.to_string(), status, content_type: "text/html".into(), title: title.to_string(), text_snippet: text.to_string(), links }
    }

    #[tokio::test]
    async fn resolves_ir_home_from_domain_pattern_candidate() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://investor.apple.com/".to_string(),
            page("https://investor.apple.com/investor-relations", 200, "Investor Relations", "shareholder information and annual report", vec![]),
        );
        pages.insert("https://apple.com".to_string(), page("https://apple.com", 200, "Apple", "buy iphone", vec![]));
        pages.insert(
            "https://apple.com/investor-relations".to_string(),
            page("https://apple.com/investor-relations", 404, "", "", vec![]),
        );
        pages.insert("https://apple.com/reports.html".to_string(), page("https://apple.com/reports.html", 404, "", "", vec![]));
        pages.insert("https://apple.com/annual-reports".to_string(), page("https://apple.com/annual-reports", 404, "", "", vec![]));
        pages.insert("https://apple.com/financials".to_string(), page("https://apple.com/financials", 404, "", "", vec![]));
        pages.insert("https://investors.apple.com/".to_string(), page("https://investors.apple.com/", 404, "", "", vec![]));
        pages.insert("https://ir.apple.com/".to_string(), page("https://ir.apple.com/", 404, "", "", vec![]));
        pages.insert("https://stock.apple.com/".to_string(), page("https://stock.apple.com/", 404, "", "", vec![]));

        let resolver = ReportSourceResolver::new(
            Arc::new(MemStorage::new()),
            Arc::new(StubFetcher { pages: Mutex::new(pages) }),
            Arc::new(StubSearch),
            Arc::new(verify::NullAiVerifier),
        );

        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let report = resolver.resolve("AAPL", "Apple Inc.", Some("https://www.apple.com"), &[], false, now).await.unwrap();

        assert_eq!(report.ir_home_url.as_deref(), Some("https://investor.apple.com/investor-relations"));
        assert!(report.verification_status != VerificationStatus::NotFound);
    }

    #[tokio::test]
    async fn falls_back_to_hinted_url_when_nothing_scores() {
        let resolver = ReportSourceResolver::new(
            Arc::new(MemStorage::new()),
            Arc::new(StubFetcher { pages: Mutex::new(HashMap::new()) }),
            Arc::new(StubSearch),
            Arc::new(verify::NullAiVerifier),
        );
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let hinted = vec!["https://investor.example.com/".to_string()];
        let report = resolver.resolve("XYZ", "Example Co", None, &hinted, false, now).await.unwrap();

        assert_eq!(report.ir_home_url.as_deref(), Some("https://investor.example.com/"));
        assert_eq!(report.verification_status, VerificationStatus::Partial);
        assert_eq!(report.confidence, 0.22);
        assert!(report.evidence.fallback.unwrap().used);
    }

    #[tokio::test]
    async fn fresh_cache_entry_is_served_without_a_resolve() {
        let storage = Arc::new(MemStorage::new());
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let cached = ReportSource {
            ticker: "AAPL".into(),
            company_name: "Apple Inc.".into(),
            company_website: Some("https://www.apple.com".into()),
            ir_home_url: Some("https://investor.apple.com/".into()),
            financial_reports_url: Some("https://investor.apple.com/reports".into()),
            sec_filings_url: None,
            confidence: 0.8,
            verification_status: VerificationStatus::Verified,
            discovered_at: now,
            evidence: ReportSourceEvidence { candidate_count: 1, candidates: vec![], ai_enabled: false, fallback: None },
        };
        persist::save(storage.as_ref(), &cached).await.unwrap();

        let resolver =
            ReportSourceResolver::new(storage, Arc::new(StubFetcher { pages: Mutex::new(HashMap::new()) }), Arc::new(StubSearch), Arc::new(verify::NullAiVerifier));
        let served = resolver.resolve("AAPL", "Apple Inc.", Some("https://www.apple.com"), &[], false, now).await.unwrap();
        assert_eq!(served.confidence, 0.8);
    }

    #[test]
    fn company_name_tokens_drops_corporate_suffixes() {
        assert_eq!(company_name_tokens("Apple Inc."), vec!["Apple"]);
        assert_eq!(company_name_tokens("Meta Platforms Inc"), vec!["Meta", "Platforms"]);
    }
}
