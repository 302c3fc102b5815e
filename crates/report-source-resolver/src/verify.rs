//! Optional AI verification of top candidates (§4.9 step 5).
//!
//! The concrete classifier is out of scope here — an external collaborator,
//! not specified by this repo. `AiVerifier` is the interface a real
//! LLM-backed implementation plugs into; `NullAiVerifier` is the
//! always-unconfigured default used when no verifier is wired up.

use async_trait::async_trait;
use context_core::{EngineResult, FetchedPage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageKind {
    InvestorRelations,
    FinancialReports,
    SecFilings,
    Unrelated,
}

#[derive(Debug, Clone)]
pub struct AiVerdict {
    pub is_official_ir_page: bool,
    pub confidence: f64,
    pub reason: String,
    pub page_kind: PageKind,
}

#[async_trait]
pub trait AiVerifier: Send + Sync {
    /// Whether the verifier has everything it needs (credentials, feature
    /// flag) to actually run; callers skip verification entirely when false.
    fn is_configured(&self) -> bool;

    async fn verify(&self, ticker: &str, company_name: &str, page: &FetchedPage) -> EngineResult<Option<AiVerdict>>;
}

/// Default no-op verifier: always unconfigured, so `resolve` falls back to
/// the pure scoring path without attempting a classifier call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAiVerifier;

#[async_trait]
impl AiVerifier for NullAiVerifier {
    fn is_configured(&self) -> bool {
        false
    }

    async fn verify(&self, _ticker: &str, _company_name: &str, _page: &FetchedPage) -> EngineResult<Option<AiVerdict>> {
        Ok(None)
    }
}

/// Applies the boost/penalty formula (§4.9 step 5) to a score given a
/// verdict: `+10 + 8*confidence` when verified, `-20` when rejected with
/// confidence >= 0.7, unchanged otherwise.
pub fn apply_verdict(score: f64, verdict: &AiVerdict) -> f64 {
    if verdict.is_official_ir_page {
        score + 10.0 + 8.0 * verdict.confidence
    } else if verdict.confidence >= 0.7 {
        score - 20.0
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_verifier_is_never_configured() {
        let verifier = NullAiVerifier;
        assert!(!verifier.is_configured());
        let page = FetchedPage::default();
        assert!(verifier.verify("AAPL", "Apple Inc.", &page).await.unwrap().is_none());
    }

    #[test]
    fn apply_verdict_boosts_confirmed_verdict() {
        let verdict = AiVerdict {
            is_official_ir_page: true,
            confidence: 0.9,
            reason: "matches IR template".into(),
            page_kind: PageKind::InvestorRelations,
        };
        assert_eq!(apply_verdict(20.0, &verdict), 20.0 + 10.0 + 8.0 * 0.9);
    }

    #[test]
    fn apply_verdict_penalizes_confident_rejection() {
        let verdict =
            AiVerdict { is_official_ir_page: false, confidence: 0.8, reason: "blog post".into(), page_kind: PageKind::Unrelated };
        assert_eq!(apply_verdict(20.0, &verdict), 0.0);
    }

    #[test]
    fn apply_verdict_ignores_low_confidence_rejection() {
        let verdict =
            AiVerdict { is_official_ir_page: false, confidence: 0.3, reason: "unsure".into(), page_kind: PageKind::Unrelated };
        assert_eq!(apply_verdict(20.0, &verdict), 20.0);
    }
}
