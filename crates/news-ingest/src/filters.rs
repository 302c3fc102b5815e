//! Keyword/domain pre-filters and optional content filters (§4.6 steps 5
//! and 7), plus a diagnostic outcome for observability when neither pass.

use context_core::EntityConfig;

/// Why an entry was kept or dropped. `Passed` is the only variant that lets
/// an entry through; the rest are diagnostics, not persisted artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Passed,
    MissingRequiredKeyword,
    MatchedExcludedKeyword(String),
    DomainNotAllowlisted(String),
    DomainBlocklisted(String),
    BodyRequiredButEmpty,
    ContentTooShort { got: usize, min: usize },
    SummaryTooShort { got: usize, min: usize },
}

impl FilterOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Step 5: keyword/domain pre-filters against title+summary+source and the
/// canonical URL's domain.
pub fn pre_filter(entity: &EntityConfig, title: &str, summary: &str, source: &str, domain: &str) -> FilterOutcome {
    let haystack = format!("{title} {summary} {source}").to_lowercase();

    if !entity.required_keywords.is_empty()
        && !entity.required_keywords.iter().any(|kw| haystack.contains(&kw.to_lowercase()))
    {
        return FilterOutcome::MissingRequiredKeyword;
    }

    if let Some(hit) = entity.excluded_keywords.iter().find(|kw| haystack.contains(&kw.to_lowercase())) {
        return FilterOutcome::MatchedExcludedKeyword(hit.clone());
    }

    if !entity.source_allowlist.is_empty() && !entity.source_allowlist.iter().any(|d| d.to_lowercase() == domain) {
        return FilterOutcome::DomainNotAllowlisted(domain.to_string());
    }

    if entity.source_blocklist.iter().any(|d| d.to_lowercase() == domain) {
        return FilterOutcome::DomainBlocklisted(domain.to_string());
    }

    FilterOutcome::Passed
}

/// Step 7: optional content filters, only consulted when
/// `enforce_content_filters` is set.
pub fn content_filter(entity: &EntityConfig, body: Option<&str>, summary: &str) -> FilterOutcome {
    if !entity.enforce_content_filters {
        return FilterOutcome::Passed;
    }

    let body_len = body.map(str::len).unwrap_or(0);

    if entity.require_full_text && body.map(str::trim).unwrap_or("").is_empty() {
        return FilterOutcome::BodyRequiredButEmpty;
    }

    if entity.min_content_length > 0 && body_len < entity.min_content_length {
        return FilterOutcome::ContentTooShort { got: body_len, min: entity.min_content_length };
    }

    if body.map(str::trim).unwrap_or("").is_empty() && entity.min_summary_length > 0 {
        let summary_len = summary.len();
        if summary_len < entity.min_summary_length {
            return FilterOutcome::SummaryTooShort { got: summary_len, min: entity.min_summary_length };
        }
    }

    let haystack = format!("{body} {summary}", body = body.unwrap_or_default()).to_lowercase();
    if !entity.required_keywords.is_empty()
        && !entity.required_keywords.iter().any(|kw| haystack.contains(&kw.to_lowercase()))
    {
        return FilterOutcome::MissingRequiredKeyword;
    }

    FilterOutcome::Passed
}
