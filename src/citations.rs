//! Citation gate: generated text must link at least one real PubMed
//! article or it is rejected outright.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::scoring::{Relevance, ScoredArticle, classify_score};

// Must stay in lockstep with `pubmed::ARTICLE_URL_BASE`: detection is
// literal matching on the canonical link form.
static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://pubmed\.ncbi\.nlm\.nih\.gov/(\d+)").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationCheck {
    pub accepted: bool,
    pub pmids: Vec<String>,
}

/// Accepts the text iff it carries at least one canonical PubMed link.
/// Rejection is a distinct outcome, not an error: the caller renders a
/// specific message for it.
pub fn validate(text: &str) -> CitationCheck {
    let pmids = extract_pmids(text);
    CitationCheck {
        accepted: !pmids.is_empty(),
        pmids,
    }
}

/// Cited PMIDs, deduplicated, in first-appearance order.
pub fn extract_pmids(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CITATION
        .captures_iter(text)
        .filter_map(|captures| {
            let pmid = captures[1].to_string();
            seen.insert(pmid.clone()).then_some(pmid)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub pmid: String,
    pub relevance: Relevance,
}

/// Attaches each cited ID's score-derived relevance label. IDs outside
/// the ranked set get the neutral label rather than failing.
pub fn annotate(pmids: &[String], ranked: &[ScoredArticle]) -> Vec<Citation> {
    pmids
        .iter()
        .map(|pmid| {
            let relevance = ranked
                .iter()
                .find(|scored| scored.article.pmid == *pmid)
                .map(|scored| classify_score(scored.score))
                .unwrap_or(Relevance::Medium);
            Citation {
                pmid: pmid.clone(),
                relevance,
            }
        })
        .collect()
}
