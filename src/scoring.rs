//! Article relevance scoring and top-N ranking.
//!
//! Scores are a fixed weighted sum of keyword and tone signals, not a
//! learned model; the keyword sets below are the contract.

use std::sync::LazyLock;

use regex::Regex;

use crate::pubmed::Article;
use crate::query::Query;

/// Novelty / clinician-awareness language. Checked before [`ESTABLISHED`];
/// exactly one of novelty, established, or the neutral default applies.
static NOVELTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"novel|unexpected|first report|rare|underdiagnosed").expect("valid regex")
});
static ESTABLISHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"known|typical|well-established|commonly seen").expect("valid regex")
});
static ACTIONABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"treatment|diagnosis|management|intervention|outcome").expect("valid regex")
});
static EVIDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"results|analysis|significant|trial|study").expect("valid regex")
});
static HUMAN_CENTERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"patients?|case study|quality of life|symptoms?").expect("valid regex")
});

/// Composite relevance score for one article against one query.
/// Pure and deterministic; missing fields degrade to neutral defaults.
///
/// The recency bonus is linear from 2015 with no upper cap: articles
/// dated past 2025 keep accruing it. Intentional, matches the scoring
/// contract.
pub fn score_article(article: &Article, query: &Query) -> f64 {
    let title = article.title.to_lowercase();
    let abstract_text = article.abstract_text.to_lowercase();
    let text = format!("{title} {abstract_text}");

    let mut score = 0.0;

    // Keyword match density across both term lists.
    let matches = query
        .symptoms
        .iter()
        .chain(&query.conditions)
        .filter(|term| text.contains(term.to_lowercase().as_str()))
        .count();
    score += matches as f64 * 1.5;

    // Cross-domain overlap: at least one symptom AND one condition hit.
    let any_symptom = query
        .symptoms
        .iter()
        .any(|s| text.contains(s.to_lowercase().as_str()));
    let any_condition = query
        .conditions
        .iter()
        .any(|c| text.contains(c.to_lowercase().as_str()));
    if any_symptom && any_condition {
        score += 2.5;
    }

    // Novelty signal, mutually exclusive branches in priority order.
    score += if NOVELTY.is_match(&abstract_text) {
        2.5
    } else if ESTABLISHED.is_match(&abstract_text) {
        0.5
    } else {
        1.5
    };

    if ACTIONABLE.is_match(&abstract_text) {
        score += 2.0;
    }

    // Evidence strength: length and results-language may both apply.
    if abstract_text.split_whitespace().count() > 100 {
        score += 1.0;
    }
    if EVIDENCE.is_match(&abstract_text) {
        score += 1.0;
    }

    if HUMAN_CENTERED.is_match(&abstract_text) {
        score += 1.0;
    }

    score += ((article.year - 2015) as f64 * 0.3).max(0.0);

    (score * 100.0).round() / 100.0
}

/// Categorical relevance bucket, presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    High,
    Medium,
    Low,
}

const HIGH_THRESHOLD: f64 = 9.0;
const MEDIUM_THRESHOLD: f64 = 5.0;

pub fn classify_score(score: f64) -> Relevance {
    if score >= HIGH_THRESHOLD {
        Relevance::High
    } else if score >= MEDIUM_THRESHOLD {
        Relevance::Medium
    } else {
        Relevance::Low
    }
}

/// Presentation marker for a relevance bucket.
pub fn marker(relevance: Relevance) -> &'static str {
    match relevance {
        Relevance::High => "🟢",
        Relevance::Medium => "🟡",
        Relevance::Low => "🔴",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredArticle {
    pub article: Article,
    pub score: f64,
}

/// Result of ranking: the top articles plus whether any were dropped.
#[derive(Debug, PartialEq)]
pub struct Ranking {
    pub articles: Vec<ScoredArticle>,
    pub truncated: bool,
}

pub const DEFAULT_LIMIT: usize = 10;

/// Scores every article, sorts descending (stable, ties keep input
/// order), and truncates to `limit`. Never fails; empty in, empty out.
pub fn filter_top(articles: &[Article], query: &Query, limit: usize) -> Ranking {
    let mut scored: Vec<ScoredArticle> = articles
        .iter()
        .map(|article| ScoredArticle {
            article: article.clone(),
            score: score_article(article, query),
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let truncated = scored.len() > limit;
    scored.truncate(limit);
    Ranking {
        articles: scored,
        truncated,
    }
}
