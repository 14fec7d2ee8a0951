/// Upstream cap on symptom/condition terms per request.
pub const MAX_TERMS: usize = 3;

/// A normalized patient query: reported symptoms plus any known conditions.
/// Immutable once constructed; both lists are trimmed, lowercased,
/// deduplicated, and capped at [`MAX_TERMS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub symptoms: Vec<String>,
    pub conditions: Vec<String>,
}

impl Query {
    pub fn new(symptoms: Vec<String>, conditions: Vec<String>) -> Self {
        Self {
            symptoms: normalize_terms(symptoms),
            conditions: normalize_terms(conditions),
        }
    }
}

fn normalize_terms(raw: Vec<String>) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in raw {
        let term = term.trim().to_lowercase();
        if !term.is_empty() && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms.truncate(MAX_TERMS);
    terms
}
