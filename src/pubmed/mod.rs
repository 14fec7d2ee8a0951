//! PubMed E-utilities collaborators: article-ID search (esearch) and
//! batch metadata retrieval (efetch).

pub(crate) mod client;
mod parse;
mod types;

pub use types::{Article, DEFAULT_PUB_YEAR};

/// Canonical article link base. Citation detection is literal substring
/// matching on this URL form, so prompt links and the citation gate must
/// both go through it.
pub const ARTICLE_URL_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov";

pub fn article_url(pmid: &str) -> String {
    format!("{ARTICLE_URL_BASE}/{pmid}")
}
