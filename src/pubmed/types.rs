use serde::Deserialize;

/// Sentinel publication year when efetch gives no usable date; keeps the
/// recency score well-defined.
pub const DEFAULT_PUB_YEAR: i32 = 2020;

/// One retrieved PubMed article. Produced fresh per request and discarded
/// once the answer is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    pub abstract_text: String,
    pub year: i32,
}

#[derive(Debug, Deserialize)]
pub struct EsearchResponse {
    pub esearchresult: Option<EsearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct EsearchResult {
    #[serde(default)]
    pub idlist: Vec<String>,
}
