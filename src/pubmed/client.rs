use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::parse::parse_efetch;
use super::types::{Article, EsearchResponse};

const API_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Upper bound on IDs returned per search step.
const MAX_RESULTS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum PubmedError {
    #[error("PubMed rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("PubMed request failed: HTTP {0}")]
    Status(u16),

    #[error("malformed PubMed response: {0}")]
    Malformed(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Article-ID search against the external index.
/// Implemented by `PubmedClient` for production; mock implementations used in tests.
pub trait PubmedSearch {
    async fn search(&self, term: &str) -> Result<Vec<String>, PubmedError>;
}

/// Batch metadata retrieval for a list of article IDs. IDs with no
/// retrievable record are silently omitted from the result.
pub trait PubmedSummaries {
    async fn summaries(&self, pmids: &[String]) -> Result<Vec<Article>, PubmedError>;
}

#[derive(Clone)]
pub struct PubmedClient {
    http: Client,
    base_url: String,
}

impl PubmedClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }

    async fn get(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, PubmedError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(params)
            .header("User-Agent", crate::USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("PubMed rate limited");
            return Err(PubmedError::RateLimited);
        }
        if !status.is_success() {
            warn!(status = %status, path, "PubMed request failed");
            return Err(PubmedError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

impl PubmedSearch for PubmedClient {
    async fn search(&self, term: &str) -> Result<Vec<String>, PubmedError> {
        let retmax = MAX_RESULTS.to_string();
        let response = self
            .get(
                "esearch.fcgi",
                &[
                    ("db", "pubmed"),
                    ("term", term),
                    ("retmode", "json"),
                    ("retmax", &retmax),
                ],
            )
            .await?;

        let body: EsearchResponse = response.json().await?;
        let pmids = body.esearchresult.map(|r| r.idlist).unwrap_or_default();
        debug!(term, hits = pmids.len(), "esearch complete");
        Ok(pmids)
    }
}

impl PubmedSummaries for PubmedClient {
    async fn summaries(&self, pmids: &[String]) -> Result<Vec<Article>, PubmedError> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = pmids.join(",");
        let response = self
            .get(
                "efetch.fcgi",
                &[("db", "pubmed"), ("id", &ids), ("retmode", "xml")],
            )
            .await?;

        let xml = response.text().await?;
        let articles = parse_efetch(&xml).map_err(|e| PubmedError::Malformed(e.to_string()))?;
        if articles.len() < pmids.len() {
            warn!(
                requested = pmids.len(),
                returned = articles.len(),
                "some PMIDs had no retrievable record"
            );
        }
        debug!(count = articles.len(), "efetch complete");
        Ok(articles)
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn search_returns_ordered_id_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("db", "pubmed"))
            .and(query_param("term", "(fatigue) AND (anemia)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": { "idlist": ["111", "222"] }
            })))
            .mount(&server)
            .await;

        let client = PubmedClient::with_base_url(Client::new(), &server.uri());
        let pmids = client.search("(fatigue) AND (anemia)").await.unwrap();
        assert_eq!(pmids, ids(&["111", "222"]));
    }

    #[tokio::test]
    async fn search_without_result_block_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = PubmedClient::with_base_url(Client::new(), &server.uri());
        assert!(client.search("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = PubmedClient::with_base_url(Client::new(), &server.uri());
        assert!(matches!(
            client.search("x").await,
            Err(PubmedError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn search_500_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = PubmedClient::with_base_url(Client::new(), &server.uri());
        assert!(matches!(
            client.search("x").await,
            Err(PubmedError::Status(500))
        ));
    }

    #[tokio::test]
    async fn summaries_parses_efetch_xml() {
        let xml = r#"<PubmedArticleSet><PubmedArticle><MedlineCitation>
            <PMID>111</PMID>
            <Article>
              <Journal><JournalIssue><PubDate><Year>2021</Year></PubDate></JournalIssue></Journal>
              <ArticleTitle>Fatigue in anemia</ArticleTitle>
              <Abstract><AbstractText>A novel presentation.</AbstractText></Abstract>
            </Article>
            </MedlineCitation></PubmedArticle></PubmedArticleSet>"#;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .and(query_param("id", "111,222"))
            .respond_with(ResponseTemplate::new(200).set_body_string(xml))
            .mount(&server)
            .await;

        let client = PubmedClient::with_base_url(Client::new(), &server.uri());
        let articles = client.summaries(&ids(&["111", "222"])).await.unwrap();

        // 222 had no record and is silently omitted.
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].pmid, "111");
        assert_eq!(articles[0].title, "Fatigue in anemia");
        assert_eq!(articles[0].year, 2021);
    }

    #[tokio::test]
    async fn summaries_with_no_ids_skips_the_request() {
        // No mock mounted: any request would fail the test.
        let client = PubmedClient::with_base_url(Client::new(), "http://127.0.0.1:9");
        assert!(client.summaries(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summaries_500_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = PubmedClient::with_base_url(Client::new(), &server.uri());
        assert!(matches!(
            client.summaries(&ids(&["111"])).await,
            Err(PubmedError::Status(500))
        ));
    }
}
