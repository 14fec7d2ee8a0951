use quick_xml::Reader;
use quick_xml::events::Event;

use super::types::{Article, DEFAULT_PUB_YEAR};

#[derive(Default)]
struct Partial {
    pmid: String,
    title: String,
    abstract_parts: Vec<String>,
    year: Option<i32>,
}

impl Partial {
    fn finish(self) -> Article {
        Article {
            pmid: self.pmid,
            title: self.title,
            abstract_text: self.abstract_parts.join(" "),
            year: self.year.unwrap_or(DEFAULT_PUB_YEAR),
        }
    }
}

/// Pull-parses an efetch `PubmedArticleSet` document into [`Article`]
/// records. Records without a PMID are dropped; a missing or unparseable
/// publication date falls back to [`DEFAULT_PUB_YEAR`].
pub fn parse_efetch(xml: &str) -> Result<Vec<Article>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut articles = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<Partial> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "PubmedArticle" {
                    current = Some(Partial::default());
                }
                stack.push(name);
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                if name == "PubmedArticle"
                    && let Some(partial) = current.take()
                    && !partial.pmid.is_empty()
                {
                    articles.push(partial.finish());
                }
            }
            Event::Text(t) => {
                let Some(partial) = current.as_mut() else {
                    continue;
                };
                let text = t.unescape()?;
                let in_path = |tag: &str| stack.iter().any(|s| s == tag);
                match stack.last().map(String::as_str) {
                    // The article's own PMID sits under MedlineCitation;
                    // referenced PMIDs (CommentsCorrections) must not win.
                    Some("PMID")
                        if partial.pmid.is_empty()
                            && in_path("MedlineCitation")
                            && !in_path("CommentsCorrections") =>
                    {
                        partial.pmid = text.trim().to_string();
                    }
                    Some("ArticleTitle") => partial.title.push_str(&text),
                    // Structured abstracts carry several labeled sections.
                    Some("AbstractText") if in_path("Abstract") => {
                        partial.abstract_parts.push(text.into_owned());
                    }
                    Some("Year") if partial.year.is_none() && in_path("PubDate") => {
                        partial.year = text.trim().parse().ok();
                    }
                    Some("MedlineDate") if partial.year.is_none() => {
                        partial.year = text.trim().get(..4).and_then(|y| y.parse().ok());
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(articles)
}
