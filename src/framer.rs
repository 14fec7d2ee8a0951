//! Question framing: the full pipeline from a patient query to a
//! citation-backed answer. Plans the search, ranks the retrieved
//! articles, prompts the model with the top-ranked links only, gates the
//! reply on citations, and records token spend.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::citations::{self, Citation};
use crate::openai::client::{ChatModel, OpenAiError};
use crate::openai::types::Message;
use crate::plan::{self, PlanOutcome, SearchStep};
use crate::pubmed::article_url;
use crate::pubmed::client::{PubmedSearch, PubmedSummaries};
use crate::query::Query;
use crate::scoring::{self, ScoredArticle, marker};
use crate::usage::{UsageLedger, UsageRecord};

/// Only the top-ranked articles are handed to generation; everything
/// below the cut never reaches a paid call.
pub const ARTICLE_LIMIT: usize = scoring::DEFAULT_LIMIT;

pub const DISCLAIMER: &str = "askdoc is an exploration tool, not a medical device. The questions \
it generates are conversation starters drawn from published literature; they are not medical \
advice, diagnoses, or treatment recommendations. Always consult a qualified clinician.";

const SYSTEM_PROMPT: &str = "You are a careful and concise medical assistant. Use only the \
user's symptoms, known conditions, and the provided PubMed articles to generate medically \
relevant questions to ask a doctor. Only include questions that can be directly supported by \
one of the PubMed articles. Format each question in Markdown, with a clickable \
[PubMed Article](https://...) link inline. Do not provide medical advice or diagnoses.";

/// Every way a framing request can end. Outcomes are data, not errors,
/// so the caller can render distinct guidance for each.
#[derive(Debug)]
pub enum Framing {
    Answered(Answer),
    /// No query-plan step returned results. Not a system fault.
    NoResults,
    /// The model replied but cited nothing verifiable.
    NoCitation,
    /// Transport or service error on the paid generation call. Not
    /// retried here; surfaced verbatim for the caller to decide.
    GenerationFailed(OpenAiError),
}

#[derive(Debug)]
pub struct Answer {
    pub html: String,
    pub plaintext: String,
    pub disclaimer: String,
    pub citations: Vec<Citation>,
    pub usage: UsageRecord,
}

pub async fn frame_questions(
    search: &impl PubmedSearch,
    summaries: &impl PubmedSummaries,
    llm: &impl ChatModel,
    ledger: &UsageLedger,
    query: &Query,
) -> Framing {
    let steps = plan::build_plan(query);
    let (step, pmids) = match plan::run_plan(search, &steps).await {
        PlanOutcome::Hit { step, pmids } => (step, pmids),
        PlanOutcome::Exhausted => {
            info!("search plan exhausted with no results");
            return Framing::NoResults;
        }
    };

    let articles = match summaries.summaries(&pmids).await {
        Ok(articles) if !articles.is_empty() => articles,
        Ok(_) => {
            warn!("no metadata retrievable for matched PMIDs");
            return Framing::NoResults;
        }
        Err(e) => {
            warn!(error = %e, "metadata fetch failed");
            return Framing::NoResults;
        }
    };

    let ranking = scoring::filter_top(&articles, query, ARTICLE_LIMIT);
    if ranking.truncated {
        info!(
            total = articles.len(),
            kept = ranking.articles.len(),
            "ranking truncated the candidate set"
        );
    }

    let user_prompt = build_user_prompt(query, pmids.len(), &ranking.articles);
    let messages = [
        Message::system(SYSTEM_PROMPT),
        Message::user(user_prompt.clone()),
    ];

    let reply = match llm.complete(&messages).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "generation call failed");
            return Framing::GenerationFailed(e);
        }
    };

    let check = citations::validate(&reply);
    if !check.accepted {
        info!("generated text carried no PubMed citation, rejecting");
        return Framing::NoCitation;
    }
    let cited = citations::annotate(&check.pmids, &ranking.articles);

    let mut metadata = BTreeMap::new();
    metadata.insert("symptoms".to_string(), query.symptoms.join(", "));
    metadata.insert("conditions".to_string(), query.conditions.join(", "));
    let usage = ledger.record(&user_prompt, &reply, llm.model(), metadata);

    Framing::Answered(assemble(query, &step, &reply, cited, ranking.truncated, usage))
}

fn build_user_prompt(query: &Query, candidate_count: usize, ranked: &[ScoredArticle]) -> String {
    let links: Vec<String> = ranked
        .iter()
        .map(|scored| format!("- {}", article_url(&scored.article.pmid)))
        .collect();
    format!(
        "Symptoms: {}\n\
         Known Conditions: {}\n\
         PubMed Articles: {} recent results\n\
         Relevant PubMed Articles (with full links):\n{}\n\n\
         Please suggest possible questions to ask a doctor, and include the full clickable \
         PubMed links for each citation in your response.",
        query.symptoms.join(", "),
        query.conditions.join(", "),
        candidate_count,
        links.join("\n"),
    )
}

fn assemble(
    query: &Query,
    step: &SearchStep,
    reply: &str,
    citations: Vec<Citation>,
    truncated: bool,
    usage: UsageRecord,
) -> Answer {
    let cited_note = citations
        .iter()
        .map(|c| format!("{} {}", c.pmid, marker(c.relevance)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut html = format!(
        "<p><strong>Note:</strong> Questions below were generated using the combination \
         <code>{}</code> + <code>{}</code>. You may try removing one or both to explore \
         other patterns.</p>\n{}\n<br><br><strong>Referenced PMIDs:</strong><br>{}",
        step.symptoms.join(", "),
        step.conditions.join(", "),
        reply,
        cited_note,
    );
    if truncated {
        html.push_str(
            "\n<p><em>Only the most relevant articles were used to reduce token cost.</em></p>",
        );
    }

    let mut plaintext = format!(
        "Better Questions - Generated for: {} + {}\n\n{}\n\nReferenced PMIDs: {}",
        query.symptoms.join(", "),
        query.conditions.join(", "),
        reply,
        citations
            .iter()
            .map(|c| c.pmid.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    );
    if truncated {
        plaintext.push_str("\n(Only the most relevant articles were used to reduce token cost.)");
    }

    Answer {
        html,
        plaintext,
        disclaimer: DISCLAIMER.to_string(),
        citations,
        usage,
    }
}
