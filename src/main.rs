mod citations;
mod framer;
mod openai;
mod plan;
mod pubmed;
mod query;
mod scoring;
mod usage;

pub const USER_AGENT: &str = concat!("askdoc/", env!("CARGO_PKG_VERSION"));

use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tracing::info;

use framer::Framing;
use openai::client::OpenAiClient;
use pubmed::client::PubmedClient;
use query::Query;
use usage::{TiktokenCounter, UsageLedger};

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering DNS + connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_USAGE_LOG: &str = "token_usage_log.csv";

/// Turns symptoms and known conditions into citation-backed questions to
/// ask a doctor, via PubMed search and LLM synthesis.
///
/// Configuration via environment variables (a `.env` file is honored):
/// - `OPENAI_API_KEY`: required for generation
/// - `OPENAI_MODEL`: generation model (default `gpt-3.5-turbo`)
/// - `OPENAI_MAX_TOKENS`: per-call completion budget (default 700)
/// - `OPENAI_TIMEOUT_SECS`: generation call timeout (default 60)
/// - `ASKDOC_USAGE_LOG`: token-usage CSV path (default `token_usage_log.csv`)
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Symptoms, comma-separated (up to 3 are used)
    #[arg(long, value_delimiter = ',', required = true)]
    symptoms: Vec<String>,

    /// Known diagnoses, comma-separated (up to 3 are used)
    #[arg(long, value_delimiter = ',')]
    conditions: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("askdoc=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let query = Query::new(cli.symptoms, cli.conditions);
    if query.symptoms.is_empty() {
        eprintln!("At least one symptom is required.");
        std::process::exit(2);
    }

    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()?;
    let pubmed = PubmedClient::new(http.clone());
    let mut llm = OpenAiClient::from_env(http)?;
    if let Some(max_tokens) = env_parse("OPENAI_MAX_TOKENS") {
        llm = llm.with_max_tokens(max_tokens);
    }
    if let Some(secs) = env_parse("OPENAI_TIMEOUT_SECS") {
        llm = llm.with_timeout(Duration::from_secs(secs));
    }
    let log_path =
        std::env::var("ASKDOC_USAGE_LOG").unwrap_or_else(|_| DEFAULT_USAGE_LOG.to_string());
    let ledger = UsageLedger::new(Box::new(TiktokenCounter::new()), log_path);

    info!(symptoms = ?query.symptoms, conditions = ?query.conditions, "framing questions");
    match framer::frame_questions(&pubmed, &pubmed, &llm, &ledger, &query).await {
        Framing::Answered(answer) => {
            println!("{}\n", answer.plaintext);
            println!("{}", answer.disclaimer);
        }
        Framing::NoResults => {
            println!(
                "No PubMed results matched any combination of your symptoms and conditions. \
                 Try broader or alternative terms.\n\n{}",
                framer::DISCLAIMER
            );
        }
        Framing::NoCitation => {
            println!(
                "No citation-backed questions could be generated from recent PubMed data. \
                 Try again, or adjust your terms.\n\n{}",
                framer::DISCLAIMER
            );
        }
        Framing::GenerationFailed(e) => {
            eprintln!("Question generation failed: {e}");
            std::process::exit(1);
        }
    }

    let summary = ledger.summary();
    info!(
        queries = summary.total_queries,
        tokens = summary.total_tokens,
        cost_usd = summary.total_cost_usd,
        "usage summary"
    );
    Ok(())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
