//! Token and cost accounting for generation calls: running totals for
//! budget observability plus a durable append-only CSV log.

use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// USD per 1K tokens. Unknown models bill at the gpt-3.5-turbo rate.
fn price_per_k_tokens(model: &str) -> f64 {
    match model {
        "gpt-4o" => 0.005,
        "gpt-3.5-turbo" => 0.0005,
        _ => 0.0005,
    }
}

/// Model-specific token counting. Infallible: accounting must never
/// block the primary result, so implementations estimate when they
/// cannot count exactly.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str, model: &str) -> usize;
}

/// tiktoken-backed counter with a per-model BPE cache. Models tiktoken
/// does not know fall back to a chars/4 estimate with a warning.
pub struct TiktokenCounter {
    cache: Mutex<HashMap<String, Arc<CoreBPE>>>,
}

impl TiktokenCounter {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TiktokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str, model: &str) -> usize {
        let mut cache = lock(&self.cache);
        if let Some(bpe) = cache.get(model) {
            return bpe.encode_ordinary(text).len();
        }
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => {
                let bpe = Arc::new(bpe);
                let count = bpe.encode_ordinary(text).len();
                cache.insert(model.to_string(), bpe);
                count
            }
            Err(e) => {
                warn!(model, error = %e, "no tokenizer for model, using character estimate");
                text.chars().count() / 4
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    pub cost_usd: f64,
    pub metadata: BTreeMap<String, String>,
}

/// One CSV line; metadata rides along as a JSON column.
#[derive(Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    model: &'a str,
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
    cost_usd: f64,
    metadata: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSummary {
    pub total_queries: usize,
    pub total_tokens: usize,
    pub total_cost_usd: f64,
}

#[derive(Default)]
struct Totals {
    queries: usize,
    tokens: usize,
    cost_usd: f64,
}

/// Process-lifetime accumulator for generation spend. Appends are
/// serialized through the totals lock; the CSV sink is append-only with
/// a header row on first creation.
pub struct UsageLedger {
    counter: Box<dyn TokenCounter>,
    log_path: PathBuf,
    totals: Mutex<Totals>,
}

impl UsageLedger {
    pub fn new(counter: Box<dyn TokenCounter>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            counter,
            log_path: log_path.into(),
            totals: Mutex::new(Totals::default()),
        }
    }

    /// Counts tokens for one prompt/response pair, accumulates totals,
    /// and appends to the log. A failed log write is warned about, never
    /// propagated.
    pub fn record(
        &self,
        prompt: &str,
        response: &str,
        model: &str,
        metadata: BTreeMap<String, String>,
    ) -> UsageRecord {
        let prompt_tokens = self.counter.count(prompt, model);
        let completion_tokens = self.counter.count(response, model);
        let total_tokens = prompt_tokens + completion_tokens;
        let cost_usd = round_usd(total_tokens as f64 / 1000.0 * price_per_k_tokens(model));

        {
            let mut totals = lock(&self.totals);
            totals.queries += 1;
            totals.tokens += total_tokens;
            totals.cost_usd += cost_usd;
        }

        let record = UsageRecord {
            timestamp: Utc::now(),
            model: model.to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cost_usd,
            metadata,
        };

        if let Err(e) = self.append(&record) {
            warn!(error = %e, path = %self.log_path.display(), "failed to append usage log");
        }
        record
    }

    fn append(&self, record: &UsageRecord) -> Result<(), csv::Error> {
        let is_new = !self.log_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(CsvRow {
            timestamp: record.timestamp.to_rfc3339(),
            model: &record.model,
            prompt_tokens: record.prompt_tokens,
            completion_tokens: record.completion_tokens,
            total_tokens: record.total_tokens,
            cost_usd: record.cost_usd,
            metadata: serde_json::to_string(&record.metadata).unwrap_or_default(),
        })?;
        writer.flush()?;
        Ok(())
    }

    pub fn summary(&self) -> UsageSummary {
        let totals = lock(&self.totals);
        UsageSummary {
            total_queries: totals.queries,
            total_tokens: totals.tokens,
            total_cost_usd: round_usd(totals.cost_usd),
        }
    }

    /// Clears running totals. The CSV log is append-only and untouched.
    #[cfg(test)]
    pub(crate) fn reset(&self) {
        *lock(&self.totals) = Totals::default();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn round_usd(cost: f64) -> f64 {
    (cost * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts one token per byte, making the arithmetic transparent.
    struct ByteCounter;

    impl TokenCounter for ByteCounter {
        fn count(&self, text: &str, _model: &str) -> usize {
            text.len()
        }
    }

    fn ledger(dir: &tempfile::TempDir) -> UsageLedger {
        UsageLedger::new(Box::new(ByteCounter), dir.path().join("usage.csv"))
    }

    #[test]
    fn record_computes_tokens_and_cost() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);

        let record = ledger.record("aaaa", "bb", "gpt-4o", BTreeMap::new());

        assert_eq!(record.prompt_tokens, 4);
        assert_eq!(record.completion_tokens, 2);
        assert_eq!(record.total_tokens, 6);
        assert_eq!(record.cost_usd, 0.00003);
    }

    #[test]
    fn unknown_model_bills_at_fallback_price() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);

        let record = ledger.record("a".repeat(1000).as_str(), "", "mystery-model", BTreeMap::new());
        assert_eq!(record.cost_usd, 0.0005);
    }

    #[test]
    fn totals_accumulate_across_records() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);

        ledger.record("aaaa", "bb", "gpt-3.5-turbo", BTreeMap::new());
        ledger.record("cc", "d", "gpt-3.5-turbo", BTreeMap::new());

        let summary = ledger.summary();
        assert_eq!(summary.total_queries, 2);
        assert_eq!(summary.total_tokens, 9);
        assert!(summary.total_cost_usd > 0.0);
    }

    #[test]
    fn reset_clears_totals_but_keeps_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        ledger.record("aaaa", "bb", "gpt-3.5-turbo", BTreeMap::new());

        ledger.reset();

        assert_eq!(ledger.summary().total_queries, 0);
        let log = std::fs::read_to_string(dir.path().join("usage.csv")).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn csv_header_written_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);

        let mut metadata = BTreeMap::new();
        metadata.insert("symptoms".to_string(), "fatigue".to_string());
        ledger.record("aaaa", "bb", "gpt-3.5-turbo", metadata);
        ledger.record("cc", "d", "gpt-3.5-turbo", BTreeMap::new());

        let log = std::fs::read_to_string(dir.path().join("usage.csv")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,model,prompt_tokens"));
        assert!(!lines[1].starts_with("timestamp"));
        assert!(lines[1].contains("fatigue"));
    }

    #[test]
    fn tiktoken_counter_counts_known_models() {
        let counter = TiktokenCounter::new();
        let count = counter.count("hello world, this is a token count", "gpt-3.5-turbo");
        assert!(count > 0);
        // Deterministic across calls (and exercises the cache path).
        assert_eq!(
            count,
            counter.count("hello world, this is a token count", "gpt-3.5-turbo")
        );
    }

    #[test]
    fn tiktoken_counter_estimates_for_unknown_models() {
        let counter = TiktokenCounter::new();
        assert_eq!(counter.count("aaaaaaaa", "definitely-not-a-model"), 2);
    }
}
