use serde::{Deserialize, Serialize};

// ── Fetched page ──────────────────────────────────────────────────────────────

/// HTML body of a page that passed the content-type check.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    pub url: String,
    pub content_type: String,
    pub html: String,
}

// ── Article row ───────────────────────────────────────────────────────────────

/// One row of the article ledger. Column order is the CSV header order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ArticleRecord {
    pub url: String,
    pub source_site: String,
    pub domain: String,
    pub published_date: Option<String>,
    pub year: Option<i32>,
    pub headline: Option<String>,
    pub body_text: String,
    pub word_count: usize,
    pub paragraph_count: usize,

    #[serde(default, with = "json_cell")]
    pub loanwords: Vec<String>,
    #[serde(default, with = "json_cell")]
    pub all_loanwords: Vec<String>,
    #[serde(default, with = "json_cell")]
    pub top_loanwords: Vec<String>,
    #[serde(default)]
    pub loanword_count: usize,
    #[serde(default)]
    pub loanword_density: f64,
    #[serde(default)]
    pub sentiment: Option<String>,

    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub loanword_context: Option<String>,
    #[serde(default)]
    pub marketing_loanwords: Option<String>,
    #[serde(default)]
    pub country_influence: Option<String>,
}

impl ArticleRecord {
    /// Merge the fields an enricher produced. Fields it left empty keep their
    /// current value.
    pub fn apply(&mut self, e: Enrichment) {
        if let Some(stats) = e.loanwords {
            self.loanwords = stats.loanwords;
            self.all_loanwords = stats.all_loanwords;
            self.top_loanwords = stats.top_loanwords;
            self.loanword_count = stats.count;
            self.loanword_density = stats.density;
        }
        merge(&mut self.sentiment, e.sentiment);
        merge(&mut self.tone, e.tone);
        merge(&mut self.topic, e.topic);
        merge(&mut self.summary, e.summary);
        merge(&mut self.loanword_context, e.loanword_context);
        merge(&mut self.marketing_loanwords, e.marketing_loanwords);
        merge(&mut self.country_influence, e.country_influence);
    }
}

fn merge(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

// ── Enrichment output ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoanwordStats {
    /// Every hit, in text order, lower-cased.
    pub loanwords: Vec<String>,
    /// Distinct hits in first-occurrence order.
    pub all_loanwords: Vec<String>,
    pub top_loanwords: Vec<String>,
    pub count: usize,
    pub density: f64,
}

/// Field updates produced by one enricher.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Enrichment {
    pub loanwords: Option<LoanwordStats>,
    pub sentiment: Option<String>,
    pub tone: Option<String>,
    pub topic: Option<String>,
    pub summary: Option<String>,
    pub loanword_context: Option<String>,
    pub marketing_loanwords: Option<String>,
    pub country_influence: Option<String>,
}

// ── Second-pass rows ──────────────────────────────────────────────────────────

/// Row of the LLM enrichment checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnnotationRecord {
    pub url: String,
    pub tone: Option<String>,
    pub topic: Option<String>,
    pub summary: Option<String>,
    pub loanword_context: Option<String>,
    pub marketing_loanwords: Option<String>,
    pub country_influence: Option<String>,
    #[serde(default, with = "json_cell")]
    pub excluded_loanwords: Vec<String>,
}

/// Row of the batch sentiment output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentRecord {
    pub url: String,
    pub sentiment: String,
}

// ── CSV cell encoding for lists ───────────────────────────────────────────────

/// CSV records are flat, so lists travel as a JSON array inside one cell.
mod json_cell {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[String], s: S) -> Result<S::Ok, S::Error> {
        let text = serde_json::to_string(items).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let text = String::deserialize(d)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(serde::de::Error::custom)
    }
}
