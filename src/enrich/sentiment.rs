use super::Enricher;
use crate::error::ClassifierError;
use crate::models::Enrichment;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const UNKNOWN: &str = "unknown";

/// Opaque text classifier returning a label per input.
#[async_trait]
pub trait SentimentModel: Send + Sync {
    async fn classify(&self, text: &str) -> Result<String, ClassifierError>;

    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<String>, ClassifierError> {
        let mut labels = Vec::with_capacity(texts.len());
        for t in texts {
            labels.push(self.classify(t).await?);
        }
        Ok(labels)
    }
}

// ── HTTP model ────────────────────────────────────────────────────────────────

/// Text-classification server speaking the `{"inputs": …}` protocol
/// (HuggingFace inference / TEI style).
pub struct HttpSentimentModel {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSentimentModel {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn post(&self, inputs: Value) -> Result<Value, ClassifierError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "inputs": inputs }))
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClassifierError::Request(format!("HTTP {}", status)));
        }
        resp.json()
            .await
            .map_err(|e| ClassifierError::Response(e.to_string()))
    }
}

#[async_trait]
impl SentimentModel for HttpSentimentModel {
    async fn classify(&self, text: &str) -> Result<String, ClassifierError> {
        let body = self.post(json!(text)).await?;
        let mut labels = parse_labels(&body, 1)?;
        labels.pop().ok_or_else(|| ClassifierError::Response("empty".into()))
    }

    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<String>, ClassifierError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = self.post(json!(texts)).await?;
        parse_labels(&body, texts.len())
    }
}

/// Accepts `[{label, score}]` per input, or one bare object per input.
pub fn parse_labels(body: &Value, expected: usize) -> Result<Vec<String>, ClassifierError> {
    let items = body
        .as_array()
        .ok_or_else(|| ClassifierError::Response(body.to_string()))?;

    // One input answered with a flat list of scored labels.
    if expected == 1 && items.len() > 1 && items.iter().all(Value::is_object) {
        return best_label(items).map(|l| vec![l]);
    }

    let labels = items
        .iter()
        .map(|item| match item {
            Value::Object(_) => label_of(item),
            Value::Array(scored) => best_label(scored),
            other => Err(ClassifierError::Response(other.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if labels.len() != expected {
        return Err(ClassifierError::Response(format!(
            "expected {} labels, got {}",
            expected,
            labels.len()
        )));
    }
    Ok(labels)
}

fn label_of(item: &Value) -> Result<String, ClassifierError> {
    item.get("label")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClassifierError::Response(item.to_string()))
}

fn best_label(scored: &[Value]) -> Result<String, ClassifierError> {
    let score = |v: &Value| v.get("score").and_then(Value::as_f64).unwrap_or(0.0);
    scored
        .iter()
        .max_by(|a, b| score(a).total_cmp(&score(b)))
        .ok_or_else(|| ClassifierError::Response("no labels".into()))
        .and_then(label_of)
}

// ── Enricher ──────────────────────────────────────────────────────────────────

pub struct SentimentClassifier {
    model: Arc<dyn SentimentModel>,
    char_budget: usize,
}

impl SentimentClassifier {
    pub fn new(model: Arc<dyn SentimentModel>, char_budget: usize) -> Self {
        Self { model, char_budget }
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.char_budget) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }

    /// Lower-cased label, or `"unknown"` when the model fails.
    pub async fn label(&self, text: &str) -> String {
        match self.model.classify(self.truncate(text)).await {
            Ok(label) => label.to_lowercase(),
            Err(e) => {
                warn!(error = %e, "Sentiment analysis failed");
                UNKNOWN.to_string()
            }
        }
    }

    /// One label per text; a failed batch is `"unknown"` throughout.
    pub async fn label_batch(&self, texts: &[String]) -> Vec<String> {
        let truncated: Vec<String> = texts.iter().map(|t| self.truncate(t).to_string()).collect();
        match self.model.classify_batch(&truncated).await {
            Ok(labels) => labels.into_iter().map(|l| l.to_lowercase()).collect(),
            Err(e) => {
                warn!(error = %e, size = texts.len(), "Sentiment batch failed");
                vec![UNKNOWN.to_string(); texts.len()]
            }
        }
    }
}

#[async_trait]
impl Enricher for SentimentClassifier {
    fn name(&self) -> &'static str {
        "sentiment"
    }

    async fn enrich(&self, text: &str) -> Enrichment {
        let label = self.label(text).await;
        debug!(label = %label, "sentiment");
        Enrichment {
            sentiment: Some(label),
            ..Default::default()
        }
    }
}
