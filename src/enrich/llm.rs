//! Annotations from a local chat model.
//!
//! Every annotation is a separate prompt. Each prompt is retried on a fixed
//! interval; when the attempts run out the field gets the `"error"` sentinel
//! and the remaining annotations still run.

use super::Enricher;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::models::Enrichment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, error, warn};

pub const LLM_ERROR: &str = "error";

// ── Chat backend ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// Text in, text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Ollama's `/api/chat` endpoint, non-streaming.
pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/api/chat", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = OllamaRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::Request(format!("HTTP {}", status)));
        }
        let parsed: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Response(e.to_string()))?;
        Ok(parsed.message.content.trim().to_string())
    }
}

// ── Retrying client ───────────────────────────────────────────────────────────

pub struct LlmClient {
    model: Arc<dyn ChatModel>,
    system: Option<String>,
    attempts: u32,
    retry_delay: Duration,
}

impl LlmClient {
    pub fn new(
        model: Arc<dyn ChatModel>,
        system: Option<String>,
        attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            model,
            system,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(model: Arc<dyn ChatModel>, config: &LlmConfig) -> Self {
        Self::new(
            model,
            config.system_prompt.clone(),
            config.retries,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// Ask once per attempt until one succeeds.
    pub async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user(prompt));

        let strategy = FixedInterval::new(self.retry_delay).take(self.attempts as usize - 1);
        let counter = AtomicU32::new(0);
        let (model, messages, counter) = (self.model.as_ref(), &messages, &counter);
        let t0 = Instant::now();

        let res = Retry::spawn(strategy, move || async move {
            let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
            model.chat(messages).await.inspect_err(|e| {
                warn!(attempt, error = %e, "Chat request failed");
            })
        })
        .await;

        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, ok = res.is_ok(), "ask");
        res
    }

    /// `ask`, with exhaustion mapped to the `"error"` sentinel.
    pub async fn ask_or_sentinel(&self, prompt: &str) -> String {
        match self.ask(prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "Chat retries exhausted");
                LLM_ERROR.to_string()
            }
        }
    }
}

// ── Annotations ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    Tone,
    Topic,
    Summary,
    LoanwordContext,
    MarketingLoanwords,
    CountryInfluence,
}

impl Annotation {
    pub const ALL: [Annotation; 6] = [
        Annotation::Tone,
        Annotation::Topic,
        Annotation::Summary,
        Annotation::LoanwordContext,
        Annotation::MarketingLoanwords,
        Annotation::CountryInfluence,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Annotation::Tone => "tone",
            Annotation::Topic => "topic",
            Annotation::Summary => "summary",
            Annotation::LoanwordContext => "loanword_context",
            Annotation::MarketingLoanwords => "marketing_loanwords",
            Annotation::CountryInfluence => "country_influence",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name.trim())
    }

    pub fn prompt(self, text: &str) -> String {
        match self {
            Annotation::Tone => format!(
                "Is the following article written in a formal or informal tone? \
                 Respond with only one word: 'formal' or 'informal'.\n\nText:\n{}",
                text
            ),
            Annotation::Topic => format!(
                "Classify the following article as one of the following categories: \
                 'business', 'technology', 'lifestyle', 'politics', 'culture'. \
                 Respond with only one word.\n\nText:\n{}",
                text
            ),
            Annotation::Summary => {
                format!("Summarise the German article in 2-3 sentences:\n\n{}", text)
            }
            Annotation::LoanwordContext => format!(
                "Why does this German article use English words? \
                 What might this say about the context or target audience?\n\n{}",
                text
            ),
            Annotation::MarketingLoanwords => format!(
                "Here is an article in German:\n\n{}\n\n\
                 Which of these English loanwords are used in a marketing or advertising context? \
                 Return a list.",
                text
            ),
            Annotation::CountryInfluence => format!(
                "Does this German article show cultural influence from any of the following \
                 influential countries: USA, China, Russia, India, France, Germany, UK, Japan, \
                 Saudi Arabia, Italy, Canada, Israel, Australia, Spain, South Korea, Turkey, \
                 Switzerland, Iran. If there is influence from more than one, respond with all \
                 relevant countries. If the influence comes from a country not on this list, name \
                 the specific country or countries explicitly. Provide your response in JSON \
                 format with two fields:\n\
                 1. \"countries\": a list of influenced countries\n\
                 2. \"reason\": a short explanation of the cultural influence observed\n\n{}",
                text
            ),
        }
    }

    /// Shape the raw answer into the stored value.
    pub fn normalise(self, answer: String) -> String {
        if answer == LLM_ERROR {
            return answer;
        }
        match self {
            Annotation::Tone | Annotation::Topic => one_word(&answer),
            Annotation::CountryInfluence => parse_country_influence(&answer).unwrap_or(answer),
            _ => answer.trim().to_string(),
        }
    }
}

/// Parse the names in a config list, dropping unknown ones.
pub fn parse_annotations(names: &[String]) -> Vec<Annotation> {
    names
        .iter()
        .filter_map(|n| {
            let a = Annotation::from_name(n);
            if a.is_none() {
                warn!(annotation = %n, "Unknown annotation ignored");
            }
            a
        })
        .collect()
}

fn one_word(answer: &str) -> String {
    answer
        .trim()
        .trim_matches(|c: char| c == '\'' || c == '"' || c == '.')
        .to_lowercase()
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CountryInfluence {
    pub countries: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

/// Pull the first `{…}` block out of the answer and re-emit it compactly.
pub fn parse_country_influence(answer: &str) -> Option<String> {
    let start = answer.find('{')?;
    let end = answer.rfind('}')?;
    if end <= start {
        return None;
    }
    let parsed: CountryInfluence = serde_json::from_str(&answer[start..=end]).ok()?;
    serde_json::to_string(&parsed).ok()
}

/// Boilerplate/brand terms the model flags among the detected loanwords.
pub async fn boilerplate_loanwords(client: &LlmClient, text: &str, loanwords: &[String]) -> Vec<String> {
    if loanwords.is_empty() {
        return Vec::new();
    }
    let prompt = format!(
        "Here is a German article and a list of English loanwords that appear in it:\n\n\
         Text: {}\n\nLoanwords: {}\n\n\
         Which of these words are likely to be generic UI or boilerplate terms such as \
         'footer', 'ticker', 'tracking', or brand names and social media platforms that \
         should not be considered true loanwords? Return only a comma-separated list of \
         these words.",
        text,
        loanwords.join(", ")
    );
    let answer = client.ask_or_sentinel(&prompt).await;
    if answer == LLM_ERROR {
        return Vec::new();
    }
    parse_word_list(&answer)
}

pub fn parse_word_list(answer: &str) -> Vec<String> {
    answer
        .split([',', '\n'])
        .map(|w| {
            w.trim()
                .trim_matches(|c: char| matches!(c, '"' | '\'' | '[' | ']' | '-' | '*' | '.'))
                .trim()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

// ── Enricher ──────────────────────────────────────────────────────────────────

pub struct LlmAnnotator {
    client: LlmClient,
    annotations: Vec<Annotation>,
}

impl LlmAnnotator {
    pub fn new(client: LlmClient, annotations: Vec<Annotation>) -> Self {
        Self { client, annotations }
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    pub async fn annotate(&self, text: &str) -> Enrichment {
        let mut e = Enrichment::default();
        for &a in &self.annotations {
            let answer = a.normalise(self.client.ask_or_sentinel(&a.prompt(text)).await);
            let slot = match a {
                Annotation::Tone => &mut e.tone,
                Annotation::Topic => &mut e.topic,
                Annotation::Summary => &mut e.summary,
                Annotation::LoanwordContext => &mut e.loanword_context,
                Annotation::MarketingLoanwords => &mut e.marketing_loanwords,
                Annotation::CountryInfluence => &mut e.country_influence,
            };
            *slot = Some(answer);
        }
        e
    }
}

#[async_trait]
impl Enricher for LlmAnnotator {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn enrich(&self, text: &str) -> Enrichment {
        self.annotate(text).await
    }
}
