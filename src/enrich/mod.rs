//! Per-article enrichment.
//!
//! An [`Enricher`] never fails the article: a collaborator that cannot answer
//! leaves a sentinel (`"unknown"`, `"error"`) in its fields instead.

pub mod language;
pub mod llm;
pub mod loanwords;
pub mod sentiment;
pub mod tokenizer;

use crate::config::AppConfig;
use crate::models::Enrichment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use language::WhatlangIdentifier;
use llm::{LlmAnnotator, LlmClient, OllamaChat, parse_annotations};
use loanwords::LoanwordDetector;
use sentiment::{HttpSentimentModel, SentimentClassifier};
use tokenizer::GermanTokenizer;

#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enrich(&self, text: &str) -> Enrichment;
}

pub fn loanword_detector(config: &AppConfig) -> LoanwordDetector {
    LoanwordDetector::new(
        Arc::new(GermanTokenizer),
        Arc::new(WhatlangIdentifier::new(&config.nlp.language_allowlist)),
        config.nlp.min_token_len,
        config.nlp.target_language.clone(),
    )
}

/// `None` when no endpoint is configured.
pub fn sentiment_classifier(config: &AppConfig) -> Result<Option<SentimentClassifier>> {
    let Some(endpoint) = &config.nlp.sentiment_endpoint else {
        return Ok(None);
    };
    let model = HttpSentimentModel::new(
        endpoint.clone(),
        Duration::from_secs(config.scraper.timeout_secs.max(30)),
    )
    .context("Failed to build sentiment client")?;
    Ok(Some(SentimentClassifier::new(
        Arc::new(model),
        config.nlp.sentiment_char_budget,
    )))
}

pub fn llm_client(config: &AppConfig) -> Result<LlmClient> {
    let chat = OllamaChat::new(&config.llm).context("Failed to build chat client")?;
    Ok(LlmClient::from_config(Arc::new(chat), &config.llm))
}

pub fn llm_annotator(config: &AppConfig) -> Result<LlmAnnotator> {
    Ok(LlmAnnotator::new(
        llm_client(config)?,
        parse_annotations(&config.llm.annotations),
    ))
}

/// Enrichers the scrape loop runs, in application order.
pub fn scrape_enrichers(config: &AppConfig) -> Result<Vec<Arc<dyn Enricher>>> {
    let mut out: Vec<Arc<dyn Enricher>> = vec![Arc::new(loanword_detector(config))];
    if let Some(clf) = sentiment_classifier(config)? {
        out.push(Arc::new(clf));
    }
    if config.llm.during_scrape {
        out.push(Arc::new(llm_annotator(config)?));
    }

    let names: Vec<&str> = out.iter().map(|e| e.name()).collect();
    info!(enrichers = ?names, "Enrichment chain ready");
    Ok(out)
}
