//! Second pass: LLM annotations over the stored articles.
//!
//! Results go to a separate checkpoint ledger keyed by `url`, so an
//! interrupted pass picks up where it stopped.

use crate::enrich::llm::{LlmAnnotator, boilerplate_loanwords};
use crate::models::{AnnotationRecord, ArticleRecord, Enrichment};
use crate::storage::Ledger;
use anyhow::Result;
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AnnotateStats {
    pub already_done: usize,
    pub pending: usize,
    pub annotated: usize,
    pub failed: usize,
}

pub struct AnnotatePass {
    annotator: LlmAnnotator,
    filter_boilerplate: bool,
    batch_size: usize,
    limit: Option<usize>,
    cancel: Arc<AtomicBool>,
    progress: ProgressBar,
}

impl AnnotatePass {
    pub fn new(annotator: LlmAnnotator, batch_size: usize) -> Self {
        Self {
            annotator,
            filter_boilerplate: false,
            batch_size: batch_size.max(1),
            limit: None,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn filter_boilerplate(mut self, on: bool) -> Self {
        self.filter_boilerplate = on;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(
        &self,
        articles: Vec<ArticleRecord>,
        checkpoint: &Ledger<AnnotationRecord>,
    ) -> Result<AnnotateStats> {
        let mut stats = AnnotateStats::default();
        let mut seen = HashSet::new();
        let mut pending: Vec<ArticleRecord> = Vec::new();
        for article in articles {
            if !seen.insert(article.url.clone()) {
                continue;
            }
            if checkpoint.contains(&article.url) {
                stats.already_done += 1;
            } else {
                pending.push(article);
            }
        }
        if let Some(limit) = self.limit {
            pending.truncate(limit);
        }
        stats.pending = pending.len();
        info!(
            "{} articles to annotate ({} already in checkpoint)",
            stats.pending, stats.already_done
        );
        self.progress.set_length(pending.len() as u64);

        let batches = pending.len().div_ceil(self.batch_size);
        'outer: for (i, batch) in pending.chunks(self.batch_size).enumerate() {
            for article in batch {
                if self.cancel.load(Ordering::SeqCst) {
                    warn!("Cancelled during batch {}/{}", i + 1, batches);
                    break 'outer;
                }
                let row = self.annotate_one(article).await;
                match checkpoint.append(&row) {
                    Ok(_) => stats.annotated += 1,
                    Err(e) => {
                        warn!(url = %article.url, error = %e, "Checkpoint write failed");
                        stats.failed += 1;
                    }
                }
                self.progress.inc(1);
            }
            info!("Batch {}/{} done ({} annotated)", i + 1, batches, stats.annotated);
        }
        self.progress.finish();
        Ok(stats)
    }

    async fn annotate_one(&self, article: &ArticleRecord) -> AnnotationRecord {
        let e = self.annotator.annotate(&article.body_text).await;
        let excluded = if self.filter_boilerplate {
            boilerplate_loanwords(self.annotator.client(), &article.body_text, &article.all_loanwords)
                .await
        } else {
            Vec::new()
        };
        info!(url = %article.url, "Annotated");
        annotation_record(&article.url, e, excluded)
    }
}

pub fn annotation_record(url: &str, e: Enrichment, excluded_loanwords: Vec<String>) -> AnnotationRecord {
    AnnotationRecord {
        url: url.to_string(),
        tone: e.tone,
        topic: e.topic,
        summary: e.summary,
        loanword_context: e.loanword_context,
        marketing_loanwords: e.marketing_loanwords,
        country_influence: e.country_influence,
        excluded_loanwords,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::llm::{Annotation, ChatMessage, ChatModel, LlmClient};
    use crate::error::LlmError;
    use crate::storage::read_rows;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    struct EchoChat {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for EchoChat {
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &messages[messages.len() - 1].content;
            Ok(if prompt.contains("boilerplate") { "ticker, Footer".into() } else { "formal".into() })
        }
    }

    fn article(url: &str) -> ArticleRecord {
        ArticleRecord {
            url: url.into(),
            body_text: "Der Ticker im Footer".into(),
            all_loanwords: vec!["ticker".into(), "footer".into()],
            ..Default::default()
        }
    }

    fn pass(chat: Arc<EchoChat>) -> AnnotatePass {
        let client = LlmClient::new(chat, None, 1, Duration::ZERO);
        AnnotatePass::new(LlmAnnotator::new(client, vec![Annotation::Tone]), 2)
    }

    #[tokio::test]
    async fn test_checkpoint_resume_and_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.csv");
        let chat = Arc::new(EchoChat { calls: AtomicUsize::new(0) });
        let articles: Vec<ArticleRecord> =
            ["a", "b", "c"].iter().map(|u| article(&format!("https://x.de/{}.html", u))).collect();

        let first = pass(chat.clone())
            .limit(Some(2))
            .run(articles.clone(), &Ledger::open(&path).unwrap())
            .await
            .unwrap();
        assert_eq!(first.annotated, 2);

        let second = pass(chat.clone())
            .run(articles, &Ledger::open(&path).unwrap())
            .await
            .unwrap();
        assert_eq!(second.already_done, 2);
        assert_eq!(second.annotated, 1);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 3);

        let rows: Vec<AnnotationRecord> = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.tone.as_deref() == Some("formal")));
    }

    #[tokio::test]
    async fn test_boilerplate_filter_records_exclusions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.csv");
        let chat = Arc::new(EchoChat { calls: AtomicUsize::new(0) });

        pass(chat)
            .filter_boilerplate(true)
            .run(vec![article("https://x.de/a.html")], &Ledger::open(&path).unwrap())
            .await
            .unwrap();

        let rows: Vec<AnnotationRecord> = read_rows(&path).unwrap();
        assert_eq!(rows[0].excluded_loanwords, vec!["ticker", "footer"]);
    }
}
