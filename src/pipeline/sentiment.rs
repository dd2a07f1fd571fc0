//! Batch sentiment over the stored articles, resumable by `url`.

use crate::enrich::sentiment::{SentimentClassifier, UNKNOWN};
use crate::models::{ArticleRecord, SentimentRecord};
use crate::storage::Ledger;
use anyhow::Result;
use indicatif::ProgressBar;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SentimentStats {
    pub already_done: usize,
    pub labelled: usize,
    pub unknown: usize,
    pub failed: usize,
}

pub struct SentimentPass {
    classifier: SentimentClassifier,
    batch_size: usize,
    limit: Option<usize>,
    progress: ProgressBar,
}

impl SentimentPass {
    pub fn new(classifier: SentimentClassifier, batch_size: usize) -> Self {
        Self {
            classifier,
            batch_size: batch_size.max(1),
            limit: None,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(
        &self,
        articles: Vec<ArticleRecord>,
        out: &Ledger<SentimentRecord>,
    ) -> Result<SentimentStats> {
        let mut stats = SentimentStats::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for a in articles {
            if !seen.insert(a.url.clone()) {
                continue;
            }
            if out.contains(&a.url) {
                stats.already_done += 1;
            } else {
                pending.push(a);
            }
        }
        if let Some(limit) = self.limit {
            pending.truncate(limit);
        }
        self.progress.set_length(pending.len() as u64);
        info!("{} articles to score ({} already scored)", pending.len(), stats.already_done);

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|a| a.body_text.clone()).collect();
            let labels = self.classifier.label_batch(&texts).await;

            for (article, sentiment) in batch.iter().zip(labels) {
                if sentiment == UNKNOWN {
                    stats.unknown += 1;
                }
                let row = SentimentRecord {
                    url: article.url.clone(),
                    sentiment,
                };
                match out.append(&row) {
                    Ok(_) => stats.labelled += 1,
                    Err(e) => {
                        warn!(url = %article.url, error = %e, "Sentiment write failed");
                        stats.failed += 1;
                    }
                }
            }
            self.progress.inc(batch.len() as u64);
        }
        self.progress.finish();
        Ok(stats)
    }
}
