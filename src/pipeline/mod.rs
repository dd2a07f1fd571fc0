//! Scrape coordinator: candidate URLs → fetch/extract → enrich → ledger.
//!
//! ## Per-URL outcomes
//!
//! Before dispatch a URL is `Filtered` (wrong shape) or `Skipped` (already in
//! the ledger). Dispatched URLs end `Persisted`, `Rejected` (terminal content
//! verdict) or `Failed` (transport retries exhausted). None of these abort
//! the run; re-running over the same input only fetches what is missing.

pub mod annotate;
pub mod retry;
pub mod sentiment;

use crate::enrich::Enricher;
use crate::error::{FetchError, ScrapeError};
use crate::loader::dedupe;
use crate::models::ArticleRecord;
use crate::scraper::PageFetcher;
use crate::scraper::parsers::Extractor;
use crate::storage::Ledger;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

pub use self::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub enum UrlOutcome {
    Persisted,
    Skipped,
    Rejected(String),
    Failed(String),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub discovered: usize,
    pub filtered: usize,
    pub skipped: usize,
    pub persisted: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Left undispatched after cancellation.
    pub cancelled: usize,
}

#[derive(Default)]
struct Tally {
    persisted: AtomicUsize,
    skipped: AtomicUsize,
    filtered: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    /// Carry over URLs settled before dispatch.
    fn seed(&self, stats: &RunStats) {
        self.skipped.fetch_add(stats.skipped, Ordering::Relaxed);
        self.filtered.fetch_add(stats.filtered, Ordering::Relaxed);
    }

    fn count(&self, outcome: &UrlOutcome) {
        let slot = match outcome {
            UrlOutcome::Persisted => &self.persisted,
            UrlOutcome::Skipped => &self.skipped,
            UrlOutcome::Rejected(_) => &self.rejected,
            UrlOutcome::Failed(_) => &self.failed,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> String {
        format!(
            "ok {} | skip {} | filtered {} | rejected {} | failed {}",
            self.persisted.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.filtered.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }
}

/// What each spawned task shares.
struct Worker {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Extractor,
    enrichers: Vec<Arc<dyn Enricher>>,
    ledger: Arc<Ledger<ArticleRecord>>,
    policy: RetryPolicy,
    progress: ProgressBar,
    tally: Tally,
}

impl Worker {
    async fn process(&self, url: &str) -> UrlOutcome {
        let outcome = match self.fetch_with_retry(url).await {
            Ok(record) => self.enrich_and_store(record).await,
            Err(e @ ScrapeError::Extract(_))
            | Err(e @ ScrapeError::Fetch(FetchError::NonHtmlContent { .. })) => {
                UrlOutcome::Rejected(e.to_string())
            }
            Err(e) => UrlOutcome::Failed(e.to_string()),
        };

        match &outcome {
            UrlOutcome::Persisted => info!(url, "Persisted"),
            UrlOutcome::Skipped => info!(url, "Skipped (already stored)"),
            UrlOutcome::Rejected(reason) => info!(url, reason = %reason, "Rejected"),
            UrlOutcome::Failed(reason) => warn!(url, error = %reason, "Failed"),
        }
        self.tally.count(&outcome);
        self.progress.set_message(self.tally.summary());
        self.progress.inc(1);
        outcome
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<ArticleRecord, ScrapeError> {
        let counter = AtomicU32::new(0);
        let (fetcher, extractor, counter) = (self.fetcher.as_ref(), &self.extractor, &counter);

        RetryIf::spawn(
            self.policy.delays(),
            move || async move {
                let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(url, attempt, "Fetching");
                let res = fetch_and_extract(fetcher, extractor, url).await;
                if let Err(e) = &res {
                    if e.is_retryable() {
                        warn!(url, attempt, error = %e, "Attempt failed");
                    }
                }
                res
            },
            |e: &ScrapeError| e.is_retryable(),
        )
        .await
    }

    async fn enrich_and_store(&self, mut record: ArticleRecord) -> UrlOutcome {
        for enricher in &self.enrichers {
            let update = enricher.enrich(&record.body_text).await;
            debug!(url = %record.url, enricher = enricher.name(), "Enriched");
            record.apply(update);
        }

        match self.ledger.append(&record) {
            Ok(true) => UrlOutcome::Persisted,
            Ok(false) => UrlOutcome::Skipped,
            Err(e) => UrlOutcome::Failed(e.to_string()),
        }
    }
}

async fn fetch_and_extract(
    fetcher: &dyn PageFetcher,
    extractor: &Extractor,
    url: &str,
) -> Result<ArticleRecord, ScrapeError> {
    let page = fetcher.fetch(url).await?;
    Ok(extractor.extract(url, &page)?)
}

pub struct Coordinator {
    worker: Worker,
    concurrency: usize,
    limit: Option<usize>,
    cancel: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Extractor,
        ledger: Arc<Ledger<ArticleRecord>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            worker: Worker {
                fetcher,
                extractor,
                enrichers: Vec::new(),
                ledger,
                policy,
                progress: ProgressBar::hidden(),
                tally: Tally::default(),
            },
            concurrency: 5,
            limit: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_enrichers(mut self, enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        self.worker.enrichers = enrichers;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.worker.progress = progress;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
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

    pub async fn run(self, urls: Vec<String>) -> Result<RunStats> {
        let worker = Arc::new(self.worker);
        let mut stats = RunStats::default();
        let urls = dedupe(urls);
        stats.discovered = urls.len();

        let ledger = &worker.ledger;
        let mut queue = Vec::with_capacity(urls.len());
        for url in urls {
            if worker.extractor.check_url(&url).is_err() {
                debug!(url = %url, "Filtered");
                stats.filtered += 1;
            } else if ledger.contains(&url) {
                debug!(url = %url, "Skipped (already stored)");
                stats.skipped += 1;
            } else {
                queue.push(url);
            }
        }
        if let Some(limit) = self.limit {
            queue.truncate(limit);
        }

        info!(
            "{} candidates: {} filtered, {} already stored, {} to fetch ({} workers)",
            stats.discovered,
            stats.filtered,
            stats.skipped,
            queue.len(),
            self.concurrency
        );

        worker.tally.seed(&stats);
        let progress = &worker.progress;
        progress.set_length(queue.len() as u64);

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(queue.len());
        let total = queue.len();

        for url in queue {
            if self.cancel.load(Ordering::SeqCst) {
                stats.cancelled = total - handles.len();
                warn!("Cancelled: {} URLs left undispatched", stats.cancelled);
                break;
            }

            let permit = Arc::clone(&sem)
                .acquire_owned()
                .await
                .context("Worker pool closed")?;
            let worker = Arc::clone(&worker);
            let task_url = url.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                worker.process(&task_url).await
            });
            handles.push((url, handle));
        }

        for (url, handle) in handles {
            match handle.await {
                Ok(UrlOutcome::Persisted) => stats.persisted += 1,
                Ok(UrlOutcome::Skipped) => stats.skipped += 1,
                Ok(UrlOutcome::Rejected(_)) => stats.rejected += 1,
                Ok(UrlOutcome::Failed(_)) => stats.failed += 1,
                Err(e) => {
                    error!(url = %url, "Task panic: {}", e);
                    stats.failed += 1;
                }
            }
        }
        progress.finish_with_message(worker.tally.summary());

        info!(
            "=== Done: {} persisted | {} skipped | {} rejected | {} failed | {} filtered ===",
            stats.persisted, stats.skipped, stats.rejected, stats.failed, stats.filtered
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Enrichment, RawPage};
    use crate::scraper::cleaner::ArticleFilter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn article_html(paragraphs: usize) -> String {
        let body: String = (0..paragraphs)
            .map(|i| format!("<p>Absatz {} mit  einigen   Wörtern.</p>", i))
            .collect();
        format!(
            r#"<html><head><meta property="article:published_time" content="2023-04-01T08:00:00Z"><title>T</title></head><body>{}</body></html>"#,
            body
        )
    }

    /// Serves canned pages and counts calls per URL.
    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, Result<String, u16>>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl FakeFetcher {
        fn page(mut self, url: &str, paragraphs: usize) -> Self {
            self.pages.insert(url.into(), Ok(article_html(paragraphs)));
            self
        }

        fn failing(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(url.into(), Err(status));
            self
        }

        fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> u32 {
            self.calls.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
            *self.calls.lock().unwrap().entry(url.into()).or_default() += 1;
            match self.pages.get(url) {
                Some(Ok(html)) => Ok(RawPage {
                    url: url.into(),
                    content_type: "text/html".into(),
                    html: html.clone(),
                }),
                Some(Err(status)) => Err(FetchError::Status { status: *status }),
                None => Err(FetchError::Network("connection refused".into())),
            }
        }
    }

    struct Marker;

    #[async_trait]
    impl Enricher for Marker {
        fn name(&self) -> &'static str {
            "marker"
        }

        async fn enrich(&self, _text: &str) -> Enrichment {
            Enrichment {
                sentiment: Some("neutral".into()),
                ..Default::default()
            }
        }
    }

    fn coordinator(fetcher: Arc<FakeFetcher>, ledger: Arc<Ledger<ArticleRecord>>) -> Coordinator {
        let extractor = Extractor::new(ArticleFilter::new(None, vec!["/video/".into()]), 5);
        Coordinator::new(fetcher, extractor, ledger, RetryPolicy::immediate(3)).concurrency(2)
    }

    fn open(dir: &TempDir) -> Arc<Ledger<ArticleRecord>> {
        Arc::new(Ledger::open(&dir.path().join("articles.csv")).unwrap())
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let urls = vec![
            "https://example.com/a/one.html".to_string(),
            "https://example.com/a/two.html".to_string(),
        ];
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(&urls[0], 6)
                .page(&urls[1], 7),
        );

        let first = coordinator(fetcher.clone(), open(&dir)).run(urls.clone()).await.unwrap();
        assert_eq!(first.persisted, 2);

        let second = coordinator(fetcher.clone(), open(&dir)).run(urls).await.unwrap();
        assert_eq!(second.persisted, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(fetcher.total_calls(), 2);

        let rows: Vec<ArticleRecord> =
            crate::storage::read_rows(&dir.path().join("articles.csv")).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_input_fetched_once() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.com/a/one.html".to_string();
        let fetcher = Arc::new(FakeFetcher::default().page(&url, 5));

        let stats = coordinator(fetcher.clone(), open(&dir))
            .run(vec![url.clone(), url.clone(), url.clone()])
            .await
            .unwrap();
        assert_eq!(stats.discovered, 1);
        assert_eq!(stats.persisted, 1);
        assert_eq!(fetcher.calls(&url), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_do_not_stop_the_run() {
        let dir = TempDir::new().unwrap();
        let bad = "https://example.com/a/bad.html".to_string();
        let good = "https://example.com/a/good.html".to_string();
        let fetcher = Arc::new(FakeFetcher::default().failing(&bad, 503).page(&good, 5));

        let stats = coordinator(fetcher.clone(), open(&dir))
            .concurrency(1)
            .run(vec![bad.clone(), good.clone()])
            .await
            .unwrap();
        assert_eq!(fetcher.calls(&bad), 3);
        assert_eq!(fetcher.calls(&good), 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.persisted, 1);
    }

    #[tokio::test]
    async fn test_rejections_and_filtering_are_terminal() {
        let dir = TempDir::new().unwrap();
        let short = "https://example.com/a/short.html".to_string();
        let fetcher = Arc::new(FakeFetcher::default().page(&short, 2));

        let stats = coordinator(fetcher.clone(), open(&dir))
            .run(vec![
                short.clone(),
                "https://example.com/video/clip.html".into(),
                "https://example.com/a/feed.xml".into(),
            ])
            .await
            .unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.filtered, 2);
        assert_eq!(fetcher.calls(&short), 1);
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_records_are_enriched_and_counted() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.com/a/one.html".to_string();
        let fetcher = Arc::new(FakeFetcher::default().page(&url, 5));

        coordinator(fetcher, open(&dir))
            .with_enrichers(vec![Arc::new(Marker)])
            .run(vec![url])
            .await
            .unwrap();

        let rows: Vec<ArticleRecord> =
            crate::storage::read_rows(&dir.path().join("articles.csv")).unwrap();
        let row = &rows[0];
        assert_eq!(row.sentiment.as_deref(), Some("neutral"));
        assert_eq!(row.word_count, row.body_text.split_whitespace().count());
        assert_eq!(row.paragraph_count, 5);
        assert_eq!(row.year, Some(2023));
    }

    #[tokio::test]
    async fn test_limit_and_cancellation() {
        let dir = TempDir::new().unwrap();
        let urls: Vec<String> = (0..4).map(|i| format!("https://example.com/a/{}.html", i)).collect();
        let fetcher = urls.iter().fold(FakeFetcher::default(), |f, u| f.page(u, 5));
        let fetcher = Arc::new(fetcher);

        let limited = coordinator(fetcher.clone(), open(&dir))
            .limit(Some(1))
            .run(urls.clone())
            .await
            .unwrap();
        assert_eq!(limited.persisted, 1);

        let flag = Arc::new(AtomicBool::new(true));
        let cancelled = coordinator(fetcher.clone(), open(&dir))
            .cancel_flag(flag)
            .run(urls)
            .await
            .unwrap();
        assert_eq!(cancelled.persisted, 0);
        assert_eq!(cancelled.cancelled, 3);
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[test]
    fn test_live_summary_includes_pre_dispatch_counts() {
        let tally = Tally::default();
        tally.seed(&RunStats {
            discovered: 6,
            filtered: 2,
            skipped: 3,
            ..Default::default()
        });
        tally.count(&UrlOutcome::Persisted);
        tally.count(&UrlOutcome::Skipped);
        assert_eq!(tally.summary(), "ok 1 | skip 4 | filtered 2 | rejected 0 | failed 0");
    }
}
