mod config;
mod enrich;
mod error;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::loader::{dedupe, write_url_list};
use crate::models::{AnnotationRecord, ArticleRecord, SentimentRecord};
use crate::pipeline::annotate::AnnotatePass;
use crate::pipeline::sentiment::SentimentPass;
use crate::pipeline::{Coordinator, RetryPolicy};
use crate::scraper::UrlSource;
use crate::scraper::http_client::HttpClient;
use crate::scraper::parsers::Extractor;
use crate::storage::stats::CorpusStats;
use crate::storage::{Ledger, archive_existing, read_rows};

#[derive(Parser)]
#[command(
    name = "news-loanwords",
    about = "Scrape German news articles and measure English loanword usage",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Hide progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, extract, enrich and store articles (resumable)
    Scrape {
        /// Sitemap index URL or file with one URL per line
        #[arg(short, long)]
        input: Option<String>,

        /// Article CSV (also the resume state)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long)]
        workers: Option<usize>,

        #[arg(long)]
        max_retries: Option<u32>,

        /// Retry delay range in seconds
        #[arg(long)]
        delay_min: Option<f64>,
        #[arg(long)]
        delay_max: Option<f64>,

        /// Archive the existing output and start over
        #[arg(long)]
        no_resume: bool,

        #[arg(long)]
        limit: Option<usize>,

        /// Also run LLM annotations during the scrape
        #[arg(long)]
        llm: bool,
    },

    /// Expand a sitemap index into a URL list file
    Discover {
        #[arg(short, long)]
        input: Option<String>,

        #[arg(short, long, default_value = "data/urls.txt")]
        out: PathBuf,
    },

    /// LLM annotations over stored articles, checkpointed
    Annotate {
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Ask the model which loanwords are boilerplate
        #[arg(long)]
        filter_boilerplate: bool,
    },

    /// Batch sentiment over stored articles
    Sentiment {
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Show ledger statistics
    Stats {
        /// Number of loanwords to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

fn init_logging(verbose: u8, log_path: &Path) -> Result<()> {
    let default = match verbose {
        0 => "news_loanwords=info,warn",
        1 => "news_loanwords=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if let Some(dir) = log_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {:?}", dir))?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Cannot open log file {:?}", log_path))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();
    Ok(())
}

/// Flag flipped by Ctrl-C; checked between dispatches.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let shutdown = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received; finishing in-flight URLs");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    flag
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    init_logging(cli.verbose, &config.storage.log_path)?;
    let quiet = cli.no_progress;

    match cli.command {
        Command::Scrape {
            input,
            output,
            workers,
            max_retries,
            delay_min,
            delay_max,
            no_resume,
            limit,
            llm,
        } => {
            if let Some(v) = input {
                config.pipeline.input = v;
            }
            if let Some(v) = output {
                config.storage.output_path = v;
            }
            if let Some(v) = workers {
                config.pipeline.concurrency = v;
            }
            if let Some(v) = max_retries {
                config.scraper.max_retries = v;
            }
            if let Some(v) = delay_min {
                config.scraper.retry_delay_min_secs = v;
            }
            if let Some(v) = delay_max {
                config.scraper.retry_delay_max_secs = v;
            }
            if no_resume {
                config.pipeline.resume = false;
            }
            if limit.is_some() {
                config.pipeline.limit = limit;
            }
            if llm {
                config.llm.during_scrape = true;
            }
            config.validate()?;

            let _t = utils::Timer::start("Scrape");
            let output = &config.storage.output_path;
            if !config.pipeline.resume {
                if let Some(backup) = archive_existing(output)? {
                    info!("Fresh run: previous output moved to {:?}", backup);
                }
            }

            let client = HttpClient::new(&config.scraper).context("Failed to build HTTP client")?;
            let urls = UrlSource::parse(&config.pipeline.input)
                .collect(&client, &config.scraper)
                .await
                .context("Failed to collect candidate URLs")?;

            let ledger: Ledger<ArticleRecord> =
                Ledger::open(output).with_context(|| format!("Failed to open {:?}", output))?;
            info!("{} articles already in {:?}", ledger.len(), ledger.path());

            let stats = Coordinator::new(
                Arc::new(client),
                Extractor::from_config(&config.scraper),
                Arc::new(ledger),
                RetryPolicy::from_config(&config.scraper),
            )
            .with_enrichers(enrich::scrape_enrichers(&config)?)
            .with_progress(utils::progress_bar(0, quiet))
            .concurrency(config.pipeline.concurrency)
            .limit(config.pipeline.limit)
            .cancel_flag(cancel_on_ctrl_c())
            .run(urls)
            .await?;

            println!("─────────────────────────────────");
            println!("  Scrape summary");
            println!("─────────────────────────────────");
            println!("  Candidates : {}", utils::fmt_number(stats.discovered));
            println!("  Persisted  : {}", utils::fmt_number(stats.persisted));
            println!("  Skipped    : {}", utils::fmt_number(stats.skipped));
            println!("  Filtered   : {}", utils::fmt_number(stats.filtered));
            println!("  Rejected   : {}", utils::fmt_number(stats.rejected));
            println!("  Failed     : {}", utils::fmt_number(stats.failed));
            if stats.cancelled > 0 {
                println!("  Cancelled  : {}", utils::fmt_number(stats.cancelled));
            }
            println!("─────────────────────────────────");
        }

        Command::Discover { input, out } => {
            config.validate()?;
            let _t = utils::Timer::start("Sitemap discovery");
            let input = input.unwrap_or_else(|| config.pipeline.input.clone());
            let client = HttpClient::new(&config.scraper).context("Failed to build HTTP client")?;
            let urls = dedupe(UrlSource::parse(&input).collect(&client, &config.scraper).await?);
            write_url_list(&out, &urls)?;
            println!("{} URLs written to {:?}", utils::fmt_number(urls.len()), out);
        }

        Command::Annotate {
            limit,
            batch_size,
            filter_boilerplate,
        } => {
            if let Some(v) = batch_size {
                config.pipeline.batch_size = v;
            }
            if limit.is_some() {
                config.pipeline.limit = limit;
            }
            config.validate()?;

            let _t = utils::Timer::start("LLM annotation");
            let articles: Vec<ArticleRecord> = read_rows(&config.storage.output_path)?;
            if articles.is_empty() {
                bail!("No articles in {:?}; run `scrape` first", config.storage.output_path);
            }
            let checkpoint: Ledger<AnnotationRecord> = Ledger::open(&config.storage.checkpoint_path)
                .with_context(|| format!("Failed to open {:?}", config.storage.checkpoint_path))?;

            let stats = AnnotatePass::new(enrich::llm_annotator(&config)?, config.pipeline.batch_size)
                .filter_boilerplate(filter_boilerplate || config.llm.filter_boilerplate)
                .limit(config.pipeline.limit)
                .cancel_flag(cancel_on_ctrl_c())
                .with_progress(utils::progress_bar(0, quiet))
                .run(articles, &checkpoint)
                .await?;

            println!(
                "Annotated {} articles ({} already done, {} write errors) → {:?}",
                stats.annotated, stats.already_done, stats.failed, config.storage.checkpoint_path
            );
        }

        Command::Sentiment { limit, batch_size } => {
            if let Some(v) = batch_size {
                config.pipeline.batch_size = v;
            }
            if limit.is_some() {
                config.pipeline.limit = limit;
            }
            config.validate()?;

            let _t = utils::Timer::start("Batch sentiment");
            let Some(classifier) = enrich::sentiment_classifier(&config)? else {
                bail!("nlp.sentiment_endpoint is not configured");
            };
            let articles: Vec<ArticleRecord> = read_rows(&config.storage.output_path)?;
            let out: Ledger<SentimentRecord> = Ledger::open(&config.storage.sentiment_path)
                .with_context(|| format!("Failed to open {:?}", config.storage.sentiment_path))?;

            let stats = SentimentPass::new(classifier, config.pipeline.batch_size)
                .limit(config.pipeline.limit)
                .with_progress(utils::progress_bar(0, quiet))
                .run(articles, &out)
                .await?;

            println!(
                "Labelled {} articles ({} unknown, {} already done) → {:?}",
                stats.labelled, stats.unknown, stats.already_done, config.storage.sentiment_path
            );
        }

        Command::Stats { top } => {
            let rows: Vec<ArticleRecord> = read_rows(&config.storage.output_path)?;
            let s = CorpusStats::from_rows(&rows, top);
            let year = |y: Option<i32>| y.map(|y| y.to_string()).unwrap_or("—".into());
            println!("─────────────────────────────────");
            println!("  news-loanwords — Ledger Stats");
            println!("─────────────────────────────────");
            println!("  Articles     : {}", utils::fmt_number(s.articles));
            println!("  Sites        : {}", s.sites);
            println!("  Years        : {} → {}", year(s.first_year), year(s.last_year));
            println!("  Words        : {}", utils::fmt_number(s.total_words));
            println!("  Loanwords    : {}", utils::fmt_number(s.total_loanwords));
            println!("  Mean density : {:.4}", s.mean_density);
            println!("  Top          : {}", s.top_loanwords.join(", "));
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}
