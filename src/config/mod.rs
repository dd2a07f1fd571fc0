use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub nlp: NlpConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Politeness delay before every request.
    #[serde(default)]
    pub request_delay_ms: u64,

    #[serde(default)]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_min_secs")]
    pub retry_delay_min_secs: f64,

    #[serde(default = "default_retry_delay_max_secs")]
    pub retry_delay_max_secs: f64,

    /// Article URLs must start with this; `None` accepts any host.
    #[serde(default = "default_accepted_prefix")]
    pub accepted_prefix: Option<String>,

    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    #[serde(default = "default_min_paragraphs")]
    pub min_paragraphs: usize,

    /// Only child sitemaps whose URL contains this are expanded.
    #[serde(default = "default_sitemap_filter")]
    pub sitemap_filter: Option<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    #[serde(default = "default_sentiment_path")]
    pub sentiment_path: PathBuf,

    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Sitemap index URL or path to a URL list file.
    #[serde(default = "default_input")]
    pub input: String,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_true")]
    pub resume: bool,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub limit: Option<usize>,
}

/// Local NLP collaborators
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NlpConfig {
    /// Text-classification endpoint; `None` disables sentiment scoring.
    #[serde(default = "default_sentiment_endpoint")]
    pub sentiment_endpoint: Option<String>,

    #[serde(default = "default_sentiment_char_budget")]
    pub sentiment_char_budget: usize,

    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    /// ISO 639-3 code a token must be identified as to count as a loanword.
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Restrict identification to these ISO 639-3 codes; empty means all.
    #[serde(default)]
    pub language_allowlist: Vec<String>,
}

/// Chat model used for annotations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default = "default_max_retries")]
    pub retries: u32,

    #[serde(default = "default_llm_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Annotation names: tone, topic, summary, loanword_context,
    /// marketing_loanwords, country_influence.
    #[serde(default = "default_annotations")]
    pub annotations: Vec<String>,

    /// Run the annotator inside the scrape loop as well.
    #[serde(default)]
    pub during_scrape: bool,

    /// Ask for boilerplate loanwords in the `annotate` pass.
    #[serde(default)]
    pub filter_boilerplate: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; news-loanwords/0.1; linguistic research)".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_min_secs() -> f64 {
    1.0
}
fn default_retry_delay_max_secs() -> f64 {
    5.0
}
fn default_accepted_prefix() -> Option<String> {
    Some("https://www.businessinsider.de/".to_string())
}
fn default_denylist() -> Vec<String> {
    [
        "/video/", ".jpg", ".jpeg", ".png", ".gif", "/bilder/", "/photo/", "/live/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_min_paragraphs() -> usize {
    5
}
fn default_sitemap_filter() -> Option<String> {
    Some("post-sitemap".to_string())
}
fn default_output_path() -> PathBuf {
    PathBuf::from("data/scraped_articles.csv")
}
fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("data/llm_enrich_checkpoint.csv")
}
fn default_sentiment_path() -> PathBuf {
    PathBuf::from("data/sentiment.csv")
}
fn default_log_path() -> PathBuf {
    PathBuf::from("data/news-loanwords.log")
}
fn default_input() -> String {
    "https://www.businessinsider.de/sitemap_index.xml".to_string()
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> usize {
    5
}
fn default_batch_size() -> usize {
    50
}
fn default_sentiment_endpoint() -> Option<String> {
    Some("http://localhost:8080/predict".to_string())
}
fn default_sentiment_char_budget() -> usize {
    516
}
fn default_min_token_len() -> usize {
    4
}
fn default_target_language() -> String {
    "eng".to_string()
}
fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "mistral".to_string()
}
fn default_llm_retry_delay_ms() -> u64 {
    2000
}
fn default_llm_timeout_secs() -> u64 {
    300
}
fn default_annotations() -> Vec<String> {
    [
        "tone",
        "topic",
        "summary",
        "loanword_context",
        "marketing_loanwords",
        "country_influence",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: 0,
            jitter_ms: 0,
            max_retries: default_max_retries(),
            retry_delay_min_secs: default_retry_delay_min_secs(),
            retry_delay_max_secs: default_retry_delay_max_secs(),
            accepted_prefix: default_accepted_prefix(),
            denylist: default_denylist(),
            min_paragraphs: default_min_paragraphs(),
            sitemap_filter: default_sitemap_filter(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            checkpoint_path: default_checkpoint_path(),
            sentiment_path: default_sentiment_path(),
            log_path: default_log_path(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            concurrency: default_concurrency(),
            resume: true,
            batch_size: default_batch_size(),
            limit: None,
        }
    }
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            sentiment_endpoint: default_sentiment_endpoint(),
            sentiment_char_budget: default_sentiment_char_budget(),
            min_token_len: default_min_token_len(),
            target_language: default_target_language(),
            language_allowlist: Vec::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            system_prompt: None,
            retries: default_max_retries(),
            retry_delay_ms: default_llm_retry_delay_ms(),
            timeout_secs: default_llm_timeout_secs(),
            annotations: default_annotations(),
            during_scrape: false,
            filter_boilerplate: false,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides.
    /// Not validated here: callers apply CLI overrides first, then `validate()`.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("NEWS_LOANWORDS").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        Self::from_config(cfg)
    }

    pub fn from_config(cfg: config::Config) -> Result<Self> {
        cfg.try_deserialize().context("Invalid configuration")
    }

    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            bail!("pipeline.concurrency must be at least 1");
        }
        if self.pipeline.batch_size == 0 {
            bail!("pipeline.batch_size must be at least 1");
        }
        if self.scraper.max_retries == 0 {
            bail!("scraper.max_retries must be at least 1");
        }
        if self.llm.retries == 0 {
            bail!("llm.retries must be at least 1");
        }
        let (min, max) = (
            self.scraper.retry_delay_min_secs,
            self.scraper.retry_delay_max_secs,
        );
        if !(min >= 0.0 && min <= max) {
            bail!("retry delay range [{}, {}] is invalid", min, max);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pipeline.concurrency, 5);
        assert_eq!(cfg.scraper.max_retries, 3);
        assert_eq!(cfg.scraper.min_paragraphs, 5);
        assert!(cfg.pipeline.resume);
    }

    #[test]
    fn test_inverted_delay_range_rejected() {
        let mut cfg = AppConfig::default();
        cfg.scraper.retry_delay_min_secs = 4.0;
        cfg.scraper.retry_delay_max_secs = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[pipeline]\nconcurrency = 8\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.pipeline.concurrency, 8);
        assert_eq!(cfg.pipeline.batch_size, 50);
        assert_eq!(cfg.llm.model, "mistral");
    }

    #[test]
    fn test_cli_override_can_fix_file_setting() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "[pipeline]\nconcurrency = 0\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let mut app = AppConfig::from_config(cfg).unwrap();
        assert!(app.validate().is_err());

        app.pipeline.concurrency = 4;
        assert!(app.validate().is_ok());
    }
}
