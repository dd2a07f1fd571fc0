pub mod cleaner;
pub mod http_client;
pub mod parsers;
pub mod sitemap;

use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::loader::read_url_list;
use crate::models::RawPage;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use self::http_client::HttpClient;
use self::sitemap::SitemapCrawler;

// ── Fetcher trait ─────────────────────────────────────────────────────────────

/// Swappable page source.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawPage, FetchError>;
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
        self.get_html(url).await
    }
}

/// Raw sitemap XML by URL.
#[async_trait]
pub trait SitemapSource: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl SitemapSource for HttpClient {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        HttpClient::get_text(self, url).await
    }
}

// ── Candidate URLs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum UrlSource {
    SitemapIndex(String),
    ListFile(PathBuf),
}

impl UrlSource {
    /// `http(s)://…` is a sitemap index, anything else a URL list on disk.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.starts_with("http://") || input.starts_with("https://") {
            UrlSource::SitemapIndex(input.to_string())
        } else {
            UrlSource::ListFile(PathBuf::from(input))
        }
    }

    pub async fn collect(&self, client: &HttpClient, config: &ScraperConfig) -> Result<Vec<String>> {
        match self {
            UrlSource::SitemapIndex(url) => {
                info!("Discovering article URLs from {}", url);
                SitemapCrawler::new(client, config.sitemap_filter.clone())
                    .discover(url)
                    .await
            }
            UrlSource::ListFile(path) => read_url_list(path),
        }
    }
}
