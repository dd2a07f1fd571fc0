use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::models::RawPage;
use anyhow::{Context, Result};
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

pub struct HttpClient {
    inner: reqwest::Client,
    request_delay_ms: u64,
    jitter_ms: u64,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Consent walls hand out cookies on the first hit
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            request_delay_ms: config.request_delay_ms,
            jitter_ms: config.jitter_ms,
        })
    }

    /// GET a URL as text, without any content-type check. Used for sitemaps.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.polite_delay().await;
        debug!(url, "GET");

        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }
        Ok(resp.text().await?)
    }

    /// GET a URL and accept the body only if it is HTML.
    pub async fn get_html(&self, url: &str) -> Result<RawPage, FetchError> {
        self.polite_delay().await;
        debug!(url, "GET html");

        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_html(&content_type) {
            return Err(FetchError::NonHtmlContent { content_type });
        }

        let html = resp.text().await?;
        Ok(RawPage {
            url: url.to_string(),
            content_type,
            html,
        })
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        if self.request_delay_ms == 0 && self.jitter_ms == 0 {
            return;
        }
        let jitter = rand::rng().random_range(0..=self.jitter_ms);
        sleep(Duration::from_millis(self.request_delay_ms + jitter)).await;
    }
}

pub fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html; charset=UTF-8"));
        assert!(is_html("Text/HTML"));
        assert!(!is_html("application/json"));
        assert!(!is_html(""));
    }
}
