use thiserror::Error;

// ── Fetch ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("non-HTML content ({content_type})")]
    NonHtmlContent { content_type: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

// ── Extract ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("not an article URL")]
    NotAnArticle,

    #[error("too few paragraphs ({found} < {required})")]
    TooShort { found: usize, required: usize },

    #[error("no text extracted")]
    EmptyBody,
}

/// Everything that can end a single URL's fetch+extract step.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl ScrapeError {
    /// Transport problems get another attempt; content verdicts do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::Fetch(FetchError::Network(_) | FetchError::Status { .. })
        )
    }
}

// ── Collaborators ─────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("language could not be identified")]
    Undetectable,

    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("unexpected classifier response: {0}")]
    Response(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("chat request failed: {0}")]
    Request(String),

    #[error("malformed chat response: {0}")]
    Response(String),
}

// ── Ledger ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ledger {0} has no `url` column")]
    MissingKeyColumn(String),

    #[error("ledger lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_retry() {
        assert!(ScrapeError::from(FetchError::Network("timeout".into())).is_retryable());
        assert!(ScrapeError::from(FetchError::Status { status: 503 }).is_retryable());
        assert!(
            !ScrapeError::from(FetchError::NonHtmlContent {
                content_type: "application/pdf".into()
            })
            .is_retryable()
        );
        assert!(!ScrapeError::from(ExtractError::EmptyBody).is_retryable());
        assert!(!ScrapeError::from(ExtractError::TooShort { found: 2, required: 5 }).is_retryable());
    }
}
