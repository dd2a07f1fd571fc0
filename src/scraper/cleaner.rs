use crate::config::ScraperConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static URL_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(20\d{2})/").expect("static regex"));

// ── URL shape ─────────────────────────────────────────────────────────────────

/// Content-independent check that a URL points at an article page.
#[derive(Debug, Clone)]
pub struct ArticleFilter {
    accepted_prefix: Option<String>,
    required_suffix: String,
    denylist: Vec<String>,
}

impl ArticleFilter {
    pub fn new(accepted_prefix: Option<String>, denylist: Vec<String>) -> Self {
        Self {
            accepted_prefix,
            required_suffix: "html".to_string(),
            denylist,
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(config.accepted_prefix.clone(), config.denylist.clone())
    }

    pub fn accepts(&self, url: &str) -> bool {
        let prefix_ok = self
            .accepted_prefix
            .as_deref()
            .is_none_or(|p| url.starts_with(p));

        prefix_ok
            && url.ends_with(&self.required_suffix)
            && !self.denylist.iter().any(|frag| url.contains(frag.as_str()))
    }
}

// ── Host-derived fields ───────────────────────────────────────────────────────

/// "https://www.businessinsider.de/x.html" → ("businessinsider.de", "businessinsider")
pub fn site_and_domain(url: &str) -> Option<(String, String)> {
    let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
    let site = host.strip_prefix("www.").unwrap_or(&host).to_string();
    let domain = site.split('.').next().unwrap_or_default().to_string();
    Some((site, domain))
}

// ── Dates ─────────────────────────────────────────────────────────────────────

/// "2024-03-01T08:15:00+01:00" → "2024-03-01"; blank → None
pub fn date_part(s: &str) -> Option<String> {
    let date = s.split('T').next().unwrap_or_default().trim();
    if date.is_empty() { None } else { Some(date.to_string()) }
}

/// "/2023/" path segment → "2023"
pub fn year_from_url(url: &str) -> Option<String> {
    URL_YEAR
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Leading component of an ISO date or bare year.
pub fn year_of(date: &str) -> Option<i32> {
    date.split('-').next()?.trim().parse().ok()
}

// ── Text ──────────────────────────────────────────────────────────────────────

pub fn clean_text(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn example_filter() -> ArticleFilter {
        let denylist = ScraperConfig::default().denylist;
        ArticleFilter::new(Some("https://example.com/".into()), denylist)
    }

    #[test]
    fn test_article_filter() {
        let f = example_filter();
        assert!(f.accepts("https://example.com/foo/bar.html"));
        assert!(!f.accepts("https://example.com/video/clip.html"));
        assert!(!f.accepts("https://example.com/foo/bar"));
        assert!(!f.accepts("https://example.com/bilder/strand.html"));
        assert!(!f.accepts("https://other.org/foo/bar.html"));
    }

    #[test]
    fn test_filter_without_prefix_accepts_any_host() {
        let f = ArticleFilter::new(None, vec!["/live/".into()]);
        assert!(f.accepts("https://other.org/a.html"));
        assert!(!f.accepts("https://other.org/live/ticker.html"));
    }

    #[test]
    fn test_site_and_domain() {
        assert_eq!(
            site_and_domain("https://www.businessinsider.de/wirtschaft/a.html"),
            Some(("businessinsider.de".into(), "businessinsider".into()))
        );
        assert_eq!(
            site_and_domain("https://example.com/a.html"),
            Some(("example.com".into(), "example".into()))
        );
        assert_eq!(site_and_domain("not a url"), None);
    }

    #[test]
    fn test_dates() {
        assert_eq!(date_part("2024-03-01T08:15:00+01:00").as_deref(), Some("2024-03-01"));
        assert_eq!(date_part(""), None);
        assert_eq!(year_from_url("https://example.com/2023/05/a.html").as_deref(), Some("2023"));
        assert_eq!(year_from_url("https://example.com/1999/a.html"), None);
        assert_eq!(year_of("2024-03-01"), Some(2024));
        assert_eq!(year_of("2023"), Some(2023));
        assert_eq!(year_of("gestern"), None);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  Das  ist\nein Test "), 4);
        assert_eq!(word_count(""), 0);
    }
}
