//! Article page → `ArticleRecord`.

use crate::config::ScraperConfig;
use crate::error::ExtractError;
use crate::models::{ArticleRecord, RawPage};
use crate::scraper::cleaner::{
    ArticleFilter, clean_text, date_part, site_and_domain, word_count, year_from_url, year_of,
};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

fn sel(s: &str) -> Selector {
    Selector::parse(s).expect("static selector")
}

static P: Lazy<Selector> = Lazy::new(|| sel("p"));
static META_PUBLISHED: Lazy<Selector> =
    Lazy::new(|| sel(r#"meta[property="article:published_time"]"#));
static JSON_LD: Lazy<Selector> = Lazy::new(|| sel(r#"script[type="application/ld+json"]"#));
static OG_TITLE: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="og:title"]"#));
static TITLE: Lazy<Selector> = Lazy::new(|| sel("title"));
static H1: Lazy<Selector> = Lazy::new(|| sel("h1"));

pub struct Extractor {
    filter: ArticleFilter,
    min_paragraphs: usize,
}

impl Extractor {
    pub fn new(filter: ArticleFilter, min_paragraphs: usize) -> Self {
        Self { filter, min_paragraphs }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(ArticleFilter::from_config(config), config.min_paragraphs)
    }

    /// URL-shape check, usable before any network traffic.
    pub fn check_url(&self, url: &str) -> Result<(), ExtractError> {
        if self.filter.accepts(url) {
            Ok(())
        } else {
            Err(ExtractError::NotAnArticle)
        }
    }

    pub fn extract(&self, url: &str, page: &RawPage) -> Result<ArticleRecord, ExtractError> {
        self.check_url(url)?;

        let doc = Html::parse_document(&page.html);
        let paragraphs: Vec<String> = doc
            .select(&P)
            .map(|p| p.text().collect::<String>())
            .collect();

        if paragraphs.len() < self.min_paragraphs {
            return Err(ExtractError::TooShort {
                found: paragraphs.len(),
                required: self.min_paragraphs,
            });
        }

        let body_text = paragraphs.join(" ").trim().to_string();
        if body_text.is_empty() {
            return Err(ExtractError::EmptyBody);
        }

        let published_date = meta_published_date(&doc)
            .or_else(|| json_ld_published_date(&doc))
            .or_else(|| year_from_url(url));
        let year = published_date.as_deref().and_then(year_of);
        let (source_site, domain) = site_and_domain(url).unwrap_or_default();

        Ok(ArticleRecord {
            url: url.to_string(),
            source_site,
            domain,
            year,
            published_date,
            headline: headline(&doc),
            word_count: word_count(&body_text),
            paragraph_count: paragraphs.len(),
            body_text,
            ..Default::default()
        })
    }
}

// ── Dates ─────────────────────────────────────────────────────────────────────

fn meta_published_date(doc: &Html) -> Option<String> {
    doc.select(&META_PUBLISHED)
        .next()
        .and_then(|m| m.value().attr("content"))
        .and_then(date_part)
}

fn json_ld_published_date(doc: &Html) -> Option<String> {
    doc.select(&JSON_LD).find_map(|script| {
        let raw = script.text().collect::<String>();
        let data: Value = serde_json::from_str(raw.trim()).ok()?;
        find_date_published(&data)
    })
}

/// Looks at the object itself, array members and `@graph` members.
fn find_date_published(v: &Value) -> Option<String> {
    match v {
        Value::Object(map) => map
            .get("datePublished")
            .and_then(Value::as_str)
            .and_then(date_part)
            .or_else(|| map.get("@graph").and_then(find_date_published)),
        Value::Array(items) => items.iter().find_map(find_date_published),
        _ => None,
    }
}

// ── Headline ──────────────────────────────────────────────────────────────────

fn headline(doc: &Html) -> Option<String> {
    doc.select(&OG_TITLE)
        .next()
        .and_then(|m| m.value().attr("content"))
        .and_then(clean_text)
        .or_else(|| first_text(doc, &TITLE))
        .or_else(|| first_text(doc, &H1))
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .and_then(|el| clean_text(&el.text().collect::<String>()))
}
