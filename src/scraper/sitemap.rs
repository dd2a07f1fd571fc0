//! Sitemap index → child sitemaps → page URLs.

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

use super::SitemapSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    Index,
    UrlSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapDoc {
    pub kind: SitemapKind,
    pub locs: Vec<String>,
}

/// Collect `<loc>` entries and tell an index apart from a url set.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDoc> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut in_loc = false;
    let mut saw_index = false;
    let mut locs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"sitemapindex" {
                    saw_index = true;
                } else if name.as_ref() == b"loc" {
                    in_loc = true;
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Ok(Event::Text(t)) if in_loc => {
                let loc = t.unescape().context("Bad text in <loc>")?;
                let loc = loc.trim();
                if !loc.is_empty() {
                    locs.push(loc.to_string());
                }
            }
            Ok(Event::CData(t)) if in_loc => {
                let loc = String::from_utf8_lossy(&t).trim().to_string();
                if !loc.is_empty() {
                    locs.push(loc);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Malformed sitemap at byte {}", reader.buffer_position())
                });
            }
            _ => {}
        }
        buf.clear();
    }

    let kind = if saw_index { SitemapKind::Index } else { SitemapKind::UrlSet };
    Ok(SitemapDoc { kind, locs })
}

/// Walks a sitemap index breadth-first and returns every page URL found.
/// The root index must load; a child sitemap that fails is logged and skipped.
pub struct SitemapCrawler<'a> {
    source: &'a dyn SitemapSource,
    child_filter: Option<String>,
}

impl<'a> SitemapCrawler<'a> {
    pub fn new(source: &'a dyn SitemapSource, child_filter: Option<String>) -> Self {
        Self { source, child_filter }
    }

    fn wants_child(&self, sitemap_url: &str) -> bool {
        self.child_filter
            .as_deref()
            .is_none_or(|f| sitemap_url.contains(f))
    }

    pub async fn discover(&self, index_url: &str) -> Result<Vec<String>> {
        let mut queue: VecDeque<String> = VecDeque::from([index_url.to_string()]);
        let mut seen_sitemaps = HashSet::new();
        let mut seen_pages = HashSet::new();
        let mut pages = Vec::new();
        let mut is_root = true;

        while let Some(sitemap_url) = queue.pop_front() {
            if !seen_sitemaps.insert(sitemap_url.clone()) {
                continue;
            }

            let xml = match self.source.get_text(&sitemap_url).await {
                Ok(xml) => xml,
                Err(e) if is_root => {
                    return Err(e).with_context(|| format!("Failed to fetch sitemap index {}", sitemap_url));
                }
                Err(e) => {
                    warn!(sitemap = %sitemap_url, error = %e, "Skipping sitemap");
                    continue;
                }
            };

            let doc = match parse_sitemap(&xml) {
                Ok(doc) => doc,
                Err(e) if is_root => {
                    return Err(e).with_context(|| format!("Unparseable sitemap index {}", sitemap_url));
                }
                Err(e) => {
                    warn!(sitemap = %sitemap_url, error = %e, "Unparseable sitemap");
                    continue;
                }
            };
            is_root = false;

            match doc.kind {
                SitemapKind::Index => {
                    let children: Vec<String> =
                        doc.locs.into_iter().filter(|u| self.wants_child(u)).collect();
                    info!("{}: {} child sitemaps", sitemap_url, children.len());
                    queue.extend(children);
                }
                SitemapKind::UrlSet => {
                    debug!("{}: {} page URLs", sitemap_url, doc.locs.len());
                    for loc in doc.locs {
                        if seen_pages.insert(loc.clone()) {
                            pages.push(loc);
                        }
                    }
                }
            }
        }

        info!("Collected {} article URLs from {} sitemaps", pages.len(), seen_sitemaps.len());
        Ok(pages)
    }
}
