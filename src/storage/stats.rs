//! Aggregates over the article ledger for the `stats` command.

use crate::enrich::loanwords::{round4, top_n};
use crate::models::ArticleRecord;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorpusStats {
    pub articles: usize,
    pub sites: usize,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub total_words: usize,
    pub total_loanwords: usize,
    pub mean_density: f64,
    pub top_loanwords: Vec<String>,
}

impl CorpusStats {
    pub fn from_rows(rows: &[ArticleRecord], top: usize) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let years = rows.iter().filter_map(|r| r.year);
        let mut sites: Vec<&str> = rows.iter().map(|r| r.source_site.as_str()).collect();
        sites.sort_unstable();
        sites.dedup();

        let all: Vec<String> = rows.iter().flat_map(|r| r.loanwords.iter().cloned()).collect();
        let density_sum: f64 = rows.iter().map(|r| r.loanword_density).sum();

        Self {
            articles: rows.len(),
            sites: sites.len(),
            first_year: years.clone().min(),
            last_year: years.max(),
            total_words: rows.iter().map(|r| r.word_count).sum(),
            total_loanwords: rows.iter().map(|r| r.loanword_count).sum(),
            mean_density: round4(density_sum / rows.len() as f64),
            top_loanwords: top_n(&all, top),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(site: &str, year: Option<i32>, words: &[&str], wc: usize) -> ArticleRecord {
        let loanwords: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        ArticleRecord {
            source_site: site.into(),
            year,
            word_count: wc,
            loanword_count: loanwords.len(),
            loanword_density: loanwords.len() as f64 / wc as f64,
            loanwords,
            ..Default::default()
        }
    }

    #[test]
    fn test_aggregates() {
        let rows = vec![
            row("a.de", Some(2021), &["team", "app"], 10),
            row("a.de", None, &["app"], 20),
            row("b.de", Some(2024), &[], 5),
        ];
        let s = CorpusStats::from_rows(&rows, 2);
        assert_eq!(s.articles, 3);
        assert_eq!(s.sites, 2);
        assert_eq!((s.first_year, s.last_year), (Some(2021), Some(2024)));
        assert_eq!(s.total_words, 35);
        assert_eq!(s.total_loanwords, 3);
        assert_eq!(s.mean_density, 0.0833);
        assert_eq!(s.top_loanwords, vec!["app", "team"]);
    }

    #[test]
    fn test_empty_ledger() {
        assert_eq!(CorpusStats::from_rows(&[], 5), CorpusStats::default());
    }
}
