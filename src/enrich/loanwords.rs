//! English loanwords in German prose.

use super::Enricher;
use super::language::LanguageIdentifier;
use super::tokenizer::Tokenizer;
use crate::models::{Enrichment, LoanwordStats};
use crate::scraper::cleaner::word_count;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

pub struct LoanwordDetector {
    tokenizer: Arc<dyn Tokenizer>,
    identifier: Arc<dyn LanguageIdentifier>,
    min_len: usize,
    target_language: String,
}

impl LoanwordDetector {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        identifier: Arc<dyn LanguageIdentifier>,
        min_len: usize,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            tokenizer,
            identifier,
            min_len,
            target_language: target_language.into(),
        }
    }

    fn is_candidate(&self, word: &str) -> bool {
        word.len() >= self.min_len && word.chars().all(|c| c.is_ascii_alphabetic())
    }

    /// Lower-cased hits in text order, at most one per whitespace word.
    ///
    /// `Team/Meeting/Deadline` is one word of running text and counts once
    /// (its first English token), so `count <= word_count` and the density
    /// stays within `0..=1`.
    pub fn detect(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .filter_map(|word| {
                self.tokenizer
                    .tokenize(word)
                    .into_iter()
                    .filter(|t| t.is_alpha && !t.is_stop && self.is_candidate(&t.text))
                    .find_map(|t| self.english(&t.text))
            })
            .collect()
    }

    fn english(&self, token: &str) -> Option<String> {
        match self.identifier.identify(token) {
            Ok(lang) if lang == self.target_language => Some(token.to_lowercase()),
            Ok(_) => None,
            Err(e) => {
                trace!(word = %token, error = %e, "Skipping token");
                None
            }
        }
    }

    pub fn analyse(&self, text: &str) -> LoanwordStats {
        let loanwords = self.detect(text);
        summarise(loanwords, word_count(text))
    }
}

#[async_trait]
impl Enricher for LoanwordDetector {
    fn name(&self) -> &'static str {
        "loanwords"
    }

    async fn enrich(&self, text: &str) -> Enrichment {
        Enrichment {
            loanwords: Some(self.analyse(text)),
            ..Default::default()
        }
    }
}

// ── Aggregates ────────────────────────────────────────────────────────────────

pub fn summarise(loanwords: Vec<String>, word_count: usize) -> LoanwordStats {
    let count = loanwords.len();
    let density = if word_count > 0 {
        round4(count as f64 / word_count as f64)
    } else {
        0.0
    };

    LoanwordStats {
        all_loanwords: distinct(&loanwords),
        top_loanwords: top_n(&loanwords, 3),
        loanwords,
        count,
        density,
    }
}

pub fn distinct(words: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    words.iter().filter(|w| seen.insert(w.as_str())).cloned().collect()
}

/// Most frequent first; equal counts keep first-occurrence order.
pub fn top_n(words: &[String], n: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, w) in words.iter().enumerate() {
        counts.entry(w.as_str()).or_insert((0, i)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> =
        counts.into_iter().map(|(w, (c, first))| (w, c, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(n).map(|(w, _, _)| w.to_string()).collect()
}

pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::tokenizer::GermanTokenizer;
    use crate::error::ClassifierError;

    /// Calls anything in its word list English and fails on "Xerox".
    struct ListIdentifier(Vec<&'static str>);

    impl LanguageIdentifier for ListIdentifier {
        fn identify(&self, word: &str) -> Result<String, ClassifierError> {
            if word == "Xerox" {
                return Err(ClassifierError::Undetectable);
            }
            let lower = word.to_lowercase();
            Ok(if self.0.contains(&lower.as_str()) { "eng" } else { "deu" }.to_string())
        }
    }

    fn detector() -> LoanwordDetector {
        LoanwordDetector::new(
            Arc::new(GermanTokenizer),
            Arc::new(ListIdentifier(vec!["meeting", "team", "cool", "app", "deadline"])),
            4,
            "eng",
        )
    }

    #[test]
    fn test_detect_filters_and_lowercases() {
        let text = "Das Team hatte ein Meeting über die Deadline. Xerox war cool, die App nicht.";
        assert_eq!(detector().detect(text), vec!["team", "meeting", "deadline", "cool"]);
    }

    #[test]
    fn test_top_loanwords_ranking() {
        let words: Vec<String> = ["app", "App", "cool", "app"]
            .iter()
            .map(|w| w.to_lowercase())
            .collect();
        assert_eq!(top_n(&words, 3), vec!["app", "cool"]);
    }

    #[test]
    fn test_top_n_ties_keep_first_occurrence() {
        let words: Vec<String> = ["b", "a", "c", "a", "b", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(top_n(&words, 3), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_density_bounds_and_rounding() {
        let text = "Das Team hatte ein Meeting mit dem Team über eine Deadline heute";
        let stats = detector().analyse(text);
        let wc = word_count(text);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.all_loanwords, vec!["team", "meeting", "deadline"]);
        assert!((0.0..=1.0).contains(&stats.density));
        assert!((stats.density - stats.count as f64 / wc as f64).abs() < 5e-5);
    }

    #[test]
    fn test_compound_word_counts_once() {
        let detector = LoanwordDetector::new(
            Arc::new(GermanTokenizer),
            Arc::new(ListIdentifier(vec!["team", "meeting", "deadline", "startup", "pitch"])),
            4,
            "eng",
        );
        let stats = detector.analyse("Team/Meeting/Deadline Startup-Pitch");
        assert_eq!(stats.loanwords, vec!["team", "startup"]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.density, 1.0);
    }

    #[test]
    fn test_empty_text_has_zero_density() {
        let stats = summarise(Vec::new(), 0);
        assert_eq!(stats.density, 0.0);
        assert!(stats.top_loanwords.is_empty());
    }

    #[test]
    fn test_enricher_sets_only_loanword_fields() {
        let e = tokio_test::block_on(detector().enrich("Ein cooles Meeting heute"));
        assert!(e.sentiment.is_none());
        assert_eq!(e.loanwords.unwrap().loanwords, vec!["meeting"]);
    }
}
