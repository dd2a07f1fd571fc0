use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub is_alpha: bool,
    pub is_stop: bool,
}

/// Target-language tokenization with alphabetic and stop-word flags.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;
}

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\p{L}+|\p{N}+|[^\s\p{L}\p{N}]").expect("static regex"));

static GERMAN_STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    include_str!("german_stop_words.txt")
        .split_whitespace()
        .collect()
});

/// Splits German prose into letter runs, digit runs and single punctuation
/// marks; a letter run is a stop word if its lower-cased form is listed.
#[derive(Debug, Default, Clone)]
pub struct GermanTokenizer;

impl Tokenizer for GermanTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        TOKEN_RE
            .find_iter(text)
            .map(|m| {
                let t = m.as_str();
                let is_alpha = t.chars().all(char::is_alphabetic);
                Token {
                    text: t.to_string(),
                    is_alpha,
                    is_stop: is_alpha && GERMAN_STOP_WORDS.contains(t.to_lowercase().as_str()),
                }
            })
            .collect()
    }
}
