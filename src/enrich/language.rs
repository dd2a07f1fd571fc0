use crate::error::ClassifierError;
use tracing::warn;
use whatlang::{Detector, Lang};

/// Word-level language identification. Returns an ISO 639-3 code.
pub trait LanguageIdentifier: Send + Sync {
    fn identify(&self, word: &str) -> Result<String, ClassifierError>;
}

/// Trigram-based identification via `whatlang`.
pub struct WhatlangIdentifier {
    detector: Detector,
}

impl WhatlangIdentifier {
    pub fn new(allowlist: &[String]) -> Self {
        let langs: Vec<Lang> = allowlist
            .iter()
            .filter_map(|code| {
                let lang = Lang::from_code(code);
                if lang.is_none() {
                    warn!(code = %code, "Unknown language code in allowlist");
                }
                lang
            })
            .collect();

        let detector = if langs.is_empty() {
            Detector::new()
        } else {
            Detector::with_allowlist(langs)
        };
        Self { detector }
    }
}

impl LanguageIdentifier for WhatlangIdentifier {
    fn identify(&self, word: &str) -> Result<String, ClassifierError> {
        self.detector
            .detect(word)
            .map(|info| info.lang().code().to_string())
            .ok_or(ClassifierError::Undetectable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_restricts_answers() {
        let id = WhatlangIdentifier::new(&["eng".to_string(), "deu".to_string()]);
        let code = id
            .identify("The quick brown fox jumps over the lazy dog and keeps running")
            .unwrap();
        assert_eq!(code, "eng");
    }

    #[test]
    fn test_empty_input_is_undetectable() {
        let id = WhatlangIdentifier::new(&[]);
        assert_eq!(id.identify(""), Err(ClassifierError::Undetectable));
    }
}
