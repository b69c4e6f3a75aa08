//! The `Analyzer` boundary the core consumes (§6). Tokenization, stemming and
//! stop-word lists proper are an external collaborator (`spec.md` §1 Non-goals); this
//! module only defines the trait and a small default so the crate is self-contained.

use std::collections::HashSet;

/// Tokenize and clean query/document text before it reaches the FTS matcher.
pub trait Analyzer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
    fn remove_stop_words(&self, tokens: Vec<String>, language: Option<&str>) -> Vec<String>;
}

/// Unicode word-boundary tokenizer with a small built-in English stop list.
/// Deliberately minimal — a real stemmer/locale-aware analyzer is out of scope for
/// the core and is expected to be supplied by the caller via the `Analyzer` trait.
#[derive(Debug, Default)]
pub struct SimpleAnalyzer {
    stop_words: HashSet<&'static str>,
}

const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "that", "the", "to", "was", "were", "will", "with",
];

impl SimpleAnalyzer {
    pub fn new() -> Self {
        Self {
            stop_words: DEFAULT_STOP_WORDS.iter().copied().collect(),
        }
    }
}

impl Analyzer for SimpleAnalyzer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn remove_stop_words(&self, tokens: Vec<String>, language: Option<&str>) -> Vec<String> {
        // Only the built-in English list is known; other languages pass through
        // unfiltered rather than silently dropping tokens the caller cannot review.
        let is_english = matches!(language, None | Some("en") | Some("en-US") | Some("en-GB"));
        if !is_english {
            return tokens;
        }
        tokens
            .into_iter()
            .filter(|t| !self.stop_words.contains(t.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_and_lowercases() {
        let a = SimpleAnalyzer::new();
        assert_eq!(a.tokenize("Rocket Propulsion!"), vec!["rocket", "propulsion"]);
    }

    #[test]
    fn removes_english_stop_words() {
        let a = SimpleAnalyzer::new();
        let tokens = a.tokenize("the phone is in the box");
        let filtered = a.remove_stop_words(tokens, None);
        assert_eq!(filtered, vec!["phone", "box"]);
    }

    #[test]
    fn non_english_passes_through() {
        let a = SimpleAnalyzer::new();
        let tokens = vec!["le".to_string(), "chat".to_string()];
        let filtered = a.remove_stop_words(tokens.clone(), Some("fr"));
        assert_eq!(filtered, tokens);
    }
}
