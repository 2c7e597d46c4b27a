use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

use crate::config::AnalyzerConfig;

/// Text tokenizer used for `text` fields and their term queries
#[derive(Clone, Debug)]
pub struct Tokenizer {
    config: AnalyzerConfig,
}

impl Tokenizer {
    /// Create a new tokenizer from configuration
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Tokenize text into a vector of terms
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|word| {
                if self.config.lowercase {
                    word.to_lowercase()
                } else {
                    word.to_string()
                }
            })
            .filter(|token| {
                let len = token.chars().count();
                len >= self.config.min_token_length && len <= self.config.max_token_length
            })
            .collect()
    }

    /// Get unique terms from text, in order of first occurrence
    pub fn unique_terms(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokenize(text)
            .into_iter()
            .filter(|token| seen.insert(token.clone()))
            .collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&AnalyzerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokenization() {
        let tokenizer = Tokenizer::default();
        let tokens = tokenizer.tokenize("Hello World! This is a test.");

        assert_eq!(tokens, vec!["hello", "world", "this", "is", "a", "test"]);
    }

    #[test]
    fn test_case_preserved_without_lowercase() {
        let config = AnalyzerConfig {
            lowercase: false,
            ..Default::default()
        };
        let tokenizer = Tokenizer::new(&config);

        assert_eq!(tokenizer.tokenize("One Hundred"), vec!["One", "Hundred"]);
    }

    #[test]
    fn test_unique_terms() {
        let tokenizer = Tokenizer::default();
        let terms = tokenizer.unique_terms("two hundred two");

        assert_eq!(terms, vec!["two", "hundred"]);
    }

    #[test]
    fn test_min_max_token_length() {
        let config = AnalyzerConfig {
            lowercase: true,
            min_token_length: 3,
            max_token_length: 5,
        };

        let tokenizer = Tokenizer::new(&config);
        let tokens = tokenizer.tokenize("a ab abc abcd abcde abcdef");

        assert_eq!(tokens, vec!["abc", "abcd", "abcde"]);
    }
}
