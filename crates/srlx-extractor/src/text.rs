//! Text primitives
//!
//! Sentence segmentation, word tokenization and stemming used around the
//! SRL annotator. The pipeline only relies on the [`TextAnalyzer`] trait;
//! [`DefaultAnalyzer`] is a regex based implementation with a Snowball
//! English stemmer.

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use srlx_core::{Result, SrlxError};

/// Trait for sentence, word and stem level text processing
pub trait TextAnalyzer: Send + Sync {
    /// Split free text into sentences
    fn sentences(&self, text: &str) -> Vec<String>;

    /// Split a sentence or phrase into word tokens
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// Reduce a word to its stem
    fn stem(&self, word: &str) -> String;

    /// Normalize a verb phrase: stem every token, keep token order
    fn normalize_verb(&self, verb: &str) -> String {
        self.tokenize(verb)
            .iter()
            .map(|word| self.stem(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Regex based analyzer with an English Snowball stemmer
pub struct DefaultAnalyzer {
    sentence: Regex,
    word: Regex,
    stemmer: Stemmer,
}

impl DefaultAnalyzer {
    /// Create a new analyzer for English text
    pub fn new() -> Result<Self> {
        let sentence = Regex::new(r"[^.!?]+(?:[.!?]+|$)")
            .map_err(|e| SrlxError::ConfigError(format!("Invalid sentence pattern: {e}")))?;
        let word = Regex::new(r"[A-Za-z0-9]+(?:['\-][A-Za-z0-9]+)*|[^\sA-Za-z0-9]")
            .map_err(|e| SrlxError::ConfigError(format!("Invalid word pattern: {e}")))?;

        Ok(Self {
            sentence,
            word,
            stemmer: Stemmer::create(Algorithm::English),
        })
    }
}

impl TextAnalyzer for DefaultAnalyzer {
    fn sentences(&self, text: &str) -> Vec<String> {
        self.sentence
            .find_iter(text)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        self.word
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn stem(&self, word: &str) -> String {
        let lower = word.to_lowercase();
        self.stemmer.stem(&lower).into_owned()
    }
}

/// Keep only ASCII characters in `1..=126`, the range the annotator accepts
pub fn ascii_only(sentence: &str) -> String {
    sentence
        .chars()
        .filter(|&c| (c as u32) > 0 && (c as u32) < 127)
        .collect()
}
