use crate::config::TokenizerConfig;
use crate::error::Result;
use crate::vocabulary::Vocabulary;
use crate::Prime;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    /// Alphanumeric runs; everything else separates tokens.
    pub static ref WORD_RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could","did","do","does","doing","down","during",
            "each","few","for","from","further","had","has","have","having","he","her","here","hers",
            "herself","him","himself","his","how","i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself","no","nor","not","of","off","on","once","only","or",
            "other","ought","our","ours","ourselves","out","over","own","same","she","should","so",
            "some","such","than","that","the","their","theirs","them","themselves","then","there",
            "these","they","this","those","through","to","too","under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with",
            "would","you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Lowercased words of `text` in order, after the configured normalization.
pub fn words(text: &str, config: &TokenizerConfig) -> Vec<String> {
    let lowered = if config.unicode_normalize {
        text.nfkc().collect::<String>().to_lowercase()
    } else {
        text.to_lowercase()
    };
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| !(config.remove_stopwords && STOPWORDS.contains(w)))
        .map(|w| if config.stem { STEMMER.stem(w).into_owned() } else { w.to_string() })
        .collect()
}

/// Turns text into prime sequences against a shared vocabulary.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocabulary: Arc<Vocabulary>,
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(vocabulary: Arc<Vocabulary>, config: TokenizerConfig) -> Self {
        Self { vocabulary, config }
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn words(&self, text: &str) -> Vec<String> {
        words(text, &self.config)
    }

    /// Primes for every word of `text`, assigning new ones for unseen words.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Prime>> {
        self.vocabulary.intern_all(&self.words(text))
    }

    /// Primes for the words already in the vocabulary; unseen words are skipped.
    pub fn tokenize_readonly(&self, text: &str) -> Vec<Prime> {
        self.vocabulary.lookup_all(&self.words(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_non_word_characters() {
        let w = words("Hello, world! It's 2024...", &TokenizerConfig::default());
        assert_eq!(w, vec!["hello", "world", "it", "s", "2024"]);
    }

    #[test]
    fn symbols_only_yield_nothing() {
        let tokenizer = Tokenizer::new(Arc::new(Vocabulary::new()), TokenizerConfig::default());
        assert!(tokenizer.tokenize("--- !!! ...").unwrap().is_empty());
        assert!(tokenizer.vocabulary().is_empty());
    }
}
