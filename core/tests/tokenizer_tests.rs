use resonant_core::tokenizer::{words, Tokenizer};
use resonant_core::{TokenizerConfig, Vocabulary};
use std::collections::HashSet;
use std::sync::Arc;

fn tokenizer(config: TokenizerConfig) -> Tokenizer {
    Tokenizer::new(Arc::new(Vocabulary::new()), config)
}

#[test]
fn same_word_gets_same_prime() {
    let t = tokenizer(TokenizerConfig::default());
    let first = t.tokenize("Rust loves primes").unwrap();
    let second = t.tokenize("primes, RUST!").unwrap();
    assert_eq!(first[0], second[1]);
    assert_eq!(first[2], second[0]);
}

#[test]
fn distinct_words_never_share_a_prime() {
    let t = tokenizer(TokenizerConfig::default());
    let text = "one two three four five six seven eight nine ten eleven twelve";
    let primes = t.tokenize(text).unwrap();
    let unique: HashSet<_> = primes.iter().collect();
    assert_eq!(unique.len(), 12);
    let mut sorted = primes.clone();
    sorted.sort();
    assert_eq!(sorted, primes, "primes are handed out in increasing order");
}

#[test]
fn readonly_skips_unseen_words_and_leaves_vocabulary_alone() {
    let t = tokenizer(TokenizerConfig::default());
    let known = t.tokenize("cat sat").unwrap();
    let before = t.vocabulary().len();
    assert_eq!(t.tokenize_readonly("the cat sat down"), known);
    assert_eq!(t.vocabulary().len(), before);
}

#[test]
fn it_normalizes_and_optionally_stems() {
    let plain = words("Running Runners RUN! The ﬁne café", &TokenizerConfig::default());
    assert!(plain.contains(&"running".to_string()));
    assert!(plain.contains(&"fine".to_string()), "NFKC folds the ligature");
    assert!(plain.contains(&"the".to_string()));

    let stemmed = words(
        "Running Runners RUN! The café",
        &TokenizerConfig { stem: true, remove_stopwords: true, ..TokenizerConfig::default() },
    );
    assert!(stemmed.contains(&"run".to_string()));
    assert!(!stemmed.contains(&"the".to_string()));
}

#[test]
fn fresh_vocabularies_assign_identically() {
    let a = tokenizer(TokenizerConfig::default()).tokenize("to be or not to be").unwrap();
    let b = tokenizer(TokenizerConfig::default()).tokenize("to be or not to be").unwrap();
    assert_eq!(a, b);
}
