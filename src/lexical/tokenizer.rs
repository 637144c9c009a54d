//! Tokenisation: lowercase → word extraction → stop-word removal → pure-numeric
//! drop → Snowball-English stem.

use super::stemmer::Stemmer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Elasticsearch/Lucene standard English stop-word list.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-z0-9]+(?:-[a-z0-9]+)*\b").unwrap());
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9-]+$").unwrap());

/// Tokenize `text` into stemmed, stopword-free terms.
pub fn tokenize(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lower = text.to_lowercase();
    let stemmer = Stemmer::new();

    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| !STOPWORD_SET.contains(t) && !NUMERIC_RE.is_match(t))
        .map(|t| stemmer.stem(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_stopwords_and_stems() {
        let tokens = tokenize("Kubernetes-based deployment strategies!");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.contains(&"deploy".to_string()) || tokens.iter().any(|t| t.starts_with("deploy")));
    }

    #[test]
    fn keeps_alphanumeric_but_drops_pure_numbers() {
        let tokens = tokenize("BM25 scores: 0.95, 0.87, 0.73");
        assert!(tokens.iter().any(|t| t.contains("bm25")));
        assert!(!tokens.iter().any(|t| t == "95" || t == "0"));
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("").is_empty());
    }
}
