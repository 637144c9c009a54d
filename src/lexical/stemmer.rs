//! Thin wrapper over the Snowball English stemmer so callers never touch
//! `rust_stemmers` directly.

use rust_stemmers::{Algorithm, Stemmer as SnowballStemmer};

pub struct Stemmer(SnowballStemmer);

impl Stemmer {
    pub fn new() -> Self {
        Self(SnowballStemmer::create(Algorithm::English))
    }

    pub fn stem(&self, word: &str) -> String {
        self.0.stem(word).into_owned()
    }
}

impl Default for Stemmer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_common_suffixes() {
        let stemmer = Stemmer::new();
        assert_eq!(stemmer.stem("running"), "run");
        assert_eq!(stemmer.stem("deployment"), "deploy");
    }
}
