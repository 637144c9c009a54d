//! Lexical Analyser (C4): tokenize → stopword removal → stem → term-frequency
//! index, the input side of the Simplified BM25 Scorer (C9).

mod index;
mod stemmer;
mod tokenizer;

pub use index::{build_lexical_index, token_count};
pub use tokenizer::tokenize;
