//! Text analysis for searchable text fields

mod tokenizer;

pub use tokenizer::Tokenizer;
