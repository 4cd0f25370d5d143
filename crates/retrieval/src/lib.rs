//! Retrieval for Tandem — load a document corpus, split it into passages
//! and rank passages against free-text questions.
//!
//! The corpus may be a single file, a directory of text files, or an
//! http(s) URL. Ranking is keyword based (TF-IDF over lowercased terms).

pub mod chunk;
pub mod corpus;
pub mod index;

pub use chunk::split_passages;
pub use corpus::{Document, load_corpus};
pub use index::{KeywordIndex, LazyKeywordIndex};
