//! Retriever trait — the abstraction over a searchable document corpus.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// A passage of a corpus document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Stable ID, unique within the corpus
    pub id: String,

    /// Where the passage came from (path or URL)
    pub source: String,

    pub content: String,

    /// Relevance to the query that returned it (higher is better)
    #[serde(default)]
    pub score: f32,
}

/// Ranked lookup of passages by free text.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `limit` passages ordered by descending relevance.
    /// An empty result means nothing in the corpus matched.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<Passage>, RetrievalError>;
}
