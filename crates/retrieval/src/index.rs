//! Keyword index — TF-IDF ranking over lowercased terms.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tandem_core::error::RetrievalError;
use tandem_core::retrieval::{Passage, Retriever};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::chunk::split_passages;
use crate::corpus::load_corpus;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "me", "of", "on", "or", "the", "this", "to", "what", "when", "which",
    "who", "why", "with", "you", "your",
];

/// An in-memory passage index ranked by keyword relevance.
pub struct KeywordIndex {
    passages: Vec<Passage>,
    term_counts: Vec<HashMap<String, u32>>,
    doc_freq: HashMap<String, u32>,
}

impl KeywordIndex {
    pub fn new(passages: Vec<Passage>) -> Self {
        let term_counts: Vec<HashMap<String, u32>> = passages
            .iter()
            .map(|p| {
                let mut counts = HashMap::new();
                for term in tokenize(&p.content) {
                    *counts.entry(term).or_insert(0) += 1;
                }
                counts
            })
            .collect();

        let mut doc_freq = HashMap::new();
        for counts in &term_counts {
            for term in counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        Self {
            passages,
            term_counts,
            doc_freq,
        }
    }

    /// Load, split and index the corpus at `location`.
    pub async fn from_source(location: &str, chunk_chars: usize) -> Result<Self, RetrievalError> {
        let docs = load_corpus(location).await?;
        let passages: Vec<Passage> = docs
            .iter()
            .flat_map(|d| split_passages(d, chunk_chars))
            .collect();
        debug!(source = location, passages = passages.len(), "Indexed corpus");
        Ok(Self::new(passages))
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    fn rank(&self, text: &str, limit: usize) -> Vec<Passage> {
        let terms: HashSet<String> = tokenize(text).collect();
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let n = self.passages.len() as f32;
        let mut scored: Vec<(usize, f32)> = self
            .term_counts
            .iter()
            .enumerate()
            .filter_map(|(i, counts)| {
                let length: u32 = counts.values().sum();
                let score: f32 = terms
                    .iter()
                    .filter_map(|t| {
                        let tf = *counts.get(t)? as f32;
                        let df = *self.doc_freq.get(t)? as f32;
                        let idf = ((n + 1.0) / (df + 0.5)).ln();
                        Some((tf / (tf + 1.2)) * idf)
                    })
                    .sum();
                // Favour passages that are dense in query terms
                let score = score / (1.0 + (length as f32 / 200.0)).sqrt();
                (score > 0.0).then_some((i, score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(i, score)| Passage {
                score,
                ..self.passages[i].clone()
            })
            .collect()
    }
}

#[async_trait]
impl Retriever for KeywordIndex {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<Passage>, RetrievalError> {
        Ok(self.rank(text, limit))
    }
}

/// A [`KeywordIndex`] built from its source on first query.
///
/// A failed load is not cached; the next query tries again.
pub struct LazyKeywordIndex {
    location: String,
    chunk_chars: usize,
    index: OnceCell<KeywordIndex>,
}

impl LazyKeywordIndex {
    pub fn new(location: impl Into<String>, chunk_chars: usize) -> Self {
        Self {
            location: location.into(),
            chunk_chars,
            index: OnceCell::new(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_loaded(&self) -> bool {
        self.index.initialized()
    }
}

#[async_trait]
impl Retriever for LazyKeywordIndex {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<Passage>, RetrievalError> {
        let index = self
            .index
            .get_or_try_init(|| KeywordIndex::from_source(&self.location, self.chunk_chars))
            .await?;
        Ok(index.rank(text, limit))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.chars().count() > 1)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
}
