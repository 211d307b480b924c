//! # Embedding index
//!
//! Exact nearest-neighbor search over the methodology corpus.
//!
//! The index embeds every [`CorpusEntry`] once at construction through an
//! [`Embedder`], keeps the vectors next to their entries, and answers queries by cosine
//! similarity against all of them. The corpus is six documents, so a linear scan is exact,
//! deterministic and instant; no approximate structure is needed.
//!
//! ## Guarantees
//! - **All-or-nothing build**: if any entry fails to embed, [`EmbeddingIndex::build`]
//!   returns the error and no index exists.
//! - **Read-only afterwards**: there is no insert or delete. Share it as
//!   `Arc<EmbeddingIndex>` across sessions.
//! - **Stable ranking**: results are sorted by descending score; equal scores keep corpus
//!   insertion order.
//!
//! ## Quick Example
//! ```rust
//! use std::sync::Arc;
//! use eque::{corpus, embeddings::HashingEmbedder, vector_store::EmbeddingIndex};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() -> eque::error::Result<()> {
//! let index = EmbeddingIndex::build(corpus::methodologies(), Arc::new(HashingEmbedder::default())).await?;
//! let hits = index.query("How do I give feedback?", 3).await?;
//! assert_eq!(hits.len(), 3);
//! # Ok(()) }
//! ```

use std::{cmp::Ordering, sync::Arc};
use tracing::{debug, info};

use crate::corpus::CorpusEntry;
use crate::embeddings::Embedder;
use crate::error::{CoachError, Result};

/// A corpus entry paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: CorpusEntry,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Immutable embedding index over a fixed corpus.
pub struct EmbeddingIndex {
    /// Entries with their vectors, in insertion order.
    entries: Vec<(CorpusEntry, Vec<f32>)>,
    /// Shared vector length; `0` for an empty index.
    dimension: usize,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingIndex {
    /// Embed every entry and build the index.
    ///
    /// # Errors
    /// [`CoachError::EmbeddingService`] if any embedding call fails or the backend returns
    /// vectors of differing lengths.
    pub async fn build(entries: Vec<CorpusEntry>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut indexed = Vec::with_capacity(entries.len());
        let mut dimension = 0;

        for entry in entries {
            let vector = embedder.embed(&entry.content).await.map_err(|e| match e {
                CoachError::EmbeddingService(msg) => {
                    CoachError::EmbeddingService(format!("embedding {:?}: {msg}", entry.title))
                }
                other => other,
            })?;

            if dimension == 0 {
                dimension = vector.len();
            } else if vector.len() != dimension {
                return Err(CoachError::EmbeddingService(format!(
                    "embedding {:?} has {} dimensions, expected {dimension}",
                    entry.title,
                    vector.len()
                )));
            }
            indexed.push((entry, vector));
        }

        info!(
            entries = indexed.len(),
            dimension,
            model = embedder.model_name(),
            "Built methodology index"
        );

        Ok(Self {
            entries: indexed,
            dimension,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed `text` and return its `k` most similar entries.
    ///
    /// `k` larger than the corpus is clamped. An empty index yields no results without
    /// calling the embedder.
    ///
    /// # Errors
    /// - [`CoachError::Validation`] when `k == 0`.
    /// - [`CoachError::EmbeddingService`] when the query cannot be embedded.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredEntry>> {
        if k == 0 {
            return Err(CoachError::Validation("k must be at least 1".into()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(text).await?;
        self.search_vector(&vector, k)
    }

    /// Rank all entries against an already embedded query.
    ///
    /// # Errors
    /// - [`CoachError::Validation`] when `k == 0`.
    /// - [`CoachError::EmbeddingService`] when `vector` does not match the index dimension.
    pub fn search_vector(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if k == 0 {
            return Err(CoachError::Validation("k must be at least 1".into()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimension {
            return Err(CoachError::EmbeddingService(format!(
                "query has {} dimensions, index has {}",
                vector.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, v))| (i, cosine_similarity(vector, v)))
            .collect();

        // stable: ties stay in insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k.min(self.entries.len()));

        debug!(?scored, "Ranked corpus entries");

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredEntry {
                entry: self.entries[i].0.clone(),
                score,
            })
            .collect())
    }
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns `0.0` for mismatched lengths, empty input or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}
