//! # Retriever
//!
//! Turns a user utterance into the reference text spliced into the prompt: the top
//! [`DEFAULT_TOP_K`] methodologies from the [`EmbeddingIndex`], best first, each block
//! headed by its title and separated by [`CONTEXT_SEPARATOR`].

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::vector_store::{EmbeddingIndex, ScoredEntry};

/// Number of methodologies retrieved per turn.
pub const DEFAULT_TOP_K: usize = 3;

/// Placed between retrieved blocks.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Read-only view over a shared index.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<EmbeddingIndex>) -> Self {
        Self {
            index,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Override how many entries are retrieved. Zero is rejected at query time.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The ranked entries for `query`.
    pub async fn retrieve_scored(&self, query: &str) -> Result<Vec<ScoredEntry>> {
        self.index.query(query, self.top_k).await
    }

    /// Retrieved context as prompt-ready text; empty when the index is empty.
    pub async fn retrieve(&self, query: &str) -> Result<String> {
        let hits = self.retrieve_scored(query).await?;
        debug!(
            titles = ?hits.iter().map(|h| h.entry.title.as_str()).collect::<Vec<_>>(),
            "Retrieved context"
        );
        Ok(format_context(&hits))
    }
}

/// Join ranked entries into one block of text, preserving their order.
pub fn format_context(hits: &[ScoredEntry]) -> String {
    hits.iter()
        .map(|h| format!("{}:\n{}", h.entry.title, h.entry.content))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{CorpusEntry, methodologies};
    use crate::embeddings::HashingEmbedder;

    async fn retriever() -> Retriever {
        let index = EmbeddingIndex::build(methodologies(), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();
        Retriever::new(Arc::new(index))
    }

    #[tokio::test]
    async fn retrieves_three_blocks_in_score_order() {
        let retriever = retriever().await;
        let hits = retriever
            .retrieve_scored("How do I handle conflict?")
            .await
            .unwrap();
        let text = retriever.retrieve("How do I handle conflict?").await.unwrap();

        let blocks: Vec<_> = text.split(CONTEXT_SEPARATOR).collect();
        assert_eq!(blocks.len(), 3);
        for (block, hit) in blocks.iter().zip(&hits) {
            assert!(block.starts_with(&format!("{}:\n", hit.entry.title)));
            assert!(block.ends_with(&hit.entry.content));
        }
    }

    #[tokio::test]
    async fn retrieval_is_deterministic() {
        let a = retriever().await.retrieve("I want to be more persuasive").await.unwrap();
        let b = retriever().await.retrieve("I want to be more persuasive").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn empty_index_yields_empty_context() {
        let index = EmbeddingIndex::build(Vec::new(), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();
        let retriever = Retriever::new(Arc::new(index));
        assert_eq!(retriever.retrieve("anything").await.unwrap(), "");
    }

    #[test]
    fn format_context_keeps_order() {
        let hits = vec![
            ScoredEntry {
                entry: CorpusEntry::new("B", "second"),
                score: 0.9,
            },
            ScoredEntry {
                entry: CorpusEntry::new("A", "first"),
                score: 0.1,
            },
        ];
        assert_eq!(format_context(&hits), "B:\nsecond\n\n---\n\nA:\nfirst");
    }
}
