//! Semantic retrieval over the event corpus.
//!
//! Combines an embedder, the vector index, and the corpus to answer
//! "top-k events most similar to this query". The corpus and index travel
//! together as a [`KnowledgeBase`] so their positional alignment can never
//! be broken by updating one without the other.

use crate::corpus::{Corpus, EventRecord};
use crate::embeddings::Embedder;
use crate::error::{IndexError, QueryError, Result};
use crate::index::VectorIndex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The read-only (corpus, index) pair. Invariant: `index.len() == corpus.len()`
/// and vector `i` embeds record `i`'s `combined_text`.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    corpus: Corpus,
    index: VectorIndex,
}

impl KnowledgeBase {
    /// Embed every record's `combined_text` and build the index alongside
    /// the corpus.
    pub fn build(corpus: Corpus, embedder: &dyn Embedder) -> Result<Self> {
        let texts: Vec<&str> = corpus
            .records()
            .iter()
            .map(|r| r.combined_text.as_str())
            .collect();
        let vectors = embedder.embed_batch(&texts)?;
        let index = VectorIndex::build(vectors)?;
        debug!(
            records = corpus.len(),
            dimensions = index.dimensions(),
            "Built knowledge base"
        );
        Ok(Self { corpus, index })
    }

    /// Pair a corpus with a previously persisted index. Rejects snapshots
    /// whose vector count does not match the corpus.
    pub fn from_parts(corpus: Corpus, index: VectorIndex) -> Result<Self> {
        if index.len() != corpus.len() {
            return Err(IndexError::Corrupt {
                message: format!(
                    "snapshot has {} vectors but corpus has {} records",
                    index.len(),
                    corpus.len()
                ),
            }
            .into());
        }
        Ok(Self { corpus, index })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

/// A retrieved event paired with its squared L2 distance from the query
/// (lower = more similar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedEvent {
    pub record: EventRecord,
    pub distance: f32,
}

/// Retrieve the `k` events most similar to `query_text`, ascending by
/// distance.
///
/// Rejects empty or whitespace-only queries and `k < 1`; a `k` larger than
/// the corpus is clamped rather than rejected. Embedding failures propagate
/// unchanged — embedding is deterministic for a given input, so retrying
/// here would be pointless.
pub fn retrieve(
    query_text: &str,
    k: usize,
    embedder: &dyn Embedder,
    knowledge: &KnowledgeBase,
) -> Result<Vec<RetrievedEvent>> {
    if query_text.trim().is_empty() {
        return Err(QueryError::Empty.into());
    }
    if k < 1 {
        return Err(IndexError::InvalidK { k }.into());
    }

    let effective_k = k.min(knowledge.len());
    if effective_k < k {
        debug!(
            requested = k,
            clamped = effective_k,
            "top_k exceeds corpus size, clamping"
        );
    }

    let embedding = embedder.embed(query_text)?;
    let hits = knowledge.index().search(&embedding, effective_k)?;

    let mut results = Vec::with_capacity(hits.len());
    for (position, distance) in hits {
        let record = knowledge.corpus().get(position)?.clone();
        results.push(RetrievedEvent { record, distance });
    }

    debug!(
        query_len = query_text.len(),
        returned = results.len(),
        "Retrieval complete"
    );
    Ok(results)
}
