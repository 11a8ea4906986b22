//! Embedding store and provider abstraction for hybrid retrieval.
//!
//! The engine never talks to a model runtime directly: an
//! [`EmbeddingProvider`] is injected at the seam, and tests supply
//! deterministic fakes. The store is a per-generation, read-only artifact;
//! queries degrade to lexical-only scoring whenever it is absent.

use crate::ann::{AnnConfig, AnnIndex};
use crate::error::SearchError;
use crate::index::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Black-box embedding function with a defined failure mode: any timeout
/// or model error surfaces as [`SearchError::EmbeddingUnavailable`] and
/// the caller proceeds without vectors.
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;
}

/// Dense vectors for indexed documents plus an ANN graph over them.
///
/// Vectors are L2-normalized on insert so cosine similarity is a dot
/// product. Logically separate from the inverted index: an index
/// generation may ship without one.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingStore {
    dimension: usize,
    /// ANN node id -> document id.
    doc_ids: Vec<DocId>,
    by_doc: HashMap<DocId, u32>,
    ann: AnnIndex,
}

impl EmbeddingStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            doc_ids: Vec::new(),
            by_doc: HashMap::new(),
            ann: AnnIndex::new(dimension, AnnConfig::default()),
        }
    }

    pub fn with_ann_config(dimension: usize, config: AnnConfig) -> Self {
        Self {
            dimension,
            doc_ids: Vec::new(),
            by_doc: HashMap::new(),
            ann: AnnIndex::new(dimension, config),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Add a document vector. Rejects dimensionality mismatches and zero
    /// vectors with [`SearchError::EmbeddingUnavailable`]; the builder
    /// logs and continues without that document's embedding.
    pub fn insert(&mut self, doc_id: DocId, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.dimension {
            return Err(SearchError::EmbeddingUnavailable(format!(
                "vector for doc {doc_id} has dimension {}, store expects {}",
                vector.len(),
                self.dimension
            )));
        }
        let normalized = normalize(vector).ok_or_else(|| {
            SearchError::EmbeddingUnavailable(format!("zero-norm vector for doc {doc_id}"))
        })?;
        let node = self.ann.insert(&normalized);
        self.doc_ids.push(doc_id);
        self.by_doc.insert(doc_id, node);
        Ok(())
    }

    /// Cosine similarity between a normalized query vector and a stored
    /// document vector, if the document has one.
    pub fn similarity(&self, doc_id: DocId, query: &[f32]) -> Option<f32> {
        let node = *self.by_doc.get(&doc_id)?;
        let v = self.ann.vector(node);
        let mut dot = 0.0f32;
        for i in 0..self.dimension {
            dot += v[i] * query[i];
        }
        Some(dot)
    }

    /// Bounded approximate search: up to `k` documents most similar to
    /// the normalized query vector, best first.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<(DocId, f32)> {
        self.ann
            .search(query, k)
            .into_iter()
            .map(|(node, sim)| (self.doc_ids[node as usize], sim))
            .collect()
    }
}

/// L2-normalize a vector; `None` for zero-norm input.
pub fn normalize(vector: &[f32]) -> Option<Vec<f32>> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return None;
    }
    Some(vector.iter().map(|x| x / norm).collect())
}
