//! Hybrid fusion of lexical (BM25) and semantic (embedding similarity)
//! scores via min-max normalization and a weighted linear blend.

use crate::config::SearchConfig;
use crate::embedding::{normalize, EmbeddingProvider, EmbeddingStore};
use crate::index::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which scoring path actually served a query, reported to the
/// presentation layer for transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Lexical,
    Hybrid,
}

/// Fuse BM25 scores with embedding similarity.
///
/// Degrades to the BM25 scores untouched — never an error — when the
/// store or provider is missing, the store is empty, the provider fails,
/// or the query vector's dimensionality disagrees with stored vectors.
/// Otherwise the candidate set is the union of BM25 matches and ANN
/// neighbors, so a document can enter purely on semantic similarity.
pub fn fuse(
    raw_query: &str,
    bm25_scores: &HashMap<DocId, f32>,
    store: Option<&EmbeddingStore>,
    provider: Option<&dyn EmbeddingProvider>,
    config: &SearchConfig,
) -> (HashMap<DocId, f32>, SearchMode) {
    let lexical_only = || (bm25_scores.clone(), SearchMode::Lexical);

    let (Some(store), Some(provider)) = (store, provider) else {
        return lexical_only();
    };
    if store.is_empty() {
        return lexical_only();
    }

    let query_vector = match provider.embed(raw_query) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed, serving lexical-only");
            return lexical_only();
        }
    };
    if query_vector.len() != store.dimension() {
        tracing::warn!(
            got = query_vector.len(),
            expected = store.dimension(),
            "query vector dimensionality mismatch, serving lexical-only"
        );
        return lexical_only();
    }
    let Some(query_vector) = normalize(&query_vector) else {
        return lexical_only();
    };

    let neighbors = store.nearest(&query_vector, config.ann_candidates);

    let mut candidates: HashSet<DocId> = bm25_scores.keys().copied().collect();
    candidates.extend(neighbors.iter().map(|&(id, _)| id));

    let similarities: HashMap<DocId, f32> = candidates
        .iter()
        .filter_map(|&id| store.similarity(id, &query_vector).map(|s| (id, s)))
        .collect();

    let bm25_range = min_max(bm25_scores.values().copied());
    let sim_range = min_max(similarities.values().copied());
    let w = config.hybrid_weight;

    let fused = candidates
        .into_iter()
        .map(|id| {
            let lexical = bm25_scores
                .get(&id)
                .map_or(0.0, |&s| scale(s, bm25_range));
            let semantic = similarities
                .get(&id)
                .map_or(0.0, |&s| scale(s, sim_range));
            (id, w * lexical + (1.0 - w) * semantic)
        })
        .collect();
    (fused, SearchMode::Hybrid)
}

fn min_max(values: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
    let mut range: Option<(f32, f32)> = None;
    for v in values {
        range = Some(match range {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }
    range
}

fn scale(value: f32, range: Option<(f32, f32)>) -> f32 {
    match range {
        None => 0.0,
        Some((lo, hi)) if (hi - lo) < f32::EPSILON => 1.0,
        Some((lo, hi)) => (value - lo) / (hi - lo),
    }
}
