//! Query-serving façade: wires the query processor, BM25 ranker, hybrid
//! fusion, and diversity selector behind a single entry point consumed by
//! the presentation layer.

use crate::bm25;
use crate::config::SearchConfig;
use crate::diversity::diversify;
use crate::embedding::EmbeddingProvider;
use crate::error::SearchError;
use crate::fuse::{fuse, SearchMode};
use crate::index::DocId;
use crate::persist::IndexHandle;
use crate::query;
use serde::Serialize;
use std::sync::Arc;

/// One ranked hit with display fields resolved.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub doc_id: DocId,
    pub url: String,
    pub title: String,
    pub description: String,
    pub snippet: String,
    pub domain: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub mode: SearchMode,
    pub results: Vec<RankedResult>,
}

impl SearchResponse {
    fn empty(page: usize, page_size: usize) -> Self {
        Self {
            total: 0,
            page,
            page_size,
            mode: SearchMode::Lexical,
            results: Vec::new(),
        }
    }
}

/// Query entry point over the active index generation.
///
/// Holds a cloneable [`IndexHandle`]; a rebuild swaps the generation
/// underneath without disturbing in-flight queries. The embedding
/// provider is injected so the ranking core carries no model runtime.
pub struct SearchService {
    handle: IndexHandle,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        handle: IndexHandle,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            handle,
            provider,
            config,
        }
    }

    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }

    /// Execute a search. `page` is 1-based.
    ///
    /// An empty or whitespace-only query returns an explicit empty
    /// response without ever invoking the ranker. A service with no
    /// index loaded fails with [`SearchError::IndexUnavailable`], which
    /// is a different condition than zero hits.
    pub fn search(
        &self,
        raw_query: &str,
        page: usize,
        page_size: usize,
    ) -> Result<SearchResponse, SearchError> {
        let page = page.max(1);
        let raw_query = raw_query.trim();
        if raw_query.is_empty() {
            return Ok(SearchResponse::empty(page, page_size));
        }

        let generation = self.handle.current().ok_or(SearchError::IndexUnavailable)?;
        let plan = query::process(raw_query, &self.config);
        if plan.is_empty() {
            return Ok(SearchResponse::empty(page, page_size));
        }

        let mut lexical = bm25::score(&plan, &generation.index, &self.config);
        // Normalize lexical scores to [0, 1] before fusion and display.
        let max = lexical.values().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            for s in lexical.values_mut() {
                *s /= max;
            }
        }

        let (fused, mode) = fuse(
            raw_query,
            &lexical,
            generation.embeddings.as_ref(),
            self.provider.as_deref(),
            &self.config,
        );

        let mut scored: Vec<(DocId, f32)> = fused.into_iter().collect();
        // Descending score, ascending doc_id for a deterministic tie-break.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        if let Some(&(_, top)) = scored.first() {
            let floor = top * self.config.min_relevance;
            scored.retain(|&(_, s)| s >= floor);
        }

        let ranked: Vec<RankedResult> = scored
            .into_iter()
            .filter_map(|(doc_id, score)| {
                let meta = generation.index.docs.get(doc_id as usize)?;
                Some(RankedResult {
                    doc_id,
                    url: meta.url.clone(),
                    title: meta.title.clone(),
                    description: meta.description.clone(),
                    snippet: relevant_snippet(&meta.snippet, &plan.literals),
                    domain: meta.domain.clone(),
                    score,
                })
            })
            .collect();

        let total_before = ranked.len();
        let diversified = diversify(
            ranked,
            |r| r.domain.as_str(),
            self.config.max_per_domain,
            total_before,
        );

        let total = diversified.len();
        tracing::debug!(query = raw_query, total, ?mode, "search served");

        let start = (page - 1).saturating_mul(page_size).min(total);
        let end = start.saturating_add(page_size).min(total);
        Ok(SearchResponse {
            total,
            page,
            page_size,
            mode,
            results: diversified[start..end].to_vec(),
        })
    }
}

const SNIPPET_WINDOW: usize = 200;
const SNIPPET_STEP: usize = 20;

/// Pick the content window containing the most query terms; falls back to
/// the leading window when nothing matches.
fn relevant_snippet(content: &str, literals: &[String]) -> String {
    if content.is_empty() || literals.is_empty() {
        return content.chars().take(SNIPPET_WINDOW).collect();
    }
    let lower = content.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();
    if chars.len() <= SNIPPET_WINDOW {
        return content.to_string();
    }

    // Char offsets of each literal's occurrences, found once; window
    // scoring then only consults these lists.
    let occurrences: Vec<(usize, Vec<usize>)> = literals
        .iter()
        .map(|t| {
            let needle: Vec<char> = t.chars().collect();
            let starts = if needle.is_empty() || needle.len() > chars.len() {
                Vec::new()
            } else {
                chars
                    .windows(needle.len())
                    .enumerate()
                    .filter(|(_, w)| *w == needle.as_slice())
                    .map(|(i, _)| i)
                    .collect()
            };
            (needle.len(), starts)
        })
        .collect();

    let mut best_start = 0usize;
    let mut best_count = 0usize;
    let mut start = 0usize;
    while start + SNIPPET_WINDOW <= chars.len() {
        let end = start + SNIPPET_WINDOW;
        let count = occurrences
            .iter()
            .filter(|(len, starts)| starts.iter().any(|&i| i >= start && i + len <= end))
            .count();
        if count > best_count {
            best_count = count;
            best_start = start;
        }
        start += SNIPPET_STEP;
    }

    let original: Vec<char> = content.chars().collect();
    let end = (best_start + SNIPPET_WINDOW).min(original.len());
    let mut snippet: String = original[best_start..end].iter().collect();
    if end < original.len() {
        snippet.push('…');
    }
    snippet
}
