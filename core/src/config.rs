use serde::{Deserialize, Serialize};

/// Typed scoring configuration enumerating exactly the recognized tunables.
///
/// Defaults follow common BM25 practice (`k1`, `b`) and the tuning the
/// engine shipped with (title weighted above description, above body;
/// 70/30 lexical/semantic blend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// BM25 term-frequency saturation parameter.
    pub k1: f32,
    /// BM25 document-length normalization parameter.
    pub b: f32,
    /// Multiplier applied to title-field scores.
    pub title_boost: f32,
    /// Multiplier applied to description-field scores.
    pub description_boost: f32,
    /// Multiplier for query tokens identified as main terms.
    pub main_term_multiplier: f32,
    /// Minimum heuristic token score for a query token to count as a main term.
    pub main_term_threshold: f32,
    /// Fraction of a field's score added when an exact phrase occurs in it.
    pub phrase_bonus: f32,
    /// Maximum token distance for two query terms to count as co-occurring.
    pub proximity_window: u32,
    /// Maximum fraction of a field's score added for close co-occurrence,
    /// scaled by the fraction of query terms that co-occur.
    pub proximity_bonus: f32,
    /// Weight of the lexical component in hybrid fusion (semantic gets 1 - w).
    pub hybrid_weight: f32,
    /// Per-domain result cap applied by the diversity selector.
    pub max_per_domain: usize,
    /// Number of approximate-nearest-neighbor candidates pulled into fusion.
    pub ann_candidates: usize,
    /// Results scoring below this fraction of the top score are dropped.
    pub min_relevance: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            title_boost: 3.0,
            description_boost: 2.0,
            main_term_multiplier: 2.5,
            main_term_threshold: 5.0,
            phrase_bonus: 0.5,
            proximity_window: 5,
            proximity_bonus: 0.25,
            hybrid_weight: 0.7,
            max_per_domain: 3,
            ann_candidates: 50,
            min_relevance: 0.05,
        }
    }
}
