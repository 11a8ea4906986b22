//! Query processing: normalization, main-term identification, stem
//! expansion, and exact-phrase detection.

use crate::config::SearchConfig;
use crate::tokenizer::{is_stopword, stem, tokenize_raw};
use std::collections::HashSet;

/// Ephemeral, per-query plan. Deterministic for identical raw input.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub raw: String,
    /// Deduplicated stemmed terms in first-appearance order; these are
    /// the forms that match indexed postings.
    pub terms: Vec<String>,
    /// Literal (unstemmed) surviving tokens, in query order.
    pub literals: Vec<String>,
    /// Stemmed terms carrying the main-term multiplier.
    pub main_terms: HashSet<String>,
    /// Stemmed terms that entered only via expansion, i.e. differ from
    /// their literal form.
    pub expanded: HashSet<String>,
    /// Exact phrases: contiguous runs of >= 2 query tokens, recorded as
    /// stemmed spans so they can be matched against indexed positions.
    pub phrases: Vec<Vec<String>>,
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

const POSITION_BONUS: f32 = 2.0;

/// Build a [`QueryPlan`] from a raw query string.
///
/// Main-term scoring weighs token length and gives a bonus to the first
/// and last surviving tokens; stopwords never qualify. Tokens at or above
/// `main_term_threshold` carry the main-term multiplier during ranking.
pub fn process(raw: &str, config: &SearchConfig) -> QueryPlan {
    let raw_trimmed = raw.trim();
    if raw_trimmed.is_empty() {
        return QueryPlan::default();
    }

    // Keep original positions so stopwords break phrase contiguity.
    let filtered: Vec<(String, u32)> = tokenize_raw(raw_trimmed)
        .into_iter()
        .filter(|(tok, _)| !is_stopword(tok))
        .collect();
    if filtered.is_empty() {
        return QueryPlan::default();
    }

    let mut terms = Vec::new();
    let mut seen = HashSet::new();
    let mut literals = Vec::with_capacity(filtered.len());
    let mut main_terms = HashSet::new();
    let mut expanded = HashSet::new();

    let last = filtered.len() - 1;
    for (i, (literal, _)) in filtered.iter().enumerate() {
        let stemmed = stem(literal);
        let mut score = literal.chars().count() as f32;
        if i == 0 || i == last {
            score += POSITION_BONUS;
        }
        if score >= config.main_term_threshold {
            main_terms.insert(stemmed.clone());
        }
        if stemmed != *literal {
            expanded.insert(stemmed.clone());
        }
        if seen.insert(stemmed.clone()) {
            terms.push(stemmed);
        }
        literals.push(literal.clone());
    }

    // Contiguous runs of surviving tokens become phrase spans.
    let mut phrases = Vec::new();
    let mut run: Vec<String> = vec![stem(&filtered[0].0)];
    for w in filtered.windows(2) {
        let (_, prev_pos) = &w[0];
        let (tok, pos) = &w[1];
        if *pos == prev_pos + 1 {
            run.push(stem(tok));
        } else {
            if run.len() >= 2 {
                phrases.push(std::mem::take(&mut run));
            }
            run = vec![stem(tok)];
        }
    }
    if run.len() >= 2 {
        phrases.push(run);
    }

    QueryPlan {
        raw: raw_trimmed.to_string(),
        terms,
        literals,
        main_terms,
        expanded,
        phrases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(q: &str) -> QueryPlan {
        process(q, &SearchConfig::default())
    }

    #[test]
    fn empty_and_whitespace_queries_yield_empty_plans() {
        assert!(plan("").is_empty());
        assert!(plan("   \t ").is_empty());
        assert!(plan("the of and").is_empty());
    }

    #[test]
    fn terms_align_with_indexed_stems() {
        let p = plan("running shoes");
        assert_eq!(p.terms, vec!["run", "shoe"]);
        assert_eq!(p.literals, vec!["running", "shoes"]);
        assert!(p.expanded.contains("run"));
        assert!(p.expanded.contains("shoe"));
    }

    #[test]
    fn main_terms_favor_length_and_edges() {
        let p = plan("finance tips");
        // "finance": 7 + first bonus; "tips": 4 + last bonus.
        assert!(p.main_terms.contains("financ"));
        assert!(p.main_terms.contains("tip"));
        let p = plan("big cat ate pie");
        // Middle three-letter tokens get no positional bonus.
        assert!(!p.main_terms.contains("cat"));
        assert!(!p.main_terms.contains("ate"));
    }

    #[test]
    fn phrases_are_contiguous_runs() {
        let p = plan("personal finance tips");
        assert_eq!(p.phrases, vec![vec!["person", "financ", "tip"]]);
        // A stopword splits the run; single survivors form no phrase.
        let p = plan("cooking with fire");
        assert!(p.phrases.is_empty());
        let p = plan("slow cooking with open fire pits");
        assert_eq!(
            p.phrases,
            vec![vec!["slow", "cook"], vec!["open", "fire", "pit"]]
        );
    }

    #[test]
    fn identical_queries_yield_identical_plans() {
        let a = plan("Best running SHOES for winter");
        let b = plan("Best running SHOES for winter");
        assert_eq!(a.terms, b.terms);
        assert_eq!(a.phrases, b.phrases);
        assert_eq!(a.main_terms, b.main_terms);
    }
}
