//! BM25 ranking with field boosting, main-term weighting, exact-phrase
//! and proximity bonuses, and coverage scaling.
//!
//! Only documents containing at least one query (or expanded) term are
//! scored; zero-match documents are excluded, not zero-scored.

use crate::config::SearchConfig;
use crate::index::{DocId, Field, SearchIndex, TermEntry};
use crate::query::QueryPlan;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Accum {
    per_field: [f32; Field::COUNT],
    matched: HashSet<usize>,
}

#[inline]
fn field_boost(field: Field, config: &SearchConfig) -> f32 {
    match field {
        Field::Title => config.title_boost,
        Field::Description => config.description_boost,
        Field::Content => 1.0,
    }
}

/// Score all candidate documents for a processed query.
///
/// Per-field BM25 uses per-field document frequency and average length:
/// `idf(t,f) = ln((N - df + 0.5) / (df + 0.5) + 1)` and
/// `tf*(k1+1) / (tf + k1*(1 - b + b*len/avgdl))`, combined across fields
/// with fixed boosts. The main-term multiplier applies after the field
/// combination; phrase, proximity, and coverage adjustments follow.
pub fn score(plan: &QueryPlan, index: &SearchIndex, config: &SearchConfig) -> HashMap<DocId, f32> {
    if plan.is_empty() || index.stats.total_docs == 0 {
        return HashMap::new();
    }

    let n = index.stats.total_docs as f32;
    let mut accums: HashMap<DocId, Accum> = HashMap::new();

    for (ti, term) in plan.terms.iter().enumerate() {
        let Some(entry) = index.terms.get(term) else {
            continue;
        };
        let multiplier = if plan.main_terms.contains(term) {
            config.main_term_multiplier
        } else {
            1.0
        };
        for field in Field::ALL {
            let list = &entry.postings[field.idx()];
            if list.is_empty() {
                continue;
            }
            let df = list.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            let avgdl = index.stats.avg_field_len[field.idx()];
            for posting in list {
                let tf = posting.term_frequency as f32;
                let dl = index.field_lengths[posting.doc_id as usize][field.idx()] as f32;
                let len_ratio = if avgdl > 0.0 { dl / avgdl } else { 1.0 };
                let tf_norm =
                    (tf * (config.k1 + 1.0)) / (tf + config.k1 * (1.0 - config.b + config.b * len_ratio));
                let acc = accums.entry(posting.doc_id).or_default();
                acc.per_field[field.idx()] += idf * tf_norm * field_boost(field, config) * multiplier;
                acc.matched.insert(ti);
            }
        }
    }

    let total_terms = plan.terms.len() as f32;
    let mut scores = HashMap::with_capacity(accums.len());
    for (doc_id, acc) in accums {
        let mut total = 0.0f32;
        for field in Field::ALL {
            let base = acc.per_field[field.idx()];
            if base <= 0.0 {
                continue;
            }
            let mut bonus = 0.0f32;
            for phrase in &plan.phrases {
                if phrase_in_field(index, phrase, doc_id, field) {
                    bonus += config.phrase_bonus * base;
                }
            }
            let frac = proximity_fraction(index, plan, doc_id, field, config.proximity_window);
            if frac > 0.0 {
                bonus += config.proximity_bonus * frac * base;
            }
            total += base + bonus;
        }
        let coverage = acc.matched.len() as f32 / total_terms;
        scores.insert(doc_id, total * coverage);
    }
    scores
}

fn positions_of<'a>(
    index: &'a SearchIndex,
    term: &str,
    doc_id: DocId,
    field: Field,
) -> Option<&'a [u32]> {
    index
        .terms
        .get(term)
        .and_then(|e: &TermEntry| e.posting(field, doc_id))
        .map(|p| p.positions.as_slice())
}

/// Whether a stemmed phrase span occurs contiguously in the document's
/// field, position-matched against indexed postings.
fn phrase_in_field(index: &SearchIndex, phrase: &[String], doc_id: DocId, field: Field) -> bool {
    let Some(first) = positions_of(index, &phrase[0], doc_id, field) else {
        return false;
    };
    let mut starts: Vec<u32> = first.to_vec();
    for term in &phrase[1..] {
        let Some(positions) = positions_of(index, term, doc_id, field) else {
            return false;
        };
        starts.retain(|&s| {
            let want = s + 1;
            positions.binary_search(&want).is_ok()
        });
        if starts.is_empty() {
            return false;
        }
        for s in starts.iter_mut() {
            *s += 1;
        }
    }
    true
}

/// Fraction of the query's distinct matched terms that co-occur within
/// `window` positions of another distinct term in this field. Zero when
/// fewer than two distinct terms match.
fn proximity_fraction(
    index: &SearchIndex,
    plan: &QueryPlan,
    doc_id: DocId,
    field: Field,
    window: u32,
) -> f32 {
    let mut events: Vec<(u32, usize)> = Vec::new();
    let mut matched_terms = 0usize;
    for (ti, term) in plan.terms.iter().enumerate() {
        if let Some(positions) = positions_of(index, term, doc_id, field) {
            matched_terms += 1;
            for &p in positions {
                events.push((p, ti));
            }
        }
    }
    if matched_terms < 2 {
        return 0.0;
    }
    events.sort_unstable();

    let mut close: HashSet<usize> = HashSet::new();
    for i in 0..events.len() {
        for j in (i + 1)..events.len() {
            if events[j].0 - events[i].0 > window {
                break;
            }
            if events[i].1 != events[j].1 {
                close.insert(events[i].1);
                close.insert(events[j].1);
            }
        }
    }
    close.len() as f32 / matched_terms as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{AcceptAll, IndexBuilder, RawDocument};
    use crate::query::process;

    fn doc(url: &str, title: &str, content: &str) -> RawDocument {
        RawDocument {
            url: url.into(),
            title: title.into(),
            description: String::new(),
            content: content.into(),
            fetched_at: None,
            classifier_score: None,
        }
    }

    fn engine_config() -> SearchConfig {
        SearchConfig::default()
    }

    #[test]
    fn zero_match_documents_are_excluded() {
        let docs = vec![
            doc("https://a.com/1", "personal finance tips", "saving money"),
            doc("https://c.com/3", "cooking recipes", "pasta and sauces"),
        ];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let plan = process("finance tips", &engine_config());
        let scores = score(&plan, &index, &engine_config());
        assert!(scores.contains_key(&0));
        assert!(!scores.contains_key(&1));
    }

    #[test]
    fn fuller_matches_outrank_partial_matches() {
        let docs = vec![
            doc("https://a.com/1", "personal finance tips", "finance tips for everyone"),
            doc("https://b.com/2", "finance", "finance discussed briefly"),
            doc("https://c.com/3", "cooking recipes", "pasta"),
        ];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let plan = process("finance tips", &engine_config());
        let scores = score(&plan, &index, &engine_config());
        assert!(scores[&0] > scores[&1]);
        assert!(!scores.contains_key(&2));
    }

    #[test]
    fn term_frequency_is_monotone_per_field() {
        // Same field length, higher tf for "budget" in doc 1.
        let docs = vec![
            doc("https://a.com/1", "", "budget filler filler filler"),
            doc("https://b.com/2", "", "budget budget filler filler"),
        ];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let plan = process("budget", &engine_config());
        let scores = score(&plan, &index, &engine_config());
        assert!(scores[&1] > scores[&0]);
    }

    #[test]
    fn title_outweighs_content() {
        let docs = vec![
            doc("https://a.com/1", "gardening", "filler words here"),
            doc("https://b.com/2", "filler words", "gardening here too"),
        ];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let plan = process("gardening", &engine_config());
        let scores = score(&plan, &index, &engine_config());
        assert!(scores[&0] > scores[&1]);
    }

    #[test]
    fn exact_phrase_beats_scattered_terms() {
        let docs = vec![
            doc(
                "https://a.com/1",
                "",
                "thoughts on personal finance tips from a decade of budgeting",
            ),
            doc(
                "https://b.com/2",
                "",
                "finance pages discuss personal growth and travel tips separately here",
            ),
        ];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let plan = process("personal finance tips", &engine_config());
        let scores = score(&plan, &index, &engine_config());
        assert!(scores[&0] > scores[&1]);
    }

    #[test]
    fn close_cooccurrence_outranks_distant_terms() {
        // Identical tf and field length; "finance" and "tips" sit three
        // positions apart in doc 0 and nine apart in doc 1, with no
        // contiguous phrase in either.
        let docs = vec![
            doc(
                "https://a.com/1",
                "",
                "finance alpha beta tips gamma delta epsilon zeta eta theta",
            ),
            doc(
                "https://b.com/2",
                "",
                "finance alpha beta gamma delta epsilon zeta eta theta tips",
            ),
        ];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let plan = process("finance tips", &engine_config());
        assert!(!phrase_in_field(&index, &plan.phrases[0], 0, Field::Content));

        let scores = score(&plan, &index, &engine_config());
        assert!(scores[&0] > scores[&1]);

        let mut flat = engine_config();
        flat.proximity_bonus = 0.0;
        let scores = score(&plan, &index, &flat);
        assert!((scores[&0] - scores[&1]).abs() < 1e-6);
    }

    #[test]
    fn phrase_positions_must_be_contiguous() {
        let docs = vec![doc(
            "https://a.com/1",
            "",
            "finance advice and generally useful tips",
        )];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let plan = process("finance tips", &engine_config());
        assert_eq!(plan.phrases.len(), 1);
        assert!(!phrase_in_field(&index, &plan.phrases[0], 0, Field::Content));
    }

    #[test]
    fn empty_plan_scores_nothing() {
        let docs = vec![doc("https://a.com/1", "anything", "at all")];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let plan = process("", &engine_config());
        assert!(score(&plan, &index, &engine_config()).is_empty());
    }
}
