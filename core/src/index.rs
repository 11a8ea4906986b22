use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type DocId = u32;

/// Indexed document fields, in boost order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Title,
    Description,
    Content,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Title, Field::Description, Field::Content];
    pub const COUNT: usize = 3;

    #[inline]
    pub fn idx(self) -> usize {
        match self {
            Field::Title => 0,
            Field::Description => 1,
            Field::Content => 2,
        }
    }
}

/// Per-document display metadata kept alongside the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub url: String,
    /// Host portion of the URL, used by the diversity selector.
    pub domain: String,
    pub title: String,
    pub description: String,
    /// Leading slice of the plain-text content, for snippet extraction.
    pub snippet: String,
}

/// Occurrence record of one term in one field of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_frequency: u32,
    /// Ascending 0-based positions within the field's token stream.
    pub positions: Vec<u32>,
}

/// Per-term record: document frequency plus per-field postings lists,
/// each sorted by ascending doc_id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermEntry {
    /// Count of distinct documents containing the term in any field.
    pub document_frequency: u32,
    pub postings: [Vec<Posting>; Field::COUNT],
}

impl TermEntry {
    /// Binary-search a field's postings list for a document.
    pub fn posting(&self, field: Field, doc_id: DocId) -> Option<&Posting> {
        let list = &self.postings[field.idx()];
        list.binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|i| &list[i])
    }
}

/// Corpus-wide statistics required by BM25 length normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusStats {
    pub total_docs: u32,
    pub avg_field_len: [f32; Field::COUNT],
}

/// Immutable inverted index over one generation of the corpus.
///
/// A rebuild produces a whole new `SearchIndex`; the old one stays valid
/// for readers that grabbed a reference before the swap.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SearchIndex {
    pub terms: HashMap<String, TermEntry>,
    pub stats: CorpusStats,
    /// Indexed by DocId.
    pub docs: Vec<DocMeta>,
    /// Per-document token count per field, indexed by DocId.
    pub field_lengths: Vec<[u32; Field::COUNT]>,
}

impl SearchIndex {
    pub fn num_docs(&self) -> u32 {
        self.stats.total_docs
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }
}

/// A crawled, classified document as handed over by the crawler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub fetched_at: Option<String>,
    /// Opaque classifier output; consumed by a [`ClassifierGate`].
    #[serde(default)]
    pub classifier_score: Option<f32>,
}

/// Gate deciding whether a classified document enters the index.
/// The classifier itself is an external collaborator; the engine only
/// sees its verdict.
pub trait ClassifierGate {
    fn accept(&self, doc: &RawDocument) -> bool;
}

/// Accepts documents whose classifier score clears a threshold.
/// Documents without a score are rejected.
pub struct ScoreGate {
    pub threshold: f32,
}

impl ClassifierGate for ScoreGate {
    fn accept(&self, doc: &RawDocument) -> bool {
        doc.classifier_score.map_or(false, |s| s >= self.threshold)
    }
}

/// Pass-through gate for pre-filtered input and tests.
pub struct AcceptAll;

impl ClassifierGate for AcceptAll {
    fn accept(&self, _doc: &RawDocument) -> bool {
        true
    }
}

/// Host portion of a URL, with any `www.` prefix stripped.
pub fn domain_of(url: &str) -> String {
    let rest = url
        .split_once("://")
        .map(|(_, r)| r)
        .unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    host.strip_prefix("www.").unwrap_or(host).to_lowercase()
}

const SNIPPET_STORE_LEN: usize = 800;

/// Batch index builder. Accumulates postings per term and field, then
/// finalizes sorted lists, document frequencies, and corpus averages.
#[derive(Default)]
pub struct IndexBuilder {
    terms: HashMap<String, TermEntry>,
    docs: Vec<DocMeta>,
    field_lengths: Vec<[u32; Field::COUNT]>,
    skipped: u32,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents rejected so far for structural reasons.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// Add one classified document. Structurally bad documents (no URL,
    /// no text in any field) are skipped and counted; they never abort
    /// the build.
    pub fn add(&mut self, doc: &RawDocument) {
        if doc.url.trim().is_empty()
            || (doc.title.trim().is_empty()
                && doc.description.trim().is_empty()
                && doc.content.trim().is_empty())
        {
            self.skipped += 1;
            return;
        }

        let doc_id = self.docs.len() as DocId;
        let mut lengths = [0u32; Field::COUNT];
        for field in Field::ALL {
            let text = match field {
                Field::Title => &doc.title,
                Field::Description => &doc.description,
                Field::Content => &doc.content,
            };
            let tokens = tokenize(text);
            lengths[field.idx()] = tokens.len() as u32;

            let mut per_term: HashMap<&str, Vec<u32>> = HashMap::new();
            for (term, pos) in &tokens {
                per_term.entry(term.as_str()).or_default().push(*pos);
            }
            for (term, positions) in per_term {
                let entry = self.terms.entry(term.to_string()).or_default();
                entry.postings[field.idx()].push(Posting {
                    doc_id,
                    term_frequency: positions.len() as u32,
                    positions,
                });
            }
        }

        let snippet: String = doc.content.chars().take(SNIPPET_STORE_LEN).collect();
        self.docs.push(DocMeta {
            domain: domain_of(&doc.url),
            url: doc.url.clone(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            snippet,
        });
        self.field_lengths.push(lengths);
    }

    /// Finalize the index: sort postings by doc_id, recompute document
    /// frequencies from scratch, and compute average field lengths.
    /// Zero documents yields an empty but valid index.
    pub fn finish(mut self) -> SearchIndex {
        let total_docs = self.docs.len() as u32;

        for entry in self.terms.values_mut() {
            let mut distinct: Vec<DocId> = Vec::new();
            for list in entry.postings.iter_mut() {
                list.sort_by_key(|p| p.doc_id);
                for p in list.iter_mut() {
                    p.positions.sort_unstable();
                    distinct.push(p.doc_id);
                }
            }
            distinct.sort_unstable();
            distinct.dedup();
            entry.document_frequency = distinct.len() as u32;
        }

        let mut avg = [0.0f32; Field::COUNT];
        if total_docs > 0 {
            let mut sums = [0u64; Field::COUNT];
            for lengths in &self.field_lengths {
                for (i, len) in lengths.iter().enumerate() {
                    sums[i] += u64::from(*len);
                }
            }
            for i in 0..Field::COUNT {
                avg[i] = sums[i] as f32 / total_docs as f32;
            }
        }

        if self.skipped > 0 {
            tracing::warn!(skipped = self.skipped, "documents skipped during build");
        }
        tracing::info!(
            num_docs = total_docs,
            num_terms = self.terms.len(),
            "index build finished"
        );

        SearchIndex {
            terms: self.terms,
            stats: CorpusStats {
                total_docs,
                avg_field_len: avg,
            },
            docs: self.docs,
            field_lengths: self.field_lengths,
        }
    }

    /// Build an index from a document batch, admitting only documents the
    /// classifier gate accepts.
    pub fn build<'a, I>(docs: I, gate: &dyn ClassifierGate) -> SearchIndex
    where
        I: IntoIterator<Item = &'a RawDocument>,
    {
        let mut builder = Self::new();
        for doc in docs {
            if gate.accept(doc) {
                builder.add(doc);
            }
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn empty_build_is_valid() {
        let index = IndexBuilder::build(&Vec::new(), &AcceptAll);
        assert_eq!(index.num_docs(), 0);
        assert_eq!(index.num_terms(), 0);
    }

    #[test]
    fn postings_sorted_and_df_consistent() {
        let docs = vec![
            doc("https://a.com/1", "rust search", "rust rust engines"),
            doc("https://b.com/2", "cooking", "rust never sleeps"),
            doc("https://c.com/3", "rust again", ""),
        ];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        let entry = index.terms.get("rust").unwrap();
        assert_eq!(entry.document_frequency, 3);
        for list in &entry.postings {
            for w in list.windows(2) {
                assert!(w[0].doc_id < w[1].doc_id);
            }
        }
        // tf in content of doc 0 is 2, positions ascending
        let p = entry.posting(Field::Content, 0).unwrap();
        assert_eq!(p.term_frequency, 2);
        assert_eq!(p.positions, vec![0, 1]);
    }

    #[test]
    fn bad_documents_are_skipped_not_fatal() {
        let docs = vec![
            doc("", "no url", "text"),
            doc("https://ok.com/x", "fine", "body text"),
            doc("https://empty.com/y", "", ""),
        ];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        assert_eq!(index.num_docs(), 1);
        assert_eq!(index.docs[0].domain, "ok.com");
    }

    #[test]
    fn score_gate_filters() {
        let mut passing = doc("https://a.com", "kept", "kept body");
        passing.classifier_score = Some(0.9);
        let mut failing = doc("https://b.com", "dropped", "dropped body");
        failing.classifier_score = Some(0.2);
        let unscored = doc("https://c.com", "unscored", "unscored body");
        let docs = vec![passing, failing, unscored];
        let index = IndexBuilder::build(&docs, &ScoreGate { threshold: 0.5 });
        assert_eq!(index.num_docs(), 1);
        assert_eq!(index.docs[0].title, "kept");
    }

    #[test]
    fn duplicate_urls_are_distinct_docs() {
        let d = doc("https://a.com/same", "twice", "same text");
        let docs = vec![d.clone(), d];
        let index = IndexBuilder::build(&docs, &AcceptAll);
        assert_eq!(index.num_docs(), 2);
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(domain_of("https://www.example.com/a/b?q=1"), "example.com");
        assert_eq!(domain_of("http://Blog.Example.org"), "blog.example.org");
        assert_eq!(domain_of("example.com/page"), "example.com");
    }
}
