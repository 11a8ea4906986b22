//! On-disk index artifact and the atomically swappable in-memory handle.
//!
//! Layout of an index directory:
//! - `meta.json` — self-describing header: format version, document and
//!   term counts, field boosts, build timestamp. Read and checked first.
//! - `index.bin` — bincode payload with postings doc-ids delta-encoded.
//! - `embeddings.bin` — optional embedding store.
//!
//! A build writes everything into `<dir>.tmp`, then renames over the
//! target, so a crashed build never leaves a half-written active
//! directory. In-process, [`IndexHandle::swap`] repoints readers; any
//! reader that cloned the `Arc` before the swap keeps a fully valid
//! generation.

use crate::embedding::EmbeddingStore;
use crate::error::SearchError;
use crate::index::{CorpusStats, DocId, DocMeta, Field, Posting, SearchIndex, TermEntry};
use crate::SearchConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FORMAT_VERSION: u32 = 2;

const META_FILE: &str = "meta.json";
const INDEX_FILE: &str = "index.bin";
const EMBEDDINGS_FILE: &str = "embeddings.bin";

/// Self-describing artifact header, kept human-readable.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub num_docs: u32,
    pub num_terms: u64,
    pub title_boost: f32,
    pub description_boost: f32,
    pub created_at: String,
}

/// One loaded index generation: the inverted index plus its optional
/// embedding store. Swapped as a unit.
#[derive(Debug)]
pub struct Generation {
    pub index: SearchIndex,
    pub embeddings: Option<EmbeddingStore>,
}

/// Cloneable handle to the active index generation.
///
/// Replaces a mutable global: queries acquire a stable `Arc` at start and
/// are unaffected by concurrent swaps. Starts empty; a query against an
/// empty handle is a service-level condition, not "no results".
#[derive(Clone, Default)]
pub struct IndexHandle {
    inner: Arc<RwLock<Option<Arc<Generation>>>>,
}

impl IndexHandle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_generation(generation: Generation) -> Self {
        let handle = Self::default();
        handle.swap(generation);
        handle
    }

    /// Stable reference to the current generation, if any.
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.inner.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Atomically replace the active generation.
    pub fn swap(&self, generation: Generation) {
        *self.inner.write() = Some(Arc::new(generation));
    }
}

// Disk mirror of a postings list entry: doc ids stored as gaps from the
// previous posting in the same list.
#[derive(Serialize, Deserialize)]
struct DiskPosting {
    gap: u32,
    term_frequency: u32,
    positions: Vec<u32>,
}

#[derive(Serialize, Deserialize)]
struct DiskTermEntry {
    document_frequency: u32,
    postings: [Vec<DiskPosting>; Field::COUNT],
}

#[derive(Serialize, Deserialize)]
struct DiskIndex {
    terms: HashMap<String, DiskTermEntry>,
    stats: CorpusStats,
    docs: Vec<DocMeta>,
    field_lengths: Vec<[u32; Field::COUNT]>,
}

fn encode(index: &SearchIndex) -> DiskIndex {
    let terms = index
        .terms
        .iter()
        .map(|(term, entry)| {
            let postings = std::array::from_fn(|f| {
                let mut prev = 0u32;
                entry.postings[f]
                    .iter()
                    .map(|p| {
                        let gap = p.doc_id - prev;
                        prev = p.doc_id;
                        DiskPosting {
                            gap,
                            term_frequency: p.term_frequency,
                            positions: p.positions.clone(),
                        }
                    })
                    .collect()
            });
            (
                term.clone(),
                DiskTermEntry {
                    document_frequency: entry.document_frequency,
                    postings,
                },
            )
        })
        .collect();
    DiskIndex {
        terms,
        stats: index.stats.clone(),
        docs: index.docs.clone(),
        field_lengths: index.field_lengths.clone(),
    }
}

fn decode(disk: DiskIndex) -> SearchIndex {
    let terms = disk
        .terms
        .into_iter()
        .map(|(term, entry)| {
            let postings = entry.postings.map(|list| {
                let mut doc_id = 0u32;
                list.into_iter()
                    .map(|p| {
                        doc_id += p.gap;
                        Posting {
                            doc_id,
                            term_frequency: p.term_frequency,
                            positions: p.positions,
                        }
                    })
                    .collect()
            });
            (
                term,
                TermEntry {
                    document_frequency: entry.document_frequency,
                    postings,
                },
            )
        })
        .collect();
    SearchIndex {
        terms,
        stats: disk.stats,
        docs: disk.docs,
        field_lengths: disk.field_lengths,
    }
}

/// Structural consistency check run after every load and before every
/// on-disk swap.
pub fn validate(index: &SearchIndex) -> Result<(), SearchError> {
    let total = index.stats.total_docs;
    if index.docs.len() as u32 != total || index.field_lengths.len() as u32 != total {
        return Err(SearchError::CorruptIndex(format!(
            "document tables hold {}/{} rows, stats claim {total}",
            index.docs.len(),
            index.field_lengths.len()
        )));
    }
    for (term, entry) in &index.terms {
        let mut distinct: Vec<DocId> = Vec::new();
        for list in &entry.postings {
            let mut prev: Option<DocId> = None;
            for p in list {
                if p.doc_id >= total {
                    return Err(SearchError::CorruptIndex(format!(
                        "term {term:?} references doc {} beyond corpus of {total}",
                        p.doc_id
                    )));
                }
                if prev.is_some_and(|prev| p.doc_id <= prev) {
                    return Err(SearchError::CorruptIndex(format!(
                        "postings for term {term:?} not strictly ascending"
                    )));
                }
                if p.term_frequency as usize != p.positions.len() {
                    return Err(SearchError::CorruptIndex(format!(
                        "term {term:?} doc {}: tf {} disagrees with {} positions",
                        p.doc_id,
                        p.term_frequency,
                        p.positions.len()
                    )));
                }
                prev = Some(p.doc_id);
                distinct.push(p.doc_id);
            }
        }
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() as u32 != entry.document_frequency {
            return Err(SearchError::CorruptIndex(format!(
                "term {term:?}: document_frequency {} but {} distinct docs",
                entry.document_frequency,
                distinct.len()
            )));
        }
    }
    Ok(())
}

fn write_artifact(
    index: &SearchIndex,
    embeddings: Option<&EmbeddingStore>,
    config: &SearchConfig,
    dir: &Path,
) -> Result<(), SearchError> {
    fs::create_dir_all(dir)?;
    let meta = IndexMeta {
        version: FORMAT_VERSION,
        num_docs: index.num_docs(),
        num_terms: index.num_terms() as u64,
        title_boost: config.title_boost,
        description_boost: config.description_boost,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
    };
    let mut f = File::create(dir.join(META_FILE))?;
    f.write_all(serde_json::to_string_pretty(&meta)?.as_bytes())?;

    let f = BufWriter::new(File::create(dir.join(INDEX_FILE))?);
    bincode::serialize_into(f, &encode(index))
        .map_err(|e| SearchError::CorruptIndex(e.to_string()))?;

    if let Some(store) = embeddings {
        let f = BufWriter::new(File::create(dir.join(EMBEDDINGS_FILE))?);
        bincode::serialize_into(f, store).map_err(|e| SearchError::CorruptIndex(e.to_string()))?;
    }
    Ok(())
}

/// Persist a validated index (and optional embedding store) to `dir`,
/// building the artifact off to the side and renaming it into place so
/// concurrent readers of a previous artifact are never disturbed.
pub fn save(
    index: &SearchIndex,
    embeddings: Option<&EmbeddingStore>,
    config: &SearchConfig,
    dir: impl AsRef<Path>,
) -> Result<(), SearchError> {
    let dir = dir.as_ref();
    validate(index)?;
    let tmp: PathBuf = dir.with_file_name(format!(
        "{}.tmp",
        dir.file_name().and_then(|n| n.to_str()).unwrap_or("index")
    ));
    if tmp.exists() {
        fs::remove_dir_all(&tmp)?;
    }
    write_artifact(index, embeddings, config, &tmp)?;
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::rename(&tmp, dir)?;
    tracing::info!(dir = %dir.display(), "index artifact written");
    Ok(())
}

/// Load and validate an index generation from `dir`.
///
/// Fails with [`SearchError::VersionMismatch`] when the artifact was
/// written by an unsupported format version, and
/// [`SearchError::CorruptIndex`] on malformed or inconsistent data. A
/// malformed embedding store is dropped with a warning rather than
/// failing the load; lexical search stays available.
pub fn load(dir: impl AsRef<Path>) -> Result<Generation, SearchError> {
    let dir = dir.as_ref();
    let meta_raw = fs::read_to_string(dir.join(META_FILE))?;
    let meta: IndexMeta = serde_json::from_str(&meta_raw)
        .map_err(|e| SearchError::CorruptIndex(format!("bad meta header: {e}")))?;
    if meta.version != FORMAT_VERSION {
        return Err(SearchError::VersionMismatch {
            found: meta.version,
            supported: FORMAT_VERSION,
        });
    }

    let f = BufReader::new(File::open(dir.join(INDEX_FILE))?);
    let disk: DiskIndex =
        bincode::deserialize_from(f).map_err(|e| SearchError::CorruptIndex(e.to_string()))?;
    let index = decode(disk);

    if index.num_docs() != meta.num_docs || index.num_terms() as u64 != meta.num_terms {
        return Err(SearchError::CorruptIndex(format!(
            "payload has {} docs / {} terms, header claims {} / {}",
            index.num_docs(),
            index.num_terms(),
            meta.num_docs,
            meta.num_terms
        )));
    }
    validate(&index)?;

    let embeddings_path = dir.join(EMBEDDINGS_FILE);
    let embeddings = if embeddings_path.exists() {
        let f = BufReader::new(File::open(&embeddings_path)?);
        match bincode::deserialize_from::<_, EmbeddingStore>(f) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!(error = %e, "embedding store unreadable, continuing lexical-only");
                None
            }
        }
    } else {
        None
    };

    tracing::info!(
        num_docs = index.num_docs(),
        num_terms = index.num_terms(),
        embeddings = embeddings.as_ref().map(|s| s.len()).unwrap_or(0),
        "index loaded"
    );
    Ok(Generation { index, embeddings })
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::CorruptIndex(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{AcceptAll, IndexBuilder, RawDocument};

    fn sample_index() -> SearchIndex {
        let docs = vec![
            RawDocument {
                url: "https://a.com/post".into(),
                title: "Personal finance tips".into(),
                description: "Money advice".into(),
                content: "Saving and budgeting advice for everyone.".into(),
                fetched_at: None,
                classifier_score: None,
            },
            RawDocument {
                url: "https://b.com/essay".into(),
                title: "Finance".into(),
                description: String::new(),
                content: "Markets and finance explained at length.".into(),
                fetched_at: None,
                classifier_score: None,
            },
        ];
        IndexBuilder::build(&docs, &AcceptAll)
    }

    #[test]
    fn round_trip_preserves_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        let index = sample_index();
        save(&index, None, &SearchConfig::default(), &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.index.num_docs(), index.num_docs());
        assert_eq!(loaded.index.num_terms(), index.num_terms());
        for (term, entry) in &index.terms {
            let other = loaded.index.terms.get(term).unwrap();
            assert_eq!(other.document_frequency, entry.document_frequency);
            assert_eq!(other.postings, entry.postings);
        }
        assert!(loaded.embeddings.is_none());
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        save(&sample_index(), None, &SearchConfig::default(), &path).unwrap();
        let bin = path.join("index.bin");
        let bytes = fs::read(&bin).unwrap();
        fs::write(&bin, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(
            load(&path),
            Err(SearchError::CorruptIndex(_))
        ));
    }

    #[test]
    fn version_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        save(&sample_index(), None, &SearchConfig::default(), &path).unwrap();
        let meta_path = path.join("meta.json");
        let mut meta: IndexMeta =
            serde_json::from_str(&fs::read_to_string(&meta_path).unwrap()).unwrap();
        meta.version = FORMAT_VERSION + 1;
        fs::write(&meta_path, serde_json::to_string(&meta).unwrap()).unwrap();
        assert!(matches!(
            load(&path),
            Err(SearchError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn handle_swap_keeps_old_generation_alive() {
        let handle = IndexHandle::empty();
        assert!(handle.current().is_none());
        handle.swap(Generation {
            index: sample_index(),
            embeddings: None,
        });
        let before = handle.current().unwrap();
        handle.swap(Generation {
            index: SearchIndex::default(),
            embeddings: None,
        });
        // Reader holding the old Arc still sees a complete index.
        assert_eq!(before.index.num_docs(), 2);
        assert_eq!(handle.current().unwrap().index.num_docs(), 0);
    }

    #[test]
    fn validate_catches_df_drift() {
        let mut index = sample_index();
        let entry = index.terms.get_mut("financ").unwrap();
        entry.document_frequency += 1;
        assert!(matches!(
            validate(&index),
            Err(SearchError::CorruptIndex(_))
        ));
    }
}
