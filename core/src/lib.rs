//! Indexing and ranking engine for a domain-focused article search engine.
//!
//! The pipeline is: classified documents -> [`index::IndexBuilder`] ->
//! [`persist`] (versioned on-disk artifact, atomic swap) and, at query time,
//! [`query::process`] -> [`bm25::score`] -> [`fuse::fuse`] ->
//! [`diversity::diversify`], wired together by [`search::SearchService`].
//! Embedding vectors are optional; every query degrades to lexical-only
//! scoring when they are absent.

pub mod ann;
pub mod bm25;
pub mod config;
pub mod diversity;
pub mod embedding;
pub mod error;
pub mod fuse;
pub mod index;
pub mod persist;
pub mod query;
pub mod search;
pub mod tokenizer;

pub use config::SearchConfig;
pub use error::SearchError;
pub use index::{DocId, DocMeta, Field, IndexBuilder, Posting, SearchIndex, TermEntry};
pub use persist::IndexHandle;
pub use fuse::SearchMode;
pub use search::{RankedResult, SearchResponse, SearchService};
