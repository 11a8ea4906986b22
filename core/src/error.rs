use thiserror::Error;

/// Error taxonomy for the engine.
///
/// Build-time document failures are not represented here: a bad input
/// document is skipped and counted by the builder, never surfaced as an
/// error. Embedding failures degrade a query to lexical-only scoring.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Malformed or truncated on-disk index data, or data that fails
    /// structural validation after decoding.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// The on-disk format version differs from what this reader supports.
    #[error("index format version {found} not supported (reader supports {supported})")]
    VersionMismatch { found: u32, supported: u32 },

    /// Embedding provider or store cannot serve this query or document.
    /// Callers fall back to BM25-only scoring.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// No index has ever been loaded. Distinct from "no results found".
    #[error("no search index loaded")]
    IndexUnavailable,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
