//! Error types for ingestion and retrieval.
//!
//! The propagation policy is two-tiered: per-file problems during loading
//! are never errors (they are collected as [`SkippedFile`] entries and
//! reported to the caller), while pipeline-level problems abort the whole
//! call with one of the variants below and leave no partial on-disk state.

use crate::loader::SkippedFile;
use tome_embed::EmbedError;

/// Result type for pipeline operations, using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fatal conditions for ingestion and retrieval calls.
///
/// Messages are written to be shown to users directly, so they distinguish
/// "nothing to search" ([`NoIndex`], [`NoValidDocuments`]) from "search
/// backend down" ([`Provider`]) from "bad request" ([`InvalidArgument`]).
///
/// [`NoIndex`]: PipelineError::NoIndex
/// [`NoValidDocuments`]: PipelineError::NoValidDocuments
/// [`Provider`]: PipelineError::Provider
/// [`InvalidArgument`]: PipelineError::InvalidArgument
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Every uploaded file was skipped; there is nothing to index. The skip
    /// report explains what happened to each file.
    #[error("no valid documents to ingest: every file was skipped")]
    NoValidDocuments { skipped: Vec<SkippedFile> },

    /// An index build was attempted with zero chunks.
    #[error("cannot build an index from zero chunks")]
    EmptyIndexInput,

    /// A retrieval or search parameter is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Retrieval was attempted before any documents were ingested.
    #[error("nothing to search: no documents have been ingested yet")]
    NoIndex,

    /// A persisted index could not be loaded (missing, corrupt, or built
    /// with an incompatible embedding model). Ingestion falls back to a
    /// rebuild on this; retrieval surfaces it.
    #[error("index persistence error: {0}")]
    Persistence(String),

    /// The embedding backend failed; nothing partial is persisted.
    #[error(transparent)]
    Provider(#[from] EmbedError),

    /// The auxiliary generation backend used for re-ranking failed.
    #[error("generation backend error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("async task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
