//! tome-retriever: document ingestion and retrieval for question answering
//!
//! This crate turns uploaded documents into a persistent, searchable vector
//! index and answers "which chunks are relevant to this question" so an
//! external answer generator can ground its output in them.
//!
//! ## Key Modules
//!
//! - **[`loader`]**: decodes uploaded PDF/text bytes into raw documents,
//!   skipping (and reporting) anything unreadable
//! - **[`index`]**: SQLite-backed vector index with save/load and a
//!   provider-identity check at load time
//! - **[`pipeline`]**: reuse-first ingestion (load → chunk → embed → build)
//! - **[`retriever`]**: top-k retrieval plus an optional generative
//!   re-ranking/compression stage
//! - **[`session`]**: explicit session object owning the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use tome_embed::{EmbedConfig, FastEmbedProvider};
//! use tome_retriever::{PipelineConfig, RagSession, UploadedFile};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = Arc::new(FastEmbedProvider::create(EmbedConfig::minilm_l6("models")).await?);
//! let mut session = RagSession::new(PipelineConfig::new(PathBuf::from("tome-index")), provider);
//!
//! let files = vec![UploadedFile::from_path(std::path::Path::new("notes.txt")).await?];
//! let report = session.ingest(&files).await?;
//! println!("{} chunks indexed ({} files skipped)", report.chunks, report.skipped.len());
//!
//! for result in session.retrieve("what are the notes about?", 3).await? {
//!     println!("[{:.3}] {}", result.score, result.chunk.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! UploadedFile → Loader → TextSplitter → EmbeddingProvider → VectorIndex
//!                  │                                             │
//!             skip report                              SQLite persistence
//!                                                               │
//!              query → Retriever (→ Reranker) ←─────── load / reuse
//! ```

pub mod error;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod retriever;
pub mod session;

pub use error::{PipelineError, Result};
pub use index::{IndexStats, ScoredChunk, VectorIndex};
pub use loader::{DocumentKind, Loader, RawDocument, SkipReason, SkippedFile, UploadedFile};
pub use pipeline::{IngestOutcome, IngestionPipeline, PipelineConfig};
pub use retriever::{
    CompressingReranker, Generator, OllamaGenerator, Reranker, Retriever, DEFAULT_TOP_K,
};
pub use session::{IngestReport, RagSession};
