//! # tome-embed
//!
//! Text embedding providers behind one small trait, with a focus on local
//! ONNX inference via FastEmbed. Documents and queries go in, fixed-length
//! normalized vectors come out.
//!
//! ## Backends
//!
//! - [`FastEmbedProvider`]: local ONNX models (no network after the first
//!   model fetch into the cache directory)
//! - [`OllamaProvider`]: remote Ollama-compatible HTTP endpoint with bounded
//!   request timeouts
//! - [`MockEmbeddingProvider`]: deterministic hashed vectors with call
//!   counting, for tests
//!
//! All backends implement [`EmbeddingProvider`] and are selected by explicit
//! configuration at construction time. Vectors are stored as half-precision
//! (`f16`) to halve the memory and disk footprint of an index.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tome_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> tome_embed::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::minilm_l6("models")).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let batch = provider.embed_many(&texts).await?;
//!
//! println!("{} embeddings of dimension {}", batch.len(), batch.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] with [`EmbedError`]. The variant
//! consumers branch on is [`EmbedError::ProviderUnavailable`]: it means the
//! backend cannot serve embeddings at all, and callers building an index
//! must abort rather than persist partial state.

pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{
    EmbeddingBatch, EmbeddingModelInfo, EmbeddingProvider, FastEmbedProvider,
    MockEmbeddingProvider, OllamaProvider,
};
