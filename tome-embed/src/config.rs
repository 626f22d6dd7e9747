//! Configuration for embedding models

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Configuration for a local embedding model.
///
/// `cache_dir` is where downloaded model files live; only the very first use
/// of a model touches the network, every later run loads from this
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Directory the model files are cached in
    pub cache_dir: PathBuf,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to normalize embeddings
    pub normalize: bool,
}

impl EmbedConfig {
    /// Create a configuration for a named model cached under `cache_dir`.
    pub fn new(model_name: impl Into<String>, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            model_name: model_name.into(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
            batch_size: 32,
            normalize: true,
        }
    }

    /// Configuration for `all-MiniLM-L6-v2` (384 dimensions), the default
    /// general-purpose sentence embedding model.
    pub fn minilm_l6(cache_dir: impl AsRef<Path>) -> Self {
        Self::new("all-MiniLM-L6-v2", cache_dir)
    }

    /// Configuration for `all-MiniLM-L12-v2` (384 dimensions), a slower but
    /// slightly stronger sibling of the default model.
    pub fn minilm_l12(cache_dir: impl AsRef<Path>) -> Self {
        Self::new("all-MiniLM-L12-v2", cache_dir)
    }

    /// Configuration for `bge-small-en-v1.5` (384 dimensions).
    pub fn bge_small(cache_dir: impl AsRef<Path>) -> Self {
        Self::new("bge-small-en-v1.5", cache_dir)
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::minilm_l6("models")
    }
}
