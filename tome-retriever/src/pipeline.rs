//! Ingestion orchestration: load, chunk, embed, index.
//!
//! The pipeline is reuse-first: when a persisted index already exists at the
//! configured directory it is loaded and returned as-is, and no uploaded
//! file is even decoded. This trades "always fresh" for fast repeated
//! startup; adding documents to an existing index means clearing and
//! rebuilding. An index that exists but cannot be loaded (corrupt, or built
//! by an incompatible embedding model) is removed and rebuilt.
//!
//! The reuse check followed by a build is not atomic. A single session
//! invoking ingestion synchronously never notices; two processes racing on
//! the same index directory would, and callers who need that must add their
//! own exclusive lock around [`IngestionPipeline::ingest`].

use crate::error::{PipelineError, Result};
use crate::index::VectorIndex;
use crate::loader::{Loader, SkippedFile, UploadedFile};
use half::f16;
use std::path::PathBuf;
use std::sync::Arc;
use tome_chunk::{Chunk, TextSplitter, DEFAULT_CHUNK_OVERLAP, DEFAULT_MAX_CHUNK_SIZE};
use tome_embed::{EmbedError, EmbeddingProvider};
use tracing::{debug, info, warn};

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory the persisted index lives in
    pub index_dir: PathBuf,
    /// Maximum chunk length in bytes
    pub max_chunk_size: usize,
    /// Overlap between consecutive chunks of one document, in bytes
    pub chunk_overlap: usize,
    /// Optional directory raw uploads are spooled into before extraction
    pub spool_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(index_dir: PathBuf) -> Self {
        Self {
            index_dir,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            spool_dir: None,
        }
    }

    pub fn with_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_spool_dir(mut self, spool_dir: PathBuf) -> Self {
        self.spool_dir = Some(spool_dir);
        self
    }
}

/// Result of an ingestion call: the searchable index plus the skip report.
#[derive(Debug)]
pub struct IngestOutcome {
    /// The loaded or freshly built index
    pub index: VectorIndex,
    /// Files that were skipped, with reasons (empty when the index was
    /// reused, since nothing was decoded)
    pub skipped: Vec<SkippedFile>,
    /// Whether an existing persisted index was reused instead of rebuilt
    pub reused: bool,
    /// Number of documents represented in the index
    pub documents: usize,
    /// Number of chunks in the index
    pub chunks: usize,
}

/// Orchestrates Loader, chunker, embedding provider and index build.
pub struct IngestionPipeline {
    config: PipelineConfig,
    provider: Arc<dyn EmbeddingProvider>,
}

impl IngestionPipeline {
    pub fn new(config: PipelineConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingests `files` into the configured index directory, or returns the
    /// index already persisted there.
    ///
    /// Fatal conditions ([`PipelineError::NoValidDocuments`] when every
    /// file was skipped, [`EmbedError::ProviderUnavailable`] when the
    /// embedding backend is down) abort the call with nothing persisted.
    pub async fn ingest(&self, files: &[UploadedFile]) -> Result<IngestOutcome> {
        let model = self.provider.model_info();

        if VectorIndex::exists(&self.config.index_dir) {
            match VectorIndex::load(&self.config.index_dir, &model).await {
                Ok(index) => {
                    let stats = index.stats().await?;
                    info!(
                        index_dir = %self.config.index_dir.display(),
                        chunks = stats.chunks,
                        "reusing persisted index"
                    );
                    return Ok(IngestOutcome {
                        index,
                        skipped: Vec::new(),
                        reused: true,
                        documents: stats.documents,
                        chunks: stats.chunks,
                    });
                }
                Err(PipelineError::Persistence(reason)) => {
                    warn!(%reason, "existing index is unusable, rebuilding");
                    tokio::fs::remove_dir_all(&self.config.index_dir).await?;
                }
                Err(other) => return Err(other),
            }
        }

        let mut loader = Loader::new();
        if let Some(spool_dir) = &self.config.spool_dir {
            loader = loader.with_spool_dir(spool_dir.clone());
        }
        let (documents, skipped) = loader.load_all(files).await;
        if documents.is_empty() {
            return Err(PipelineError::NoValidDocuments { skipped });
        }

        let splitter = TextSplitter::new(self.config.max_chunk_size, self.config.chunk_overlap);
        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            let document_chunks = splitter.split(&document.source_name, &document.content);
            debug!(
                source = %document.source_name,
                chunks = document_chunks.len(),
                "chunked document"
            );
            chunks.extend(document_chunks);
        }

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "embedding chunks"
        );
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batch = self.provider.embed_many(&texts).await?;
        if batch.len() != chunks.len() {
            return Err(PipelineError::Provider(EmbedError::invalid_config(format!(
                "provider returned {} embeddings for {} chunks",
                batch.len(),
                chunks.len()
            ))));
        }

        let entries: Vec<(Vec<f16>, Chunk)> =
            batch.embeddings.into_iter().zip(chunks).collect();
        let index = VectorIndex::build(&self.config.index_dir, &model, &entries).await?;
        info!(
            index_dir = %self.config.index_dir.display(),
            chunks = entries.len(),
            "index built and persisted"
        );

        Ok(IngestOutcome {
            index,
            skipped,
            reused: false,
            documents: documents.len(),
            chunks: entries.len(),
        })
    }

    /// Deletes the persisted index and any spooled uploads. The next
    /// [`ingest`](IngestionPipeline::ingest) rebuilds from scratch.
    pub async fn clear(&self) -> Result<()> {
        Self::clear_artifacts(&self.config).await
    }

    /// [`clear`](IngestionPipeline::clear) without needing a provider, for
    /// callers that only want to delete on-disk state.
    pub async fn clear_artifacts(config: &PipelineConfig) -> Result<()> {
        let dirs = [Some(&config.index_dir), config.spool_dir.as_ref()];
        for dir in dirs.into_iter().flatten() {
            if dir.exists() {
                tokio::fs::remove_dir_all(dir).await?;
                debug!(dir = %dir.display(), "removed");
            }
        }
        Ok(())
    }
}
