//! Explicit per-session state with an init/ingest/retrieve/clear lifecycle.
//!
//! Everything a caller needs for one question-answering session lives in one
//! [`RagSession`] value passed into calls, instead of ambient globals: the
//! embedding provider, the pipeline configuration, the current index and the
//! skip report of the last ingestion. Dropping the session drops the state;
//! [`RagSession::clear`] additionally deletes the on-disk artifacts.

use crate::error::{PipelineError, Result};
use crate::index::{IndexStats, ScoredChunk};
use crate::loader::{SkippedFile, UploadedFile};
use crate::pipeline::{IngestOutcome, IngestionPipeline, PipelineConfig};
use crate::retriever::{Reranker, Retriever};
use std::sync::Arc;
use tome_embed::EmbeddingProvider;

/// Summary of an ingestion call, without the index (the session keeps it).
#[derive(Debug)]
pub struct IngestReport {
    pub reused: bool,
    pub documents: usize,
    pub chunks: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Session state for ingestion and retrieval over one index directory.
pub struct RagSession {
    pipeline: IngestionPipeline,
    provider: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    retriever: Option<Retriever>,
    last_skipped: Vec<SkippedFile>,
}

impl RagSession {
    pub fn new(config: PipelineConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            pipeline: IngestionPipeline::new(config, provider.clone()),
            provider,
            reranker: None,
            retriever: None,
            last_skipped: Vec::new(),
        }
    }

    /// Attach a re-ranking stage applied to every retrieval.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Whether the session holds a searchable index.
    pub fn is_ready(&self) -> bool {
        self.retriever.is_some()
    }

    /// Skip report from the most recent ingestion.
    pub fn skipped(&self) -> &[SkippedFile] {
        &self.last_skipped
    }

    /// Ingests `files` (or reuses a persisted index) and makes the session
    /// ready for retrieval.
    pub async fn ingest(&mut self, files: &[UploadedFile]) -> Result<IngestReport> {
        let IngestOutcome {
            index,
            skipped,
            reused,
            documents,
            chunks,
        } = self.pipeline.ingest(files).await?;

        self.last_skipped = skipped.clone();
        let mut retriever = Retriever::new(index, self.provider.clone());
        if let Some(reranker) = &self.reranker {
            retriever = retriever.with_reranker(reranker.clone());
        }
        self.retriever = Some(retriever);

        Ok(IngestReport {
            reused,
            documents,
            chunks,
            skipped,
        })
    }

    /// Returns up to `k` chunks relevant to `query`, best first.
    ///
    /// Fails with [`PipelineError::NoIndex`] before the first successful
    /// ingestion. Retrieval failures never affect the persisted index.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let retriever = self.retriever.as_ref().ok_or(PipelineError::NoIndex)?;
        retriever.retrieve(query, k).await
    }

    /// Statistics for the current index.
    pub async fn stats(&self) -> Result<IndexStats> {
        let retriever = self.retriever.as_ref().ok_or(PipelineError::NoIndex)?;
        retriever.index().stats().await
    }

    /// Resets the session and deletes the persisted index and spooled
    /// uploads; the next ingestion rebuilds from scratch.
    pub async fn clear(&mut self) -> Result<()> {
        self.retriever = None;
        self.last_skipped.clear();
        self.pipeline.clear().await
    }
}
