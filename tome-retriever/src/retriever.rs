//! Query-time retrieval, with an optional generative re-ranking stage.
//!
//! The base retriever embeds the query and delegates to the index; it is
//! complete and correct on its own. A [`Reranker`] can be attached as a
//! post-filter: it receives the raw top-k results and the query, and may
//! rewrite or drop chunks but never add any. [`CompressingReranker`] asks an
//! auxiliary generation backend to extract only the query-relevant part of
//! each chunk, dropping chunks the backend judges irrelevant; an empty
//! result after re-ranking means "no grounding available" and is not an
//! error. If the re-ranking call itself fails, retrieval degrades to the
//! vector-ranked results rather than failing.

use crate::error::{PipelineError, Result};
use crate::index::{ScoredChunk, VectorIndex};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tome_embed::EmbeddingProvider;
use tracing::{debug, warn};

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Answers "top-k relevant chunks for a query" against a [`VectorIndex`].
pub struct Retriever {
    index: VectorIndex,
    provider: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl Retriever {
    pub fn new(index: VectorIndex, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            provider,
            reranker: None,
        }
    }

    /// Attach a re-ranking stage to run after index search.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Returns up to `k` chunks relevant to `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.provider.embed_one(query).await?;
        let results = self.index.search(&query_vector, k).await?;
        debug!(query, results = results.len(), "index search complete");

        let Some(reranker) = &self.reranker else {
            return Ok(results);
        };

        match reranker.rerank(query, results.clone()).await {
            Ok(mut kept) => {
                // A reranker filters; it must never grow the result set.
                kept.truncate(results.len());
                debug!(
                    before = results.len(),
                    after = kept.len(),
                    "re-ranking complete"
                );
                Ok(kept)
            }
            Err(error) => {
                warn!(%error, "re-ranking failed, returning vector-ranked results");
                Ok(results)
            }
        }
    }
}

/// Post-filter over retrieval results: may rewrite or drop chunks, never
/// adds any.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, results: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>>;
}

/// Auxiliary text-generation backend used by [`CompressingReranker`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Reply a generator uses to signal that a chunk carries nothing relevant.
const NO_RELEVANT_CONTENT: &str = "NO_RELEVANT_CONTENT";

/// Re-ranker that asks a generation backend to extract the query-relevant
/// portion of each chunk and drops chunks with no relevant content.
pub struct CompressingReranker<G> {
    generator: G,
}

impl<G: Generator> CompressingReranker<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    fn prompt_for(query: &str, chunk_text: &str) -> String {
        format!(
            "Extract the passages from the excerpt below that are relevant to the \
             question. Reply with the extracted text only, or {NO_RELEVANT_CONTENT} \
             if nothing in the excerpt applies.\n\n\
             Question: {query}\n\nExcerpt:\n{chunk_text}\n"
        )
    }
}

#[async_trait]
impl<G: Generator> Reranker for CompressingReranker<G> {
    async fn rerank(&self, query: &str, results: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>> {
        let mut kept = Vec::with_capacity(results.len());

        for mut scored in results {
            let prompt = Self::prompt_for(query, &scored.chunk.text);
            let reply = self.generator.generate(&prompt).await?;
            let reply = reply.trim();

            if reply.is_empty() || reply.eq_ignore_ascii_case(NO_RELEVANT_CONTENT) {
                debug!(
                    source = %scored.chunk.source_name,
                    position = scored.chunk.position,
                    "chunk dropped by re-ranker"
                );
                continue;
            }

            scored.chunk.text = reply.to_string();
            kept.push(scored);
        }

        Ok(kept)
    }
}

const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

/// [`Generator`] backed by an Ollama-compatible `/api/generate` endpoint,
/// with a bounded per-request timeout so a hung model cannot wedge
/// retrieval.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, model, DEFAULT_GENERATE_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
        }

        #[derive(Deserialize)]
        struct Response {
            response: String,
        }

        let url = format!("{}/api/generate", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&Request {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| PipelineError::Generation(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::Generation(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| PipelineError::Generation(format!("malformed response from {url}: {e}")))?;

        Ok(body.response)
    }
}
