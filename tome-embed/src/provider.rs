//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use half::f16;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Identity of the model behind a provider.
///
/// This is what gets persisted next to an index: enough to verify at load
/// time that the configured provider produces vectors in the same space and
/// dimension the index was built with. The provider itself is always
/// reconstructed from configuration, never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    /// Provider backend (e.g. "fastembed", "ollama")
    pub provider: String,
    /// Name of the embedding model
    pub model_name: String,
    /// Dimension of the embedding vectors
    pub dimension: usize,
    /// Whether vectors are L2-normalized
    pub normalized: bool,
}

impl EmbeddingModelInfo {
    pub fn new(
        provider: impl Into<String>,
        model_name: impl Into<String>,
        dimension: usize,
        normalized: bool,
    ) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
            dimension,
            normalized,
        }
    }

    /// A single string identifying this model configuration.
    pub fn model_id(&self) -> String {
        let normalized = if self.normalized { "norm" } else { "raw" };
        format!(
            "{}:{}:{}:{}",
            self.provider, self.model_name, self.dimension, normalized
        )
    }
}

/// Result of batch embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingBatch {
    /// Create a batch result, inferring the dimension from the first vector.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// Implementations must be deterministic: the same text and the same model
/// configuration produce the same vector, within floating point tolerance.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingBatch>;

    /// Get the dimension of embeddings produced by this provider
    fn dimension(&self) -> usize;

    /// Get the name/identifier of this provider backend
    fn provider_name(&self) -> &str;

    /// Get the name of the underlying model
    fn model_name(&self) -> &str;

    /// Identity of the model, suitable for persisting alongside an index.
    fn model_info(&self) -> EmbeddingModelInfo {
        EmbeddingModelInfo::new(self.provider_name(), self.model_name(), self.dimension(), true)
    }
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Process-wide cache of initialized models, so several providers with the
/// same configuration share one loaded model instead of reloading it.
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

// Deterministic cache key over the whole configuration, so two providers
// share a loaded model only when every setting matches.
fn cache_key(config: &EmbedConfig) -> String {
    let config_json = serde_json::to_string(config).expect("config always serializes");
    let mut hasher = FnvHasher::default();
    hasher.write(config_json.as_bytes());
    format!("{:x}", hasher.finish())
}

fn model_kind(model_name: &str) -> Result<EmbeddingModel> {
    match model_name {
        "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        other => Err(EmbedError::invalid_config(format!(
            "unknown embedding model: {other}"
        ))),
    }
}

/// Converts f32 model output to f16, optionally L2-normalizing first.
fn to_f16(embedding: Vec<f32>, normalize: bool) -> Vec<f16> {
    let mut embedding = embedding;
    if normalize {
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
    }
    embedding.into_iter().map(f16::from_f32).collect()
}

/// Local embedding provider running ONNX models through fastembed.
///
/// The model is fetched into the configured cache directory on first use and
/// loaded from disk afterwards; inference happens on blocking threads so it
/// never stalls the async runtime, and no process-global numeric state is
/// touched.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Loads (or reuses a cached copy of) the configured model and returns a
    /// ready provider.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let cache_key = cache_key(&config);

        let cached = {
            let cache = model_cache().lock().unwrap();
            cache
                .get(&cache_key)
                .map(|(model, dim)| (Arc::clone(model), *dim))
        };

        if let Some((model, dimension)) = cached {
            tracing::debug!(model = %config.model_name, "using cached embedding model");
            return Ok(Self {
                config,
                model,
                dimension,
            });
        }

        let kind = model_kind(&config.model_name)?;
        let model_name = config.model_name.clone();
        let cache_dir = config.cache_dir.clone();

        tracing::info!(model = %model_name, cache_dir = %cache_dir.display(), "loading embedding model");
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let options = InitOptions::new(kind)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(false);

                let mut model = TextEmbedding::try_new(options).map_err(|e| {
                    EmbedError::unavailable(format!(
                        "failed to load embedding model {model_name}: {e}"
                    ))
                })?;

                // Probe the dimension with a throwaway embedding.
                let probe = model
                    .embed(vec!["dimension probe".to_string()], None)
                    .map_err(|e| EmbedError::unavailable(format!("model self-test failed: {e}")))?;
                let dimension = probe
                    .first()
                    .map(|e| e.len())
                    .filter(|&d| d > 0)
                    .ok_or_else(|| {
                        EmbedError::unavailable("model self-test produced no embedding")
                    })?;

                Ok((model, dimension))
            })
            .await??;

        tracing::info!(model = %config.model_name, dimension, "embedding model ready");
        let model = Arc::new(Mutex::new(model));
        {
            let mut cache = model_cache().lock().unwrap();
            cache.insert(cache_key, (Arc::clone(&model), dimension));
        }

        Ok(Self {
            config,
            model,
            dimension,
        })
    }

    /// Drops all process-cached models.
    pub fn clear_model_cache() {
        model_cache().lock().unwrap().clear();
    }

    /// Number of models currently cached in this process.
    pub fn cached_model_count() -> usize {
        model_cache().lock().unwrap().len()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_one(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let batch = self.embed_many(&texts).await?;
        batch
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::unavailable("no embedding generated for text"))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::new(vec![]));
        }

        tracing::debug!(count = texts.len(), "generating embeddings");
        let normalize = self.config.normalize;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let raw = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model = model.lock().unwrap();
                model
                    .embed(batch, None)
                    .map_err(|e| EmbedError::unavailable(format!("embedding failed: {e}")))
            })
            .await??;

            all_embeddings.extend(raw.into_iter().map(|e| to_f16(e, normalize)));
        }

        Ok(EmbeddingBatch::new(all_embeddings))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn model_info(&self) -> EmbeddingModelInfo {
        EmbeddingModelInfo::new(
            self.provider_name(),
            self.model_name(),
            self.dimension,
            self.config.normalize,
        )
    }
}

const DEFAULT_OLLAMA_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote embedding provider backed by an Ollama-compatible HTTP endpoint.
///
/// Every request carries a timeout so a hung server surfaces as
/// [`EmbedError::ProviderUnavailable`] instead of wedging the pipeline.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OllamaProvider {
    /// Create a provider for `model` served at `endpoint`
    /// (e.g. `http://localhost:11434`). `dimension` must match what the
    /// model actually produces; responses are checked against it.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        Self::with_timeout(endpoint, model, dimension, DEFAULT_OLLAMA_TIMEOUT)
    }

    /// Like [`OllamaProvider::new`] with an explicit per-request timeout.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedError::invalid_config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
        })
    }

    async fn embed_remote(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&Request {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| EmbedError::unavailable(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EmbedError::unavailable(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| EmbedError::unavailable(format!("malformed response from {url}: {e}")))?;

        if body.embedding.len() != self.dimension {
            return Err(EmbedError::invalid_config(format!(
                "model {} returned {}-dimension vectors, expected {}",
                self.model,
                body.embedding.len(),
                self.dimension
            )));
        }

        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_one(&self, text: &str) -> Result<Vec<f16>> {
        Ok(to_f16(self.embed_remote(text).await?, true))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        // The embeddings endpoint takes one prompt per call.
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(to_f16(self.embed_remote(text).await?, true));
        }
        Ok(EmbeddingBatch::new(embeddings))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic provider for tests: vectors are derived from a hash of the
/// input text, and every `embed_*` call is counted so tests can assert how
/// often embedding actually ran (e.g. that index reuse skipped it).
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: AtomicUsize,
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::with_dimension(384)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_one`/`embed_many` calls served so far.
    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f16> {
        let components: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let mut hasher = FnvHasher::default();
                hasher.write(text.as_bytes());
                hasher.write_usize(i);
                // Map the hash onto [-1, 1).
                (hasher.finish() % 2000) as f32 / 1000.0 - 1.0
            })
            .collect();
        to_f16(components, true)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_one(&self, text: &str) -> Result<Vec<f16>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EmbeddingBatch::new(
            texts.iter().map(|t| self.vector_for(t)).collect(),
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "hashed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_batch() {
        let embeddings = vec![
            vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3)],
            vec![f16::from_f32(0.4), f16::from_f32(0.5), f16::from_f32(0.6)],
        ];
        let batch = EmbeddingBatch::new(embeddings);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.dimension, 3);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_model_id() {
        let info = EmbeddingModelInfo::new("fastembed", "all-MiniLM-L6-v2", 384, true);
        assert_eq!(info.model_id(), "fastembed:all-MiniLM-L6-v2:384:norm");
    }

    #[test]
    fn test_model_kind_rejects_unknown_names() {
        assert!(model_kind("all-MiniLM-L6-v2").is_ok());
        assert!(matches!(
            model_kind("no-such-model"),
            Err(EmbedError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_cache_key_is_deterministic_per_config() {
        let a = EmbedConfig::minilm_l6("models");
        let b = EmbedConfig::minilm_l6("models");
        assert_eq!(cache_key(&a), cache_key(&b));

        let c = EmbedConfig::bge_small("models");
        assert_ne!(cache_key(&a), cache_key(&c));

        let d = EmbedConfig::minilm_l6("elsewhere");
        assert_ne!(cache_key(&a), cache_key(&d));
    }

    #[test]
    fn test_normalization() {
        let vector = to_f16(vec![3.0, 4.0], true);
        let norm: f32 = vector.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>();
        assert!((norm - 1.0).abs() < 1e-2);

        let raw = to_f16(vec![3.0, 4.0], false);
        assert_eq!(f32::from(raw[0]), 3.0);
        assert_eq!(f32::from(raw[1]), 4.0);
    }

    #[tokio::test]
    async fn test_mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let texts = vec![
            "Hello world".to_string(),
            "Goodbye world".to_string(),
            "Hello world".to_string(),
        ];

        let first = provider.embed_many(&texts).await.unwrap();
        let second = provider.embed_many(&texts).await.unwrap();

        assert_eq!(first.embeddings, second.embeddings);
        assert_eq!(first.embeddings[0], first.embeddings[2]);
        assert_ne!(first.embeddings[0], first.embeddings[1]);
        assert_eq!(first.dimension, 384);
    }

    #[tokio::test]
    async fn test_mock_provider_counts_calls() {
        let provider = MockEmbeddingProvider::with_dimension(8);
        assert_eq!(provider.embed_calls(), 0);

        provider.embed_one("a").await.unwrap();
        provider
            .embed_many(&["b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(provider.embed_calls(), 2);
        assert_eq!(provider.dimension(), 8);
    }

    #[tokio::test]
    async fn test_ollama_provider_unreachable_endpoint() {
        // Nothing listens on this port; the failure must surface as
        // ProviderUnavailable rather than a panic or generic error.
        let provider = OllamaProvider::with_timeout(
            "http://127.0.0.1:1",
            "nomic-embed-text",
            768,
            Duration::from_millis(250),
        )
        .unwrap();

        let result = provider.embed_one("hello").await;
        assert!(matches!(
            result,
            Err(EmbedError::ProviderUnavailable { .. })
        ));
    }
}
