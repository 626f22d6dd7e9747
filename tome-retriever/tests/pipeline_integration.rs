//! Integration tests for the ingestion and retrieval pipeline.
//!
//! These run against the deterministic mock embedding provider so they are
//! fast and CI-friendly while still exercising the full path: loading,
//! chunking, embedding, index persistence, reuse, retrieval, and the
//! re-ranking stage.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;
use tome_embed::{EmbeddingProvider, MockEmbeddingProvider};
use tome_retriever::{
    CompressingReranker, Generator, IngestionPipeline, PipelineConfig, PipelineError, RagSession,
    Result, SkipReason, UploadedFile, VectorIndex,
};

fn txt(name: &str, content: &str) -> UploadedFile {
    UploadedFile::new(name, content.as_bytes().to_vec())
}

fn sample_files() -> Vec<UploadedFile> {
    vec![
        txt(
            "animals.txt",
            "Cats are small carnivorous mammals. They are often kept as pets.\n\n\
             Dogs are loyal companions that have lived alongside humans for millennia.",
        ),
        txt(
            "space.txt",
            "The solar system contains eight planets orbiting the sun.\n\n\
             Jupiter is the largest planet, a gas giant with dozens of moons.",
        ),
    ]
}

/// Ingesting twice against the same directory must reuse the persisted
/// index without recomputing any embeddings.
#[tokio::test]
async fn second_ingest_reuses_index_without_embedding() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let index_dir = temp.path().join("index");
    let provider = Arc::new(MockEmbeddingProvider::new());
    let pipeline = IngestionPipeline::new(PipelineConfig::new(index_dir), provider.clone());

    let first = pipeline.ingest(&sample_files()).await?;
    assert!(!first.reused);
    assert!(first.chunks > 0);
    let calls_after_first = provider.embed_calls();
    assert!(calls_after_first > 0);

    let second = pipeline.ingest(&sample_files()).await?;
    assert!(second.reused);
    assert!(second.skipped.is_empty());
    assert_eq!(second.chunks, first.chunks);
    assert_eq!(
        provider.embed_calls(),
        calls_after_first,
        "reuse must not re-embed anything"
    );

    Ok(())
}

/// Clear must actually remove the reuse state: ingesting after a clear
/// rebuilds and therefore embeds again.
#[tokio::test]
async fn clear_then_ingest_rebuilds_from_scratch() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let index_dir = temp.path().join("index");
    let spool_dir = temp.path().join("spool");
    let config = PipelineConfig::new(index_dir.clone()).with_spool_dir(spool_dir.clone());
    let provider = Arc::new(MockEmbeddingProvider::new());
    let pipeline = IngestionPipeline::new(config, provider.clone());

    pipeline.ingest(&sample_files()).await?;
    let calls_after_first = provider.embed_calls();
    assert!(spool_dir.exists());

    pipeline.clear().await?;
    assert!(!index_dir.exists());
    assert!(!spool_dir.exists());

    let rebuilt = pipeline.ingest(&sample_files()).await?;
    assert!(!rebuilt.reused);
    assert!(
        provider.embed_calls() > calls_after_first,
        "rebuild after clear must embed again"
    );

    Ok(())
}

/// A batch where every file is skipped fails with NoValidDocuments and
/// leaves nothing on disk under the index directory.
#[tokio::test]
async fn all_skipped_batch_fails_and_creates_no_index() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let index_dir = temp.path().join("index");
    let provider = Arc::new(MockEmbeddingProvider::new());
    let pipeline = IngestionPipeline::new(PipelineConfig::new(index_dir.clone()), provider.clone());

    let files = vec![
        UploadedFile::new("image.png", vec![0x89, 0x50, 0x4e, 0x47]),
        UploadedFile::new("garbage.txt", vec![0xff, 0xfe, 0x80]),
    ];

    match pipeline.ingest(&files).await {
        Err(PipelineError::NoValidDocuments { skipped }) => {
            assert_eq!(skipped.len(), 2);
            assert_eq!(skipped[0].reason, SkipReason::Unsupported);
            assert!(matches!(skipped[1].reason, SkipReason::Corrupt(_)));
        }
        other => panic!("expected NoValidDocuments, got {other:?}"),
    }

    assert!(!index_dir.exists(), "failed ingest must not create the index directory");
    assert_eq!(provider.embed_calls(), 0);

    Ok(())
}

/// End to end: a single small text file becomes exactly one chunk, and a
/// query returns it as the only (and therefore best) result.
#[tokio::test]
async fn single_small_document_round_trips_through_search() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let provider = Arc::new(MockEmbeddingProvider::new());
    let mut session = RagSession::new(
        PipelineConfig::new(temp.path().join("index")),
        provider.clone(),
    );

    let content = "The first paragraph introduces the topic briefly.\n\n\
                   The second paragraph holds the substance of the argument.\n\n\
                   The third paragraph concludes with a short summary.";
    let report = session.ingest(&[txt("essay.txt", content)]).await?;

    assert!(!report.reused);
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1, "whole file fits in one default-size chunk");
    assert!(report.skipped.is_empty());

    let results = session.retrieve("content of paragraph 2", 1).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.source_name, "essay.txt");
    assert_eq!(results[0].chunk.position, 0);
    assert_eq!(results[0].chunk.text, content);

    Ok(())
}

/// Retrieval respects k and returns scores in non-increasing order.
#[tokio::test]
async fn retrieval_bounds_and_ordering() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let provider = Arc::new(MockEmbeddingProvider::new());
    let mut session = RagSession::new(
        PipelineConfig::new(temp.path().join("index")),
        provider.clone(),
    );

    let report = session.ingest(&sample_files()).await?;
    assert!(report.chunks >= 2);

    let top_two = session.retrieve("what orbits the sun?", 2).await?;
    assert!(top_two.len() <= 2);
    for pair in top_two.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let everything = session.retrieve("what orbits the sun?", 1000).await?;
    assert_eq!(everything.len(), report.chunks);
    for pair in everything.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    assert!(matches!(
        session.retrieve("bad request", 0).await,
        Err(PipelineError::InvalidArgument(_))
    ));

    Ok(())
}

/// An index built with a 384-dimension provider must refuse to load for a
/// 768-dimension provider instead of silently producing garbage scores.
#[tokio::test]
async fn dimension_mismatch_fails_fast_at_load() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let index_dir = temp.path().join("index");
    let narrow = Arc::new(MockEmbeddingProvider::with_dimension(384));
    let pipeline = IngestionPipeline::new(PipelineConfig::new(index_dir.clone()), narrow);
    pipeline.ingest(&sample_files()).await?;

    let wide = MockEmbeddingProvider::with_dimension(768);
    match VectorIndex::load(&index_dir, &wide.model_info()).await {
        Err(PipelineError::Persistence(message)) => {
            assert!(message.contains("dimension"), "unexpected message: {message}");
        }
        other => panic!("expected Persistence error, got {other:?}"),
    }

    Ok(())
}

/// The pipeline treats an incompatible persisted index as unusable and
/// rebuilds it with the configured provider.
#[tokio::test]
async fn incompatible_persisted_index_is_rebuilt() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let index_dir = temp.path().join("index");

    let narrow = Arc::new(MockEmbeddingProvider::with_dimension(384));
    IngestionPipeline::new(PipelineConfig::new(index_dir.clone()), narrow)
        .ingest(&sample_files())
        .await?;

    let wide = Arc::new(MockEmbeddingProvider::with_dimension(768));
    let outcome = IngestionPipeline::new(PipelineConfig::new(index_dir.clone()), wide.clone())
        .ingest(&sample_files())
        .await?;

    assert!(!outcome.reused, "mismatched index must be rebuilt, not reused");
    assert!(wide.embed_calls() > 0);
    assert!(VectorIndex::load(&index_dir, &wide.model_info()).await.is_ok());

    Ok(())
}

/// Stub generator for re-ranking tests: keeps chunks mentioning the alpha
/// document, drops everything else.
struct StubGenerator;

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.contains("alpha document") {
            Ok("compressed alpha extract".to_string())
        } else {
            Ok("NO_RELEVANT_CONTENT".to_string())
        }
    }
}

/// Generator that never finds anything relevant.
struct RejectEverythingGenerator;

#[async_trait]
impl Generator for RejectEverythingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("NO_RELEVANT_CONTENT".to_string())
    }
}

#[tokio::test]
async fn reranker_compresses_and_drops_chunks() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let provider = Arc::new(MockEmbeddingProvider::new());
    let mut session = RagSession::new(
        PipelineConfig::new(temp.path().join("index")),
        provider.clone(),
    )
    .with_reranker(Arc::new(CompressingReranker::new(StubGenerator)));

    session
        .ingest(&[
            txt("alpha.txt", "this is the alpha document text"),
            txt("beta.txt", "this is the beta document text"),
        ])
        .await?;

    let results = session.retrieve("gamma question", 2).await?;
    assert!(results.len() <= 2, "re-ranking must never grow the result set");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.source_name, "alpha.txt");
    assert_eq!(results[0].chunk.text, "compressed alpha extract");

    Ok(())
}

#[tokio::test]
async fn reranker_may_drop_everything_without_error() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let provider = Arc::new(MockEmbeddingProvider::new());
    let mut session = RagSession::new(
        PipelineConfig::new(temp.path().join("index")),
        provider.clone(),
    )
    .with_reranker(Arc::new(CompressingReranker::new(RejectEverythingGenerator)));

    session.ingest(&sample_files()).await?;

    // "No grounding available" is an empty result, not an error.
    let results = session.retrieve("anything at all", 3).await?;
    assert!(results.is_empty());

    Ok(())
}

/// Skips are reported alongside a successful ingestion, and valid siblings
/// still make it into the index.
#[tokio::test]
async fn partial_batch_reports_skips_and_indexes_the_rest() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let provider = Arc::new(MockEmbeddingProvider::new());
    let mut session = RagSession::new(
        PipelineConfig::new(temp.path().join("index")),
        provider.clone(),
    );

    let report = session
        .ingest(&[
            txt("kept.txt", "perfectly fine text document"),
            UploadedFile::new("broken.pdf", b"not really a pdf".to_vec()),
            UploadedFile::new("photo.jpeg", vec![0xff, 0xd8, 0xff]),
        ])
        .await?;

    assert_eq!(report.documents, 1);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(session.skipped().len(), 2);

    let results = session.retrieve("fine text", 1).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.source_name, "kept.txt");

    Ok(())
}

/// The chunking configuration flows through the pipeline: a small max size
/// over a larger document yields several overlapping chunks, all indexed.
#[tokio::test]
async fn chunking_config_controls_index_granularity() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let config = PipelineConfig::new(temp.path().join("index"))
        .with_chunk_size(120)
        .with_chunk_overlap(20);
    let provider = Arc::new(MockEmbeddingProvider::new());
    let pipeline = IngestionPipeline::new(config, provider.clone());

    let content = "A sentence about indexing. ".repeat(30);
    let outcome = pipeline.ingest(&[txt("long.txt", &content)]).await?;

    assert!(outcome.chunks > 1, "expected multiple chunks, got {}", outcome.chunks);
    let stats = outcome.index.stats().await?;
    assert_eq!(stats.chunks, outcome.chunks);
    assert_eq!(stats.documents, 1);

    Ok(())
}
