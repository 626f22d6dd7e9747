//! SQLite-backed vector index over document chunks.
//!
//! An index is a single `index.db` file inside its index directory, holding
//! one row per chunk (text plus its `f16` embedding blob) and one identity
//! row describing the embedding model the vectors came from. The identity
//! row is what makes persistence safe to reuse: loading verifies it against
//! the live provider and fails fast on any dimension or model mismatch
//! instead of silently producing meaningless scores.
//!
//! Search is an exhaustive cosine scan. For a single-session tool indexing a
//! handful of uploaded documents this comfortably beats the complexity of an
//! approximate-nearest-neighbor structure.

use crate::error::{PipelineError, Result};
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;
use tome_chunk::Chunk;
use tome_embed::EmbeddingModelInfo;

/// Database file name inside an index directory.
pub const INDEX_FILE_NAME: &str = "index.db";

/// A chunk with its relevance score for some query, highest first.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Counts describing an index.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub chunks: usize,
    pub documents: usize,
}

/// Searchable store of `(embedding, chunk)` entries with round-trip
/// persistence.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pool: SqlitePool,
    model: EmbeddingModelInfo,
}

impl VectorIndex {
    /// Whether a persisted index exists under `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE_NAME).is_file()
    }

    /// Builds and persists an index at `dir` from `(embedding, chunk)`
    /// entries produced by a provider matching `model`.
    ///
    /// Fails with [`PipelineError::EmptyIndexInput`] before touching the
    /// filesystem when `entries` is empty, so an aborted ingestion leaves no
    /// directory behind. All rows are written in one transaction.
    pub async fn build(
        dir: &Path,
        model: &EmbeddingModelInfo,
        entries: &[(Vec<f16>, Chunk)],
    ) -> Result<Self> {
        validate_entries(model, entries)?;

        tokio::fs::create_dir_all(dir).await?;
        let options = connect_options(&dir.join(INDEX_FILE_NAME)).create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        Self::initialize(pool, model, entries).await
    }

    /// Builds an index in memory; used by tests that do not need a
    /// directory on disk.
    pub async fn build_memory(
        model: &EmbeddingModelInfo,
        entries: &[(Vec<f16>, Chunk)],
    ) -> Result<Self> {
        validate_entries(model, entries)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::initialize(pool, model, entries).await
    }

    async fn initialize(
        pool: SqlitePool,
        model: &EmbeddingModelInfo,
        entries: &[(Vec<f16>, Chunk)],
    ) -> Result<Self> {
        create_tables(&pool).await?;

        let info_json = serde_json::to_string(model)
            .map_err(|e| PipelineError::Persistence(format!("failed to encode model identity: {e}")))?;

        let mut tx = pool.begin().await?;
        sqlx::query("INSERT INTO index_model (id, info_json, created_at) VALUES (1, ?1, ?2)")
            .bind(&info_json)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        for (embedding, chunk) in entries {
            sqlx::query(
                "INSERT INTO chunks (source_name, position, content, embedding) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&chunk.source_name)
            .bind(chunk.position as i64)
            .bind(&chunk.text)
            .bind(bytemuck::cast_slice::<f16, u8>(embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(chunks = entries.len(), model = %model.model_id(), "index built");
        Ok(Self {
            pool,
            model: model.clone(),
        })
    }

    /// Loads a persisted index from `dir`, verifying that it was built by a
    /// model matching `expected`.
    ///
    /// Missing or unreadable databases, and identity/dimension mismatches,
    /// all fail with [`PipelineError::Persistence`]; an index built with
    /// 384-dimension vectors is never silently queried with a 768-dimension
    /// provider.
    pub async fn load(dir: &Path, expected: &EmbeddingModelInfo) -> Result<Self> {
        let db_path = dir.join(INDEX_FILE_NAME);
        if !db_path.is_file() {
            return Err(PipelineError::Persistence(format!(
                "no index found at {}",
                dir.display()
            )));
        }

        let pool = SqlitePool::connect_with(connect_options(&db_path))
            .await
            .map_err(|e| {
                PipelineError::Persistence(format!(
                    "failed to open index at {}: {e}",
                    dir.display()
                ))
            })?;

        let row = sqlx::query("SELECT info_json FROM index_model WHERE id = 1")
            .fetch_optional(&pool)
            .await
            .map_err(|e| {
                PipelineError::Persistence(format!(
                    "index at {} is corrupt: {e}",
                    dir.display()
                ))
            })?
            .ok_or_else(|| {
                PipelineError::Persistence(format!(
                    "index at {} has no model identity record",
                    dir.display()
                ))
            })?;

        let info_json: String = row.get("info_json");
        let stored: EmbeddingModelInfo = serde_json::from_str(&info_json).map_err(|e| {
            PipelineError::Persistence(format!("unreadable model identity record: {e}"))
        })?;

        if stored.dimension != expected.dimension {
            return Err(PipelineError::Persistence(format!(
                "index was built with {}-dimension vectors but the configured provider produces {} dimensions",
                stored.dimension, expected.dimension
            )));
        }
        if stored.model_id() != expected.model_id() {
            return Err(PipelineError::Persistence(format!(
                "index was built with model {} but the configured provider is {}",
                stored.model_id(),
                expected.model_id()
            )));
        }

        tracing::debug!(dir = %dir.display(), model = %stored.model_id(), "loaded persisted index");
        Ok(Self {
            pool,
            model: stored,
        })
    }

    /// Identity of the model this index was built with.
    pub fn model(&self) -> &EmbeddingModelInfo {
        &self.model
    }

    /// Returns the `k` entries nearest to `query` by cosine similarity,
    /// highest score first.
    ///
    /// `k` of zero and dimension-mismatched queries are
    /// [`PipelineError::InvalidArgument`]; a `k` beyond the entry count
    /// returns everything. Score ties are broken by chunk position, then
    /// source name, so results are deterministic.
    pub async fn search(&self, query: &[f16], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(PipelineError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        if query.len() != self.model.dimension {
            return Err(PipelineError::InvalidArgument(format!(
                "query vector has dimension {}, index expects {}",
                query.len(),
                self.model.dimension
            )));
        }

        let rows = sqlx::query(
            "SELECT source_name, position, content, embedding FROM chunks ORDER BY source_name, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let source_name: String = row.get("source_name");
            let position: i64 = row.get("position");
            let content: String = row.get("content");
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let embedding = bytemuck::cast_slice::<u8, f16>(&embedding_bytes);

            scored.push(ScoredChunk {
                score: cosine_similarity(query, embedding),
                chunk: Chunk {
                    source_name,
                    position: position as usize,
                    text: content,
                },
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.position.cmp(&b.chunk.position))
                .then_with(|| a.chunk.source_name.cmp(&b.chunk.source_name))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Chunk and document counts for this index.
    pub async fn stats(&self) -> Result<IndexStats> {
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source_name) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        Ok(IndexStats {
            chunks: chunks as usize,
            documents: documents as usize,
        })
    }
}

fn validate_entries(model: &EmbeddingModelInfo, entries: &[(Vec<f16>, Chunk)]) -> Result<()> {
    if entries.is_empty() {
        return Err(PipelineError::EmptyIndexInput);
    }
    for (embedding, chunk) in entries {
        if embedding.len() != model.dimension {
            return Err(PipelineError::InvalidArgument(format!(
                "embedding for chunk {} of {} has dimension {}, expected {}",
                chunk.position,
                chunk.source_name,
                embedding.len(),
                model.dimension
            )));
        }
    }
    Ok(())
}

fn connect_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
}

async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_model (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            info_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_name TEXT NOT NULL,
            position INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            CONSTRAINT unique_chunk UNIQUE(source_name, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_name)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Cosine similarity between two f16 embedding vectors.
fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f32::from(*x) * f32::from(*y))
        .sum();
    let norm_a: f32 = a.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
