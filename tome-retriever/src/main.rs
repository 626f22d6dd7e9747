use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tome_embed::{EmbedConfig, FastEmbedProvider};
use tome_retriever::{
    IngestionPipeline, PipelineConfig, PipelineError, RagSession, UploadedFile, DEFAULT_TOP_K,
};

/// Ingest documents into a local vector index and retrieve the passages
/// most relevant to a question.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the persisted vector index
    #[arg(long, default_value = "tome-index")]
    index_dir: PathBuf,

    /// Directory the embedding model is cached in
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest documents (.pdf or .txt) into the index
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Retrieve the passages most relevant to a question
    Query {
        /// The question to search for
        text: String,
        /// Maximum number of passages to return
        #[arg(short, long, default_value_t = DEFAULT_TOP_K)]
        k: usize,
    },
    /// Show index statistics
    Stats,
    /// Delete the persisted index; the next ingest rebuilds from scratch
    Clear,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = PipelineConfig::new(args.index_dir.clone());

    // Clear needs no embedding model; do not load one just to delete files.
    if matches!(args.command, Commands::Clear) {
        IngestionPipeline::clear_artifacts(&config).await?;
        println!("Cleared index at {}", args.index_dir.display());
        return Ok(());
    }

    let provider = Arc::new(FastEmbedProvider::create(EmbedConfig::minilm_l6(&args.model_dir)).await?);
    let mut session = RagSession::new(config, provider);

    match args.command {
        Commands::Ingest { files } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(UploadedFile::from_path(path).await?);
            }

            let report = session.ingest(&uploads).await?;
            if report.reused {
                println!(
                    "Reused persisted index at {} ({} chunks from {} documents); run `clear` to rebuild",
                    args.index_dir.display(),
                    report.chunks,
                    report.documents
                );
            } else {
                println!(
                    "Indexed {} chunks from {} documents",
                    report.chunks, report.documents
                );
            }
            for skip in &report.skipped {
                println!("Skipped {}: {}", skip.name, skip.reason);
            }
        }
        Commands::Query { text, k } => {
            open_existing(&mut session, &args.index_dir).await?;
            let results = session.retrieve(&text, k).await?;
            if results.is_empty() {
                println!("No relevant passages found.");
            }
            for result in results {
                println!(
                    "[{:.3}] {} #{}\n{}\n",
                    result.score, result.chunk.source_name, result.chunk.position, result.chunk.text
                );
            }
        }
        Commands::Stats => {
            open_existing(&mut session, &args.index_dir).await?;
            let stats = session.stats().await?;
            println!(
                "{} chunks from {} documents at {}",
                stats.chunks,
                stats.documents,
                args.index_dir.display()
            );
        }
        Commands::Clear => unreachable!(),
    }

    Ok(())
}

/// Loads the persisted index through the ingestion reuse path. An empty
/// upload batch only succeeds when an index already exists.
async fn open_existing(session: &mut RagSession, index_dir: &PathBuf) -> anyhow::Result<()> {
    match session.ingest(&[]).await {
        Ok(report) if report.reused => Ok(()),
        Ok(_) | Err(PipelineError::NoValidDocuments { .. }) => Err(anyhow::anyhow!(
            "no index at {}; run `ingest` first",
            index_dir.display()
        )),
        Err(e) => Err(e.into()),
    }
}
