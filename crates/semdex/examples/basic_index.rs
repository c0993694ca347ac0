//! Basic example: Indexing a directory and searching it
//!
//! Indexes every UTF-8 file in a directory into an in-memory store using the
//! hash embedder, then runs one query against it. No credentials or database
//! are needed.
//!
//! Run with:
//! ```bash
//! cargo run --example basic_index -- /path/to/directory "your query"
//! ```

use anyhow::{Context, Result};
use semdex_chunker::ChunkingDispatcher;
use semdex_core::{ChunkConfig, Document, DocumentFormat, VectorStore};
use semdex_embed::{EmbedderPool, HashEmbedder};
use semdex_index::{IndexPipeline, IndexPipelineConfig, IndexUpdate, StaticMetadataBuilder};
use semdex_query::{SearchConfig, SearchPipeline};
use semdex_store::MemoryStore;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const EMBEDDING_DIM: usize = 256;
const COLLECTION: &str = "example";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <directory> <query>", args[0]);
        eprintln!("\nExample:");
        eprintln!("  {} ./docs \"how do I configure logging\"", args[0]);
        std::process::exit(1);
    }

    let source = PathBuf::from(&args[1]);
    if !source.is_dir() {
        anyhow::bail!("Directory does not exist: {}", source.display());
    }

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    let pool = Arc::new(EmbedderPool::new(Arc::new(HashEmbedder::new(EMBEDDING_DIM)), 4));
    let builder = Arc::new(StaticMetadataBuilder::default().with("source", "basic_index"));

    let index = IndexPipeline::new(
        Arc::new(ChunkingDispatcher::with_defaults(ChunkConfig::default())),
        Some(builder),
        pool.clone(),
        store.clone(),
        IndexPipelineConfig {
            collection: COLLECTION.to_string(),
            ..Default::default()
        },
    );

    // Spawn a task to log progress
    let mut updates = index.subscribe();
    let progress_task = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                IndexUpdate::Committed {
                    document_id,
                    chunk_count,
                    ..
                } => info!("Indexed: {} ({} chunks)", document_id, chunk_count),
                IndexUpdate::Failed { document_id, error } => {
                    warn!("Error indexing {}: {}", document_id, error);
                }
                IndexUpdate::Started { .. } | IndexUpdate::StageCompleted { .. } => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    let mut entries = tokio::fs::read_dir(&source)
        .await
        .with_context(|| format!("Failed to read {}", source.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(text) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        let document = Document::new(path.display().to_string(), DocumentFormat::Text, text);
        // Failures are reported through the update channel
        let _ = index.index(&document, &cancel).await;
    }

    let stats = store.stats(COLLECTION).await?;
    info!(
        "Indexing complete: {} documents, {} records",
        stats.total_documents, stats.total_records
    );

    let search = SearchPipeline::new(
        pool,
        store,
        SearchConfig {
            collection: COLLECTION.to_string(),
            ..Default::default()
        },
    );
    let results = search.search(&search.request(args[2].as_str()), &cancel).await?;
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}#{}",
            rank + 1,
            result.score,
            result.document_id,
            result.sequence_index
        );
    }

    drop(index);
    progress_task.await?;

    Ok(())
}
