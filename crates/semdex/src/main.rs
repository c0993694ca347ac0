//! # semdex CLI
//!
//! Command-line interface for semdex, a semantic document index.
//!
//! Documents are chunked by declared format, embedded and committed to a
//! vector store, then searched by similarity.
//!
//! ## Commands
//!
//! - `semdex index <FILE>...` - Index documents (re-indexing replaces the prior version)
//! - `semdex search <QUERY>` - Search indexed content
//! - `semdex delete <DOCUMENT_ID>` - Remove a document's records
//! - `semdex status` - Show collection statistics
//! - `semdex config show|init|path` - Manage configuration
//!
//! ## Examples
//!
//! ```bash
//! # Index a file under an explicit id
//! semdex index handbook.html --id handbook
//!
//! # Search with a metadata filter
//! semdex search "leave policy" --filter product=coopwise
//!
//! # Get JSON output
//! semdex --format json search "vacation days" -k 3
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use semdex_core::{
    Document, DocumentContent, DocumentFormat, MetadataFilter, MetadataValue, PipelineError,
    SearchResult,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod components;
mod config;

use components::create_components;
use config::{data_dir, Config};

#[derive(Parser)]
#[command(name = "semdex")]
#[command(about = "Chunk, embed, store and search documents")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/semdex/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one or more documents
    Index {
        /// Files to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Document id (single file only, defaults to the file path)
        #[arg(long)]
        id: Option<String>,

        /// Declared format (text, json, html, pdf), guessed from the extension if omitted
        #[arg(long)]
        doc_format: Option<String>,

        /// Source metadata as key=value, repeatable
        #[arg(short, long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, MetadataValue)>,
    },

    /// Search the index
    Search {
        /// Query string
        query: String,

        /// Maximum results (default from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Metadata equality filter as key=value, repeatable
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, MetadataValue)>,

        /// Drop results scoring below this value
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Delete every record of a document
    Delete {
        /// Document id
        document_id: String,
    },

    /// Show collection status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for search results.
#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: &'a [SearchResult],
}

/// Output structure for status.
#[derive(Serialize)]
struct StatusOutput {
    backend: String,
    collection: String,
    total_documents: u64,
    total_records: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.clone()).context("Failed to load config")?;

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::from_str(&config.logging.level).unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Index {
            paths,
            id,
            doc_format,
            metadata,
        } => {
            if id.is_some() && paths.len() > 1 {
                anyhow::bail!("--id can only be used with a single file");
            }
            let components = create_components(&config).await?;

            let mut failed = 0usize;
            for path in &paths {
                let mut document = read_document(path, id.clone(), doc_format.as_deref())?;
                for (key, value) in &metadata {
                    document.metadata.insert(key.clone(), value.clone());
                }
                info!("Indexing {} as {}", path.display(), document.id);

                match components.index.index(&document, &cancel).await {
                    Ok(report) => match cli.format {
                        OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
                        OutputFormat::Text => println!(
                            "Indexed {} ({} chunks, {} stale removed)",
                            report.document_id, report.chunk_count, report.stale_removed
                        ),
                    },
                    Err(e) => {
                        failed += 1;
                        print_error(&e, cli.format)?;
                    }
                }
                if cancel.is_cancelled() {
                    break;
                }
            }
            if failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Search {
            query,
            top_k,
            filters,
            min_score,
        } => {
            let components = create_components(&config).await?;

            let mut request = components.search.request(query.clone());
            if let Some(top_k) = top_k {
                request.top_k = top_k;
            }
            if !filters.is_empty() {
                let filter = filters
                    .into_iter()
                    .fold(MetadataFilter::new(), |f, (k, v)| f.eq(k, v));
                request = request.with_filter(filter);
            }
            if let Some(min_score) = min_score {
                request = request.with_min_score(min_score);
            }

            let results = match components.search.search(&request, &cancel).await {
                Ok(results) => results,
                Err(e) => {
                    print_error(&e, cli.format)?;
                    return Ok(ExitCode::FAILURE);
                }
            };

            // Output results
            match cli.format {
                OutputFormat::Json => {
                    let output = SearchOutput {
                        query: &query,
                        results: &results,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Query: {query}\n");
                    if results.is_empty() {
                        println!("No results found.");
                    } else {
                        for (i, result) in results.iter().enumerate() {
                            println!(
                                "{}. {} #{} (score: {:.3})",
                                i + 1,
                                result.document_id,
                                result.sequence_index,
                                result.score
                            );
                            println!("   {}", truncate(&result.content, 100));
                            println!();
                        }
                    }
                }
            }
        }

        Commands::Delete { document_id } => {
            let components = create_components(&config).await?;
            match components.index.delete_document(&document_id, &cancel).await {
                Ok(deleted) => match cli.format {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({ "document_id": document_id, "deleted": deleted })
                    ),
                    OutputFormat::Text => println!("Deleted {deleted} records of {document_id}"),
                },
                Err(e) => {
                    print_error(&e, cli.format)?;
                    return Ok(ExitCode::FAILURE);
                }
            }
        }

        Commands::Status => {
            let components = create_components(&config).await?;
            let stats = components
                .store
                .stats(&components.collection)
                .await
                .context("Failed to read collection stats")?;

            match cli.format {
                OutputFormat::Json => {
                    let output = StatusOutput {
                        backend: components.store.backend().to_string(),
                        collection: stats.collection,
                        total_documents: stats.total_documents,
                        total_records: stats.total_records,
                        dimension: stats.dimension,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Collection {} ({})", stats.collection, components.store.backend());
                    match stats.dimension {
                        Some(dimension) => {
                            println!("  Documents: {}", stats.total_documents);
                            println!("  Records:   {}", stats.total_records);
                            println!("  Dimension: {dimension}");
                        }
                        None => println!("  Not created yet. Run 'semdex index <FILE>' first."),
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                match cli.config.or_else(Config::config_path) {
                    Some(path) => println!("{}", path.display()),
                    None => println!("Could not determine config directory"),
                }
                if let Some(dir) = data_dir() {
                    println!("Data: {}", dir.display());
                }
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// Print a pipeline failure in the requested format.
fn print_error(err: &PipelineError, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => eprintln!("{}", serde_json::to_string(err)?),
        OutputFormat::Text => eprintln!("Error: {err}"),
    }
    Ok(())
}

/// Read a file into a document, resolving its declared format.
fn read_document(path: &Path, id: Option<String>, declared: Option<&str>) -> Result<Document> {
    let format = match declared {
        Some(name) => DocumentFormat::from_str(name)
            .map_err(|e| anyhow::anyhow!("Invalid --doc-format {name}: {e}"))?,
        None => guess_format(path),
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content = match format {
        DocumentFormat::Pdf => DocumentContent::from(bytes),
        _ => match String::from_utf8(bytes) {
            Ok(text) => DocumentContent::from(text),
            Err(e) => DocumentContent::from(e.into_bytes()),
        },
    };
    let id = id.unwrap_or_else(|| path.to_string_lossy().to_string());
    Ok(Document::new(id, format, content))
}

/// Declared format from the file extension.
fn guess_format(path: &Path) -> DocumentFormat {
    let mime = mime_guess::from_path(path).first_or_text_plain();
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        (_, "json") => DocumentFormat::Json,
        (_, "html" | "xhtml+xml") => DocumentFormat::Html,
        (_, "pdf") => DocumentFormat::Pdf,
        ("text", _) => DocumentFormat::Text,
        _ => DocumentFormat::Custom(
            path.extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_else(|| mime.essence_str().to_string()),
        ),
    }
}

/// Parse `key=value`, typing integers and booleans.
fn parse_key_value(raw: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {raw}"));
    }
    let value = if let Ok(n) = value.parse::<i64>() {
        MetadataValue::Integer(n)
    } else if let Ok(b) = value.parse::<bool>() {
        MetadataValue::Bool(b)
    } else {
        MetadataValue::String(value.to_string())
    };
    Ok((key.to_string(), value))
}

/// Truncate a string to max length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_len {
        s
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
