//! # Coaching KB CLI (`ckb`)
//!
//! The `ckb` binary manages the coaching knowledge base: database
//! initialization, document registration and processing, and retrieval
//! checks against the stored passages.
//!
//! ## Usage
//!
//! ```bash
//! ckb --config ./config/ckb.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ckb init` | Create the SQLite database and run schema migrations |
//! | `ckb add <file>` | Register a document (local path or URL) as PENDING |
//! | `ckb process <id>` | Run the ingestion pipeline for one document |
//! | `ckb retrieve "<query>"` | Rank stored passages against a query |
//! | `ckb status [<id>]` | Show document lifecycle state |

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::{Row, SqlitePool};
use tracing_subscriber::EnvFilter;

use coaching_kb::config::{load_config, Config};
use coaching_kb::context::build_context;
use coaching_kb::db;
use coaching_kb::embedding::HttpEmbedder;
use coaching_kb::migrate;
use coaching_kb::models::ChunkCategory;
use coaching_kb::processor;
use coaching_kb::retriever::{retrieve, RetrieveOptions};

/// Coaching KB: knowledge-base pipeline grounding AI technique analysis
/// in coaching documents.
#[derive(Parser)]
#[command(
    name = "ckb",
    about = "Coaching knowledge base: ingest coaching PDFs and retrieve grounding passages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ckb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Register a document (local path or URL) in PENDING state.
    Add {
        /// Local file path or http(s) URL of the PDF.
        file: String,

        /// Human-readable source name used in citations. Defaults to the
        /// file name.
        #[arg(long)]
        title: Option<String>,

        /// Sport this document applies to. Omit for all sports.
        #[arg(long)]
        sport: Option<String>,
    },

    /// Run the ingestion pipeline for one document.
    Process {
        /// Document id as printed by `add` or `status`.
        id: String,

        /// Start even if the document is already marked PROCESSING
        /// (recovers runs orphaned by a crash).
        #[arg(long)]
        force: bool,
    },

    /// Rank stored passages against a query and print the grounding block.
    Retrieve {
        query: String,

        /// Only match chunks tagged with this sport (or untagged).
        #[arg(long)]
        sport: Option<String>,

        /// Restrict to these categories (THEORY, EXERCISE, TRAINING_PLAN,
        /// GENERAL). Repeatable.
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Only match chunks tagged with this technique (or untagged).
        #[arg(long)]
        technique: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity; results at or below it are discarded.
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Show document lifecycle state, page and chunk counts.
    Status {
        /// Document id; omit to list every document.
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Add { file, title, sport } => run_add(&config, &file, title, sport).await,
        Commands::Process { id, force } => run_process(&config, &id, force).await,
        Commands::Retrieve {
            query,
            sport,
            categories,
            technique,
            limit,
            threshold,
        } => run_retrieve(&config, &query, sport, categories, technique, limit, threshold).await,
        Commands::Status { id } => run_status(&config, id).await,
    }
}

async fn connect(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(&config.db.path).await?;
    Ok(pool)
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = connect(config).await?;
    migrate::run_migrations(&pool).await?;
    println!("initialized {}", config.db.path.display());
    pool.close().await;
    Ok(())
}

async fn run_add(
    config: &Config,
    file: &str,
    title: Option<String>,
    sport: Option<String>,
) -> Result<()> {
    let pool = connect(config).await?;

    let title = title.unwrap_or_else(|| {
        file.rsplit(['/', '\\'])
            .next()
            .unwrap_or(file)
            .to_string()
    });

    let doc = processor::register_document(&pool, &title, file, sport.as_deref()).await?;
    println!("added document");
    println!("  id: {}", doc.id);
    println!("  title: {}", doc.title);
    println!("  status: {}", doc.status);
    pool.close().await;
    Ok(())
}

async fn run_process(config: &Config, id: &str, force: bool) -> Result<()> {
    let pool = connect(config).await?;
    let embedder = HttpEmbedder::new(config.embedding.clone())?;

    let outcome =
        processor::process_document(&pool, &embedder, &config.chunking, id, force).await;

    // The terminal status is already persisted; report it either way.
    if let Some(doc) = processor::load_document(&pool, id).await? {
        println!("document {}", doc.id);
        println!("  status: {}", doc.status);
        if let Some(pages) = doc.page_count {
            println!("  pages: {pages}");
        }
        if let Some(error) = &doc.error_message {
            println!("  error: {error}");
        }
    }
    pool.close().await;

    outcome.map_err(Into::into)
}

#[allow(clippy::too_many_arguments)]
async fn run_retrieve(
    config: &Config,
    query: &str,
    sport: Option<String>,
    categories: Vec<String>,
    technique: Option<String>,
    limit: Option<usize>,
    threshold: Option<f32>,
) -> Result<()> {
    let pool = connect(config).await?;
    let embedder = HttpEmbedder::new(config.embedding.clone())?;

    let categories = if categories.is_empty() {
        None
    } else {
        Some(
            categories
                .iter()
                .map(|c| {
                    ChunkCategory::from_str(c).map_err(|e| anyhow::anyhow!(e))
                })
                .collect::<Result<Vec<_>>>()
                .context("invalid --category value")?,
        )
    };

    let options = RetrieveOptions {
        sport,
        categories,
        technique,
        limit: limit.unwrap_or(config.retrieval.limit),
        min_similarity: threshold.unwrap_or(config.retrieval.min_similarity),
    };

    let results = retrieve(&pool, &embedder, query, &options).await;

    if results.is_empty() {
        println!("No grounding available.");
        pool.close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({}, p. {}-{})",
            i + 1,
            result.similarity,
            result.document_title,
            result.chunk.category,
            result.chunk.page_start,
            result.chunk.page_end
        );
        let excerpt: String = result.chunk.content.chars().take(160).collect();
        println!("    {}", excerpt.replace('\n', " "));
    }

    println!();
    println!("{}", build_context(&results));
    pool.close().await;
    Ok(())
}

async fn run_status(config: &Config, id: Option<String>) -> Result<()> {
    let pool = connect(config).await?;

    let mut query = String::from(
        "SELECT d.id, d.title, d.status, d.sport_slug, d.page_count, d.error_message, \
         (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count \
         FROM documents d",
    );
    if id.is_some() {
        query.push_str(" WHERE d.id = ?");
    }
    query.push_str(" ORDER BY d.created_at");

    let mut q = sqlx::query(&query);
    if let Some(id) = &id {
        q = q.bind(id);
    }
    let rows = q.fetch_all(&pool).await?;

    if rows.is_empty() {
        println!("No documents.");
        pool.close().await;
        return Ok(());
    }

    for row in &rows {
        let title: String = row.get("title");
        let status: String = row.get("status");
        let sport: Option<String> = row.get("sport_slug");
        let page_count: Option<i64> = row.get("page_count");
        let chunk_count: i64 = row.get("chunk_count");
        let error: Option<String> = row.get("error_message");
        let doc_id: String = row.get("id");

        println!("{doc_id}");
        println!("  title: {title}");
        println!("  status: {status}");
        println!("  sport: {}", sport.as_deref().unwrap_or("(all)"));
        if let Some(pages) = page_count {
            println!("  pages: {pages}");
        }
        println!("  chunks: {chunk_count}");
        if let Some(error) = error {
            println!("  error: {error}");
        }
        println!();
    }

    pool.close().await;
    Ok(())
}
