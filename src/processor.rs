//! Document processing pipeline.
//!
//! Orchestrates extraction, chunking, embedding, and storage for one
//! document, and owns the document's lifecycle status:
//!
//! ```text
//! PENDING -> PROCESSING -> COMPLETED
//!                       -> FAILED (bounded error message, chunks wiped)
//! ```
//!
//! Processing is idempotent: prior chunks are deleted before the new batch
//! is inserted, so re-running the pipeline replaces a document's passages
//! instead of duplicating them. A run aborted mid-flight leaves the
//! document in PROCESSING for an external reconciler to re-invoke.

use std::time::Duration;

use sqlx::{QueryBuilder, Row, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker;
use crate::config::ChunkingConfig;
use crate::embedding::{vec_to_blob, Embedder};
use crate::error::{truncate_message, PipelineError, Result};
use crate::extract;
use crate::models::{ChunkDraft, Document, DocumentStatus};

/// Chunk rows written per INSERT statement.
const INSERT_BATCH: usize = 50;

/// Timeout for fetching remote document bytes.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Register a new document in PENDING state.
pub async fn register_document(
    pool: &SqlitePool,
    title: &str,
    file_path: &str,
    sport_slug: Option<&str>,
) -> Result<Document> {
    let now = chrono::Utc::now().timestamp();
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO documents (id, title, file_path, sport_slug, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'PENDING', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(file_path)
    .bind(sport_slug)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let doc = load_document(pool, &id)
        .await?
        .ok_or_else(|| PipelineError::DocumentNotFound(id.clone()))?;
    Ok(doc)
}

/// Load one document row, if present.
pub async fn load_document(pool: &SqlitePool, document_id: &str) -> Result<Option<Document>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, file_path, sport_slug, status, page_count, error_message,
               created_at, updated_at
        FROM documents WHERE id = ?
        "#,
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let status: String = row.get("status");
        let status = status
            .parse::<DocumentStatus>()
            .map_err(PipelineError::InvalidInput)?;
        Ok(Document {
            id: row.get("id"),
            title: row.get("title"),
            file_path: row.get("file_path"),
            sport_slug: row.get("sport_slug"),
            status,
            page_count: row.get("page_count"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    })
    .transpose()
}

/// Run the full ingestion pipeline for one document.
///
/// Idempotent and safe to re-invoke. Refuses to start while the document is
/// already PROCESSING unless `force` is set (the escape hatch for runs
/// orphaned by a crash). Every failure past the status guard marks the
/// document FAILED with a bounded message and wipes its chunks, so
/// consumers never see stale partial state.
pub async fn process_document(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    chunking: &ChunkingConfig,
    document_id: &str,
    force: bool,
) -> Result<()> {
    let doc = load_document(pool, document_id)
        .await?
        .ok_or_else(|| PipelineError::DocumentNotFound(document_id.to_string()))?;

    if doc.status == DocumentStatus::Processing && !force {
        return Err(PipelineError::InvalidInput(format!(
            "document {document_id} is already being processed"
        )));
    }

    set_status(pool, document_id, DocumentStatus::Processing, None).await?;
    info!(document_id, title = %doc.title, "processing document");

    match run_pipeline(pool, embedder, chunking, &doc).await {
        Ok(chunk_count) => {
            set_status(pool, document_id, DocumentStatus::Completed, None).await?;
            info!(document_id, chunk_count, "document processed");
            Ok(())
        }
        Err(e) => {
            let message = truncate_message(&e.to_string());
            if let Err(cleanup) = delete_chunks(pool, document_id).await {
                warn!(document_id, error = %cleanup, "failed to clear chunks after error");
            }
            if let Err(status_err) =
                set_status(pool, document_id, DocumentStatus::Failed, Some(&message)).await
            {
                warn!(document_id, error = %status_err, "failed to record FAILED status");
            }
            warn!(document_id, error = %message, "document processing failed");
            Err(e)
        }
    }
}

async fn run_pipeline(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    chunking: &ChunkingConfig,
    doc: &Document,
) -> Result<usize> {
    let bytes = fetch_bytes(&doc.file_path).await?;

    let extraction = extract::extract_pages(&bytes)?;
    set_page_count(pool, &doc.id, extraction.page_count).await?;

    let drafts = chunker::chunk_pages(&extraction.pages, chunking);
    if drafts.is_empty() {
        return Err(PipelineError::EmptyDocument);
    }

    let texts: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    let dims = embedder.dims();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(PipelineError::Embedding(format!(
            "expected {dims}-dimension vectors, got {}",
            bad.len()
        )));
    }

    replace_chunks(pool, doc, &drafts, &vectors).await?;
    Ok(drafts.len())
}

/// Fetch the raw document bytes from a local path or a remote URL.
async fn fetch_bytes(file_path: &str) -> Result<Vec<u8>> {
    if file_path.starts_with("http://") || file_path.starts_with("https://") {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        let response = client
            .get(file_path)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::Fetch(format!(
                "{} returned {}",
                file_path,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    } else {
        std::fs::read(file_path).map_err(|e| PipelineError::Fetch(format!("{file_path}: {e}")))
    }
}

/// Delete prior chunks and insert the new batch, in one transaction.
async fn replace_chunks(
    pool: &SqlitePool,
    doc: &Document,
    drafts: &[ChunkDraft],
    vectors: &[Vec<f32>],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(&doc.id)
        .execute(&mut *tx)
        .await?;

    let mut start = 0;
    while start < drafts.len() {
        let end = (start + INSERT_BATCH).min(drafts.len());
        let mut qb = QueryBuilder::new(
            "INSERT INTO chunks (id, document_id, chunk_index, content, page_start, page_end, \
             sport_slug, category, technique, token_count, embedding) ",
        );
        let batch = drafts[start..end].iter().zip(&vectors[start..end]);
        qb.push_values(batch, |mut row, (draft, vector)| {
            row.push_bind(Uuid::new_v4().to_string())
                .push_bind(&doc.id)
                .push_bind(draft.chunk_index)
                .push_bind(&draft.content)
                .push_bind(draft.page_start)
                .push_bind(draft.page_end)
                .push_bind(&doc.sport_slug)
                .push_bind(draft.category.as_str())
                .push_bind(&draft.technique)
                .push_bind(draft.token_count)
                .push_bind(vec_to_blob(vector));
        });
        qb.build().execute(&mut *tx).await?;
        start = end;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete all chunks owned by a document.
pub async fn delete_chunks(pool: &SqlitePool, document_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

async fn set_status(
    pool: &SqlitePool,
    document_id: &str,
    status: DocumentStatus,
    error_message: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query("UPDATE documents SET status = ?, error_message = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error_message)
        .bind(now)
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn set_page_count(pool: &SqlitePool, document_id: &str, page_count: i64) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query("UPDATE documents SET page_count = ?, updated_at = ? WHERE id = ?")
        .bind(page_count)
        .bind(now)
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}
