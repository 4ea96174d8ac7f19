//! Core data models used throughout the knowledge pipeline.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through ingestion and retrieval.

use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a knowledge-base document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DocumentStatus::Pending),
            "PROCESSING" => Ok(DocumentStatus::Processing),
            "COMPLETED" => Ok(DocumentStatus::Completed),
            "FAILED" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// Coarse classification of a chunk's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkCategory {
    Theory,
    Exercise,
    TrainingPlan,
    General,
}

impl ChunkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkCategory::Theory => "THEORY",
            ChunkCategory::Exercise => "EXERCISE",
            ChunkCategory::TrainingPlan => "TRAINING_PLAN",
            ChunkCategory::General => "GENERAL",
        }
    }

    /// Canonical ordering used when assembling grounding context.
    pub const CANONICAL_ORDER: [ChunkCategory; 4] = [
        ChunkCategory::Theory,
        ChunkCategory::Exercise,
        ChunkCategory::TrainingPlan,
        ChunkCategory::General,
    ];
}

impl fmt::Display for ChunkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "THEORY" => Ok(ChunkCategory::Theory),
            "EXERCISE" => Ok(ChunkCategory::Exercise),
            "TRAINING_PLAN" => Ok(ChunkCategory::TrainingPlan),
            "GENERAL" => Ok(ChunkCategory::General),
            other => Err(format!("unknown chunk category: {other}")),
        }
    }
}

/// A source file accepted into the knowledge base.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Local path or remote URL of the raw file.
    pub file_path: String,
    /// None means the document applies to all sports.
    pub sport_slug: Option<String>,
    pub status: DocumentStatus,
    pub page_count: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One page of extracted text. Page numbers are 1-based.
#[derive(Debug, Clone)]
pub struct PageText {
    pub page_number: i64,
    pub text: String,
}

/// Result of text extraction over a whole document.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Non-empty pages in document order.
    pub pages: Vec<PageText>,
    /// Total pages in the source, including empty ones.
    pub page_count: i64,
    pub full_text: String,
}

/// Chunk blueprint produced by the chunker, before persistence.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub content: String,
    pub chunk_index: i64,
    pub page_start: i64,
    pub page_end: i64,
    pub category: ChunkCategory,
    pub technique: Option<String>,
    pub token_count: i64,
}

/// A retrievable passage stored for one document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub page_start: i64,
    pub page_end: i64,
    pub sport_slug: Option<String>,
    pub category: ChunkCategory,
    pub technique: Option<String>,
    pub token_count: i64,
    pub embedding: Option<Vec<f32>>,
}

/// A chunk plus its similarity score, produced only at query time.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Cosine similarity in [0, 1]; 1 = identical direction.
    pub similarity: f32,
    pub document_title: String,
}
