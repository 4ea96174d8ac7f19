//! Error types for the knowledge pipeline.
//!
//! Ingestion errors are terminal and recorded on the document row;
//! [`PipelineError::QuotaExhausted`] is the one transient variant, kept
//! distinguishable so callers can present "try again later" instead of a
//! hard failure. Retrieval never surfaces these; see `retriever`.

use thiserror::Error;

/// Maximum length of an error message persisted on a document row.
pub const MAX_ERROR_LEN: usize = 300;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while ingesting or retrieving knowledge.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The document id passed to the processor does not exist.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// Fetching the raw document bytes failed (filesystem or HTTP).
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The document has no parseable text layer.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Extraction succeeded but yielded no usable text to chunk.
    #[error("document contains no usable text")]
    EmptyDocument,

    /// The embedding API rate limit persisted through all retries.
    #[error("embedding quota exhausted (rate limit): {0}")]
    QuotaExhausted(String),

    /// Non-retryable embedding failure (auth, malformed request, 5xx).
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    /// True for failures worth retrying later without any code change.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::QuotaExhausted(_))
    }
}

/// Truncate an error message to the bound persisted on document rows.
pub fn truncate_message(msg: &str) -> String {
    if msg.len() <= MAX_ERROR_LEN {
        return msg.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    msg[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_pass_through() {
        assert_eq!(truncate_message("boom"), "boom");
    }

    #[test]
    fn long_messages_are_bounded() {
        let long = "x".repeat(1000);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.len(), MAX_ERROR_LEN);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 'é' is two bytes; a naive slice at 300 could split it.
        let long = "é".repeat(400);
        let truncated = truncate_message(&long);
        assert!(truncated.len() <= MAX_ERROR_LEN);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn quota_exhausted_is_transient() {
        assert!(PipelineError::QuotaExhausted("429".into()).is_transient());
        assert!(!PipelineError::EmptyDocument.is_transient());
        assert!(!PipelineError::Extraction("bad pdf".into()).is_transient());
    }

    #[test]
    fn quota_message_mentions_rate() {
        let msg = PipelineError::QuotaExhausted("3 retries".into()).to_string();
        assert!(msg.contains("quota") || msg.contains("rate"));
    }
}
