//! PDF text extraction.
//!
//! Turns raw PDF bytes into an ordered list of per-page plain text. Empty
//! pages are dropped from the page list but still counted in the total, so
//! page numbers in citations match the source document.

use crate::error::{PipelineError, Result};
use crate::models::{Extraction, PageText};

/// Extract per-page text from raw PDF bytes.
///
/// Fails with [`PipelineError::Extraction`] when the bytes have no parseable
/// text layer. A document whose pages are all empty still extracts
/// successfully; the processor rejects it at the chunking step.
pub fn extract_pages(bytes: &[u8]) -> Result<Extraction> {
    let raw_pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| PipelineError::Extraction(e.to_string()))?;
    Ok(assemble(raw_pages))
}

/// Build the [`Extraction`] from raw per-page strings, dropping empty pages
/// while preserving 1-based source page numbers.
fn assemble(raw_pages: Vec<String>) -> Extraction {
    let page_count = raw_pages.len() as i64;
    let mut pages = Vec::new();
    let mut full_text = String::new();

    for (i, raw) in raw_pages.into_iter().enumerate() {
        let text = raw.trim();
        if text.is_empty() {
            continue;
        }
        if !full_text.is_empty() {
            full_text.push_str("\n\n");
        }
        full_text.push_str(text);
        pages.push(PageText {
            page_number: (i + 1) as i64,
            text: text.to_string(),
        });
    }

    Extraction {
        pages,
        page_count,
        full_text,
    }
}
