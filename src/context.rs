//! Grounding-context assembly.
//!
//! Formats retrieved chunks into a single reference block for a downstream
//! generation prompt. Pure and deterministic: groups by category in a fixed
//! canonical order, keeps the similarity ranking inside each group, and
//! cites every passage's source document and page range.

use crate::models::{ChunkCategory, RetrievedChunk};

const CLOSING_INSTRUCTIONS: &str = "Base your analysis on the reference material above. \
Cite the source document when you draw on a specific passage, and prefer \
guidance from the reference material over general knowledge when they disagree.";

fn heading(category: ChunkCategory) -> &'static str {
    match category {
        ChunkCategory::Theory => "Theory",
        ChunkCategory::Exercise => "Worked exercises",
        ChunkCategory::TrainingPlan => "Training plan examples",
        ChunkCategory::General => "Other reference material",
    }
}

fn citation(chunk: &RetrievedChunk) -> String {
    let (start, end) = (chunk.chunk.page_start, chunk.chunk.page_end);
    if start == end {
        format!("(Source: {}, p. {})", chunk.document_title, start)
    } else {
        format!("(Source: {}, p. {}-{})", chunk.document_title, start, end)
    }
}

/// Assemble the grounding text for a set of retrieved chunks.
///
/// Returns the empty string when `chunks` is empty, so callers can cheaply
/// detect "no grounding available".
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut out = String::new();

    for category in ChunkCategory::CANONICAL_ORDER {
        let group: Vec<&RetrievedChunk> = chunks
            .iter()
            .filter(|c| c.chunk.category == category)
            .collect();
        if group.is_empty() {
            continue;
        }

        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("## ");
        out.push_str(heading(category));
        out.push('\n');

        for chunk in group {
            out.push('\n');
            out.push_str(chunk.chunk.content.trim());
            out.push('\n');
            out.push_str(&citation(chunk));
            out.push('\n');
        }
    }

    out.push('\n');
    out.push_str(CLOSING_INSTRUCTIONS);
    out.push('\n');
    out
}
