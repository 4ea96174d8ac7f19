//! Filtered similarity retrieval.
//!
//! Embeds a free-text query and ranks stored chunks by cosine similarity,
//! applying the active filters as fully bound SQL predicates. Retrieval is
//! an enhancement, not a hard dependency, for its consumers: every failure
//! (embedding service down, store unreachable) degrades to an empty result
//! set and a warning log instead of an error.

use sqlx::{QueryBuilder, Row, SqlitePool};
use tracing::{debug, warn};

use crate::embedding::{blob_to_vec, cosine_similarity, Embedder};
use crate::error::Result;
use crate::models::{Chunk, ChunkCategory, RetrievedChunk};

/// Filters and bounds for one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Match chunks tagged with this sport or with no sport tag at all.
    pub sport: Option<String>,
    /// Strict membership filter; `None` matches every category.
    pub categories: Option<Vec<ChunkCategory>>,
    /// Match chunks tagged with this technique or with no technique tag.
    pub technique: Option<String>,
    pub limit: usize,
    /// Results at or below this similarity are discarded.
    pub min_similarity: f32,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            sport: None,
            categories: None,
            technique: None,
            limit: 5,
            min_similarity: 0.3,
        }
    }
}

/// Retrieve the chunks most similar to `query`, best first.
///
/// Never fails: embedding or store errors are logged and resolved to an
/// empty list so the consuming generation step can proceed ungrounded.
pub async fn retrieve(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    query: &str,
    options: &RetrieveOptions,
) -> Vec<RetrievedChunk> {
    let query_vec = match embedder.embed(query).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "query embedding failed, returning no grounding");
            return Vec::new();
        }
    };

    match rank_candidates(pool, &query_vec, options).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "similarity search failed, returning no grounding");
            Vec::new()
        }
    }
}

async fn rank_candidates(
    pool: &SqlitePool,
    query_vec: &[f32],
    options: &RetrieveOptions,
) -> Result<Vec<RetrievedChunk>> {
    let mut qb = QueryBuilder::new(
        "SELECT c.id, c.document_id, c.chunk_index, c.content, c.page_start, c.page_end, \
         c.sport_slug, c.category, c.technique, c.token_count, c.embedding, \
         d.title AS document_title \
         FROM chunks c JOIN documents d ON d.id = c.document_id \
         WHERE c.embedding IS NOT NULL",
    );

    // Sport and technique filters follow the exact-or-unset rule: untagged
    // chunks are global and match any requested value. Category is strict.
    if let Some(sport) = &options.sport {
        qb.push(" AND (c.sport_slug IS NULL OR c.sport_slug = ");
        qb.push_bind(sport);
        qb.push(")");
    }

    if let Some(technique) = &options.technique {
        qb.push(" AND (c.technique IS NULL OR c.technique = ");
        qb.push_bind(technique);
        qb.push(")");
    }

    if let Some(categories) = options.categories.as_deref().filter(|c| !c.is_empty()) {
        qb.push(" AND c.category IN (");
        let mut separated = qb.separated(", ");
        for category in categories {
            separated.push_bind(category.as_str());
        }
        qb.push(")");
    }

    qb.push(" ORDER BY c.document_id, c.chunk_index");

    let rows = qb.build().fetch_all(pool).await?;

    let mut results: Vec<RetrievedChunk> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let similarity = cosine_similarity(query_vec, &vector).clamp(0.0, 1.0);
            let category: String = row.get("category");
            RetrievedChunk {
                chunk: Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    page_start: row.get("page_start"),
                    page_end: row.get("page_end"),
                    sport_slug: row.get("sport_slug"),
                    category: category.parse().unwrap_or(ChunkCategory::General),
                    technique: row.get("technique"),
                    token_count: row.get("token_count"),
                    embedding: Some(vector),
                },
                similarity,
                document_title: row.get("document_title"),
            }
        })
        .filter(|r| r.similarity > options.min_similarity)
        .collect();

    // Stable sort: equal scores keep scan order, no secondary key.
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(options.limit);

    debug!(results = results.len(), "retrieval complete");
    Ok(results)
}
