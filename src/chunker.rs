//! Page-aware chunker.
//!
//! Splits per-page text into passages bounded by a token window, preferring
//! paragraph boundaries over mid-sentence splits. Each passage keeps the
//! inclusive page range it was drawn from and gets a best-effort
//! category/technique classification.

use crate::config::ChunkingConfig;
use crate::models::{ChunkCategory, ChunkDraft, PageText};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Technique tags with the keywords (English and Spanish) that imply them.
/// First match wins; no match leaves the technique unset, which retrieval
/// treats as "matches any technique filter".
const TECHNIQUE_KEYWORDS: &[(&str, &[&str])] = &[
    ("serve", &["serve", "saque", "servicio"]),
    ("forehand", &["forehand", "derecha", "drive"]),
    ("backhand", &["backhand", "revés", "reves"]),
    ("volley", &["volley", "volea"]),
    ("smash", &["smash", "remate"]),
    ("bandeja", &["bandeja", "víbora", "vibora"]),
    ("lob", &["lob", "globo"]),
    ("slice", &["slice", "cortado"]),
    ("footwork", &["footwork", "juego de pies", "split step"]),
];

const TRAINING_PLAN_KEYWORDS: &[&str] = &[
    "training plan",
    "plan de entrenamiento",
    "weekly plan",
    "plan semanal",
    "session plan",
    "microcycle",
    "microciclo",
    "mesociclo",
];

const EXERCISE_KEYWORDS: &[&str] = &[
    "exercise",
    "ejercicio",
    "drill",
    "repetitions",
    "repeticiones",
    "sets of",
    "series de",
];

const THEORY_KEYWORDS: &[&str] = &[
    "technique",
    "técnica",
    "tecnica",
    "biomechanics",
    "biomecánica",
    "biomecanica",
    "fundamentals",
    "fundamentos",
    "tactics",
    "táctica",
    "tactica",
    "grip",
    "empuñadura",
    "stance",
];

/// Best-effort keyword classification of a passage.
///
/// Heuristic quality may evolve independently of the pipeline; the only
/// structural guarantee is that an unset technique matches any filter.
pub fn classify(text: &str) -> (ChunkCategory, Option<String>) {
    let lower = text.to_lowercase();

    let category = if contains_any(&lower, TRAINING_PLAN_KEYWORDS) {
        ChunkCategory::TrainingPlan
    } else if contains_any(&lower, EXERCISE_KEYWORDS) {
        ChunkCategory::Exercise
    } else if contains_any(&lower, THEORY_KEYWORDS) {
        ChunkCategory::Theory
    } else {
        ChunkCategory::General
    };

    let technique = TECHNIQUE_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(&lower, keywords))
        .map(|(slug, _)| slug.to_string());

    (category, technique)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Approximate token count of a passage.
pub fn estimate_tokens(text: &str) -> i64 {
    (text.chars().count().div_ceil(CHARS_PER_TOKEN)) as i64
}

/// Split non-empty pages into classified chunk drafts.
///
/// Paragraphs accumulate toward `max_tokens` and a chunk is flushed before
/// it would exceed the window; a trailing fragment below `min_tokens` folds
/// into the previous chunk when it fits. Paragraphs larger than the window
/// are hard-split at sentence or word boundaries. Indices are contiguous
/// from 0 and `page_start <= page_end` always holds.
pub fn chunk_pages(pages: &[PageText], config: &ChunkingConfig) -> Vec<ChunkDraft> {
    let max_chars = config.max_tokens * CHARS_PER_TOKEN;
    let min_chars = config.min_tokens * CHARS_PER_TOKEN;

    let mut builder = ChunkBuilder::new(max_chars, min_chars);

    for page in pages {
        for para in page.text.split("\n\n") {
            let trimmed = para.trim();
            if trimmed.is_empty() {
                continue;
            }
            builder.push_paragraph(trimmed, page.page_number);
        }
    }

    builder.finish()
}

struct ChunkBuilder {
    max_chars: usize,
    min_chars: usize,
    chunks: Vec<ChunkDraft>,
    buffer: String,
    page_start: i64,
    page_end: i64,
}

impl ChunkBuilder {
    fn new(max_chars: usize, min_chars: usize) -> Self {
        Self {
            max_chars,
            min_chars,
            chunks: Vec::new(),
            buffer: String::new(),
            page_start: 0,
            page_end: 0,
        }
    }

    fn push_paragraph(&mut self, para: &str, page: i64) {
        // Oversized paragraphs bypass the buffer and get hard-split.
        if para.len() > self.max_chars {
            self.flush();
            for piece in split_oversized(para, self.max_chars) {
                self.emit(piece.to_string(), page, page);
            }
            return;
        }

        let projected = if self.buffer.is_empty() {
            para.len()
        } else {
            self.buffer.len() + 2 + para.len()
        };

        if projected > self.max_chars {
            self.flush();
        }

        if self.buffer.is_empty() {
            self.page_start = page;
        }
        if !self.buffer.is_empty() {
            self.buffer.push_str("\n\n");
        }
        self.buffer.push_str(para);
        self.page_end = page;
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.buffer);
        let (start, end) = (self.page_start, self.page_end);
        self.emit(content, start, end);
    }

    fn emit(&mut self, content: String, page_start: i64, page_end: i64) {
        let (category, technique) = classify(&content);
        let token_count = estimate_tokens(&content);
        let chunk_index = self.chunks.len() as i64;
        self.chunks.push(ChunkDraft {
            content,
            chunk_index,
            page_start,
            page_end,
            category,
            technique,
            token_count,
        });
    }

    fn finish(mut self) -> Vec<ChunkDraft> {
        // A trailing fragment below the minimum folds into the previous
        // chunk when the window allows, instead of standing alone.
        if !self.buffer.is_empty() && self.buffer.len() < self.min_chars {
            if let Some(last) = self.chunks.last_mut() {
                if last.content.len() + 2 + self.buffer.len() <= self.max_chars {
                    last.content.push_str("\n\n");
                    last.content.push_str(&self.buffer);
                    last.page_end = self.page_end;
                    let (category, technique) = classify(&last.content);
                    last.category = category;
                    last.technique = technique;
                    last.token_count = estimate_tokens(&last.content);
                    self.buffer.clear();
                }
            }
        }
        self.flush();
        self.chunks
    }
}

/// Hard-split a paragraph that exceeds the window, preferring sentence
/// breaks, then line breaks, then word boundaries.
fn split_oversized(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            let piece = remaining.trim();
            if !piece.is_empty() {
                pieces.push(piece);
            }
            break;
        }

        let window = floor_char_boundary(remaining, max_chars);
        let head = &remaining[..window];
        let mut cut = head
            .rfind(". ")
            .map(|pos| pos + 2)
            .or_else(|| head.rfind('\n').map(|pos| pos + 1))
            .or_else(|| head.rfind(' ').map(|pos| pos + 1))
            .unwrap_or(window);
        if cut == 0 {
            // Window smaller than the first char; take that char whole.
            cut = remaining
                .chars()
                .next()
                .map(|c| c.len_utf8())
                .unwrap_or(remaining.len());
        }

        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = &remaining[cut..];
    }

    pieces
}

/// Largest byte index `<= at` that lies on a char boundary.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut at = at.min(s.len());
    while !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: i64, text: &str) -> PageText {
        PageText {
            page_number: n,
            text: text.to_string(),
        }
    }

    fn config(min_tokens: usize, max_tokens: usize) -> ChunkingConfig {
        ChunkingConfig {
            min_tokens,
            max_tokens,
        }
    }

    #[test]
    fn no_pages_yield_no_chunks() {
        assert!(chunk_pages(&[], &config(80, 450)).is_empty());
    }

    #[test]
    fn small_document_is_a_single_chunk() {
        let pages = [page(1, "Short passage about grip pressure.")];
        let chunks = chunk_pages(&pages, &config(10, 450));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].page_start, 1);
        assert_eq!(chunks[0].page_end, 1);
    }

    #[test]
    fn indices_are_contiguous_and_pages_ordered() {
        let text: String = (0..40)
            .map(|i| format!("Paragraph number {i} with some words in it."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let pages = [page(1, &text), page(2, &text), page(3, &text)];
        let chunks = chunk_pages(&pages, &config(20, 60));

        assert!(chunks.len() > 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert!(chunk.page_start <= chunk.page_end);
        }
        // Page ranges never move backwards.
        for pair in chunks.windows(2) {
            assert!(pair[0].page_start <= pair[1].page_start);
        }
    }

    #[test]
    fn chunks_can_span_consecutive_pages() {
        let pages = [page(1, "End of one page."), page(2, "Start of the next.")];
        let chunks = chunk_pages(&pages, &config(10, 450));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_start, 1);
        assert_eq!(chunks[0].page_end, 2);
        assert!(chunks[0].content.contains("End of one page."));
        assert!(chunks[0].content.contains("Start of the next."));
    }

    #[test]
    fn window_upper_bound_is_respected() {
        let text: String = (0..30)
            .map(|i| format!("Sentence {i} about padel positioning and court coverage."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let max_tokens = 40;
        let chunks = chunk_pages(&[page(1, &text)], &config(10, max_tokens));
        for chunk in &chunks {
            assert!(
                chunk.content.len() <= max_tokens * CHARS_PER_TOKEN,
                "chunk of {} chars exceeds window",
                chunk.content.len()
            );
        }
    }

    #[test]
    fn oversized_paragraph_is_hard_split_without_panic() {
        // One giant paragraph, multibyte characters included.
        let text = "La técnica del revés a dos manos exige rotación de hombros. ".repeat(60);
        let chunks = chunk_pages(&[page(1, &text)], &config(10, 30));
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert!(!chunk.content.is_empty());
        }
    }

    #[test]
    fn classify_detects_training_plan() {
        let (category, _) = classify("Plan de entrenamiento semanal para jugadores intermedios");
        assert_eq!(category, ChunkCategory::TrainingPlan);
    }

    #[test]
    fn classify_detects_exercise_and_technique() {
        let (category, technique) =
            classify("Ejercicio 3: practica el saque con 10 repeticiones por serie");
        assert_eq!(category, ChunkCategory::Exercise);
        assert_eq!(technique.as_deref(), Some("serve"));
    }

    #[test]
    fn classify_detects_theory() {
        let (category, technique) = classify("The biomechanics of the kick serve");
        assert_eq!(category, ChunkCategory::Theory);
        assert_eq!(technique.as_deref(), Some("serve"));
    }

    #[test]
    fn unclassified_text_is_general_with_no_technique() {
        let (category, technique) = classify("Hydration guidelines for match days");
        assert_eq!(category, ChunkCategory::General);
        assert!(technique.is_none());
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
