//! Overlapping window text chunker.
//!
//! Each page is whitespace-normalized and cut into windows of at most
//! `chunk_size` characters. Consecutive windows share `overlap` characters.
//! A window prefers to end just after the last `.` in its second half, then
//! at the last space in its second half, and only cuts mid-word when neither
//! exists. Windows of `min_chunk_chars` characters or fewer are discarded.
//!
//! All lengths are in characters, never bytes, so multi-byte text is never
//! split inside a code point.

use std::path::Path;

use crate::models::{Chunk, PageText};

/// Chunking parameters. See [`ChunkingParams::default`] for the stock values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            min_chunk_chars: 50,
        }
    }
}

/// Split one piece of text into overlapping windows.
///
/// Returns an empty vector for blank input.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = normalize_whitespace(text).chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    if chars.len() <= chunk_size {
        return vec![chars.iter().collect()];
    }

    let len = chars.len();
    let half = chunk_size / 2;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len {
            let window = &chars[start..end];
            if let Some(dot) = window.iter().rposition(|c| *c == '.') {
                if dot > half {
                    end = start + dot + 1;
                } else if let Some(space) = window.iter().rposition(|c| *c == ' ') {
                    if space > half {
                        end = start + space;
                    }
                }
            } else if let Some(space) = window.iter().rposition(|c| *c == ' ') {
                if space > half {
                    end = start + space;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= len {
            break;
        }
        // Never move backwards or stall, whatever the overlap.
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Chunk every page of a document, dropping windows that are too short and
/// numbering the survivors contiguously across the whole file.
pub fn chunk_pages(source: &Path, pages: &[PageText], params: &ChunkingParams) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_index: u32 = 0;

    for page in pages {
        for text in chunk_text(&page.text, params.chunk_size, params.overlap) {
            if text.chars().count() <= params.min_chunk_chars {
                continue;
            }
            chunks.push(Chunk {
                source: source.to_path_buf(),
                page_num: page.page_num,
                chunk_index,
                text,
            });
            chunk_index += 1;
        }
    }

    chunks
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, text: &str) -> PageText {
        PageText {
            page_num: n,
            text: text.to_string(),
        }
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("Atrial   fibrillation\n\nis common.", 1000, 200);
        assert_eq!(chunks, vec!["Atrial fibrillation is common.".to_string()]);
    }

    #[test]
    fn blank_text_no_chunks() {
        assert!(chunk_text("  \n\t ", 1000, 200).is_empty());
    }

    #[test]
    fn long_text_breaks_on_sentence_and_overlaps() {
        let sentence = "The left ventricle pumps oxygenated blood into the aorta. ";
        let text = sentence.repeat(60);
        let chunks = chunk_text(&text, 300, 60);
        assert!(chunks.len() > 1);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.chars().count() <= 300);
            assert!(c.ends_with('.'), "chunk should end on a sentence: {c:?}");
        }
        // Overlap: the start of each chunk appears inside the previous one.
        let head: String = chunks[1].chars().take(20).collect();
        assert!(chunks[0].contains(head.trim()));
    }

    #[test]
    fn falls_back_to_word_boundary() {
        let text = "word ".repeat(100);
        let chunks = chunk_text(&text, 53, 10);
        for c in &chunks {
            assert!(!c.starts_with(' ') && !c.ends_with(' '));
            assert!(c.split(' ').all(|w| w == "word"), "split inside a word: {c:?}");
        }
    }

    #[test]
    fn multibyte_text_is_safe() {
        let text = "éé ".repeat(500);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn overlap_larger_than_window_still_terminates() {
        let text = "x".repeat(1000);
        let chunks = chunk_text(&text, 10, 50);
        assert_eq!(chunks.len(), 100);
    }

    #[test]
    fn pages_numbered_contiguously_and_short_chunks_dropped() {
        let long = "Beta blockers reduce myocardial oxygen demand. ".repeat(40);
        let pages = vec![page(1, &long), page(2, "Too short."), page(3, &long)];
        let params = ChunkingParams {
            chunk_size: 400,
            overlap: 80,
            min_chunk_chars: 50,
        };
        let chunks = chunk_pages(Path::new("/docs/a.pdf"), &pages, &params);
        assert!(chunks.iter().all(|c| c.page_num != 2));
        assert!(chunks.iter().any(|c| c.page_num == 3));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as u32);
            assert_eq!(c.source, Path::new("/docs/a.pdf"));
        }
    }

    #[test]
    fn deterministic() {
        let text = "Alpha beta gamma delta. ".repeat(80);
        assert_eq!(chunk_text(&text, 120, 30), chunk_text(&text, 120, 30));
    }
}
