//! Overlapping window chunker.
//!
//! Splits loader text units into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks of the same unit share exactly `overlap`
//! characters: each chunk starts where the previous chunk's last `overlap`
//! characters begin. The one exception is a whitespace-only window, which
//! is skipped.
//!
//! Chunk ends prefer natural boundaries. Inside the upper half of each
//! window the chunker looks for, in order, a paragraph break (`\n\n`), a
//! line break, a sentence end (`. `) and finally a space; if none is found
//! the window is cut hard at `chunk_size`.
//!
//! Offsets and lengths are counted in characters, not bytes, so multi-byte
//! text never splits inside a code point.
//!
//! Each chunk receives a deterministic UUIDv5 derived from its document ID,
//! unit and start offset, so re-indexing identical content replaces entries
//! instead of duplicating them.

use uuid::Uuid;

use crate::models::{Chunk, TextUnit};

/// Preferred chunk boundaries, strongest first.
const BREAKS: [&[char]; 4] = [&['\n', '\n'], &['\n'], &['.', ' '], &[' ']];

/// A window of a single text, before metadata is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Character offset of the first character.
    pub start: usize,
    pub text: String,
}

impl Span {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split every unit and attach its metadata plus the chunk's `start_offset`.
pub fn split(units: &[TextUnit], chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for unit in units {
        for span in split_text(&unit.text, chunk_size, overlap) {
            let mut metadata = unit.metadata.clone();
            metadata.start_offset = span.start;
            chunks.push(Chunk {
                id: chunk_id(&metadata.doc_id, metadata.unit, span.start),
                text: span.text,
                metadata,
            });
        }
    }
    chunks
}

/// Split one text into overlapping windows.
///
/// Empty or whitespace-only text yields no spans. `overlap` is clamped below
/// `chunk_size` so the window always advances.
///
/// Windows holding only whitespace are not emitted. Across a whitespace run
/// longer than a window, the spans on either side therefore share fewer
/// than `overlap` characters, possibly none; every emitted span still starts
/// `overlap` characters before the end of the window that preceded it.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Span> {
    if chunk_size == 0 || text.trim().is_empty() {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size - 1);
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let limit = (start + chunk_size).min(total);
        let end = if limit == total {
            total
        } else {
            find_break(&chars, start, limit, chunk_size, overlap)
        };

        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            spans.push(Span { start, text: piece });
        }
        if end >= total {
            break;
        }
        start = end - overlap;
    }
    spans
}

/// Deterministic chunk ID.
pub fn chunk_id(doc_id: &str, unit: usize, start_offset: usize) -> String {
    let name = format!("{doc_id}:{unit}:{start_offset}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// End of the window starting at `start`: just past the last preferred
/// boundary in `[floor, limit]`, or `limit` for a hard cut.
///
/// `floor` stays above `start + overlap`, so the next window begins after
/// this one did.
fn find_break(
    chars: &[char],
    start: usize,
    limit: usize,
    chunk_size: usize,
    overlap: usize,
) -> usize {
    let floor = (start + chunk_size / 2).max(start + overlap + 1);
    for sep in BREAKS {
        let n = sep.len();
        let mut end = limit;
        while end >= floor && end >= start + n {
            if chars[end - n..end] == *sep {
                return end;
            }
            end -= 1;
        }
    }
    limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn prose(words: usize) -> String {
        (0..words)
            .map(|i| {
                if i % 12 == 11 {
                    format!("word{i}.")
                } else {
                    format!("word{i}")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn unit(text: &str) -> TextUnit {
        TextUnit {
            text: text.to_string(),
            metadata: ChunkMetadata {
                doc_id: "abc123".into(),
                filename: "a.txt".into(),
                filetype: "txt".into(),
                upload_time: "2024-01-01T00:00:00+00:00".into(),
                start_offset: 0,
                unit: 0,
            },
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "x".repeat(300);
        let spans = split_text(&text, 600, 200);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].text, text);
    }

    #[test]
    fn test_900_chars_two_chunks() {
        let text = "y".repeat(900);
        let spans = split_text(&text, 600, 200);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].char_len(), 600);
        assert_eq!(spans[1].start, 400);
        assert_eq!(spans[1].char_len(), 500);
    }

    #[test]
    fn test_empty_and_whitespace_yield_nothing() {
        assert!(split_text("", 600, 200).is_empty());
        assert!(split_text("  \n\n\t ", 600, 200).is_empty());
        assert!(split(&[unit("")], 600, 200).is_empty());
    }

    #[test]
    fn test_offsets_strictly_increasing_with_exact_overlap() {
        let text = prose(800);
        let chars: Vec<char> = text.chars().collect();
        let spans = split_text(&text, 600, 200);
        assert!(spans.len() > 3);

        for pair in spans.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(b.start > a.start);
            assert_eq!(b.start, a.start + a.char_len() - 200);
            let tail: String = chars[b.start..a.start + a.char_len()].iter().collect();
            assert!(b.text.starts_with(&tail));
            assert_eq!(tail.chars().count(), 200);
        }
        for span in &spans {
            assert!(span.char_len() <= 600);
        }
        let last = spans.last().unwrap();
        assert_eq!(last.start + last.char_len(), chars.len());
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let first = "a".repeat(400);
        let text = format!("{first}\n\n{}", "b ".repeat(300));
        let spans = split_text(&text, 600, 100);
        assert!(spans[0].text.ends_with("\n\n"));
        assert_eq!(spans[0].char_len(), 402);
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let text = "é".repeat(700);
        let spans = split_text(&text, 600, 200);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].char_len(), 600);
        assert_eq!(spans[1].start, 400);
    }

    #[test]
    fn test_overlap_clamped_below_chunk_size() {
        let spans = split_text(&"z".repeat(50), 10, 10);
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            assert!(pair[1].start > pair[0].start);
        }
    }

    #[test]
    fn test_metadata_propagated() {
        let chunks = split(&[unit(&prose(300))], 600, 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.doc_id, "abc123");
            assert_eq!(chunk.metadata.filename, "a.txt");
            assert_eq!(chunk.metadata.filetype, "txt");
        }
        assert_eq!(chunks[0].metadata.start_offset, 0);
        assert!(chunks[1].metadata.start_offset > 0);
    }

    #[test]
    fn test_deterministic_ids() {
        let a = split(&[unit(&prose(300))], 600, 200);
        let b = split(&[unit(&prose(300))], 600, 200);
        assert_eq!(a, b);
        let ids: std::collections::HashSet<_> = a.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), a.len());
    }

    #[test]
    fn test_chunk_id_depends_on_unit() {
        assert_ne!(chunk_id("d", 0, 0), chunk_id("d", 1, 0));
        assert_eq!(chunk_id("d", 2, 40), chunk_id("d", 2, 40));
    }

    #[test]
    fn test_whitespace_only_window_is_skipped() {
        let text = format!("{}{}{}", "a".repeat(500), " ".repeat(700), "b".repeat(500));
        let spans = split_text(&text, 600, 200);
        let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 400, 1000, 1400]);
        assert!(spans.iter().all(|s| !s.text.trim().is_empty()));
        // The skipped window leaves no overlap across the gap.
        assert_eq!(spans[1].start + spans[1].char_len(), spans[2].start);
        // Past the gap the regular overlap resumes.
        assert_eq!(spans[2].start + spans[2].char_len() - spans[3].start, 200);
    }
}
