//! Overlapping text chunker
//!
//! Splits documents into chunks of at most `chunk_size` characters. Each cut is
//! placed at the most natural boundary available inside the size window
//! (paragraph, then line, then sentence, then word), falling back to a hard
//! character cut only when no boundary exists. Every chunk after the first
//! starts exactly `overlap` characters before the end of its predecessor,
//! except after a whitespace-only stretch, which yields no chunk.
//!
//! Lengths are counted in `char`s, never bytes, so multi-byte text is never
//! sliced mid-character.

use crate::error::{KbError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// A bounded substring of a source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text content
    pub text: String,
    /// Source document identity (file name), when known
    pub source: Option<String>,
    /// Position of this chunk within its source document
    pub ordinal: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const BOUNDARY_PRIORITY: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Word,
];

impl Boundary {
    /// Whether a chunk ending (exclusively) at `end` ends on this boundary
    fn matches(self, chars: &[char], end: usize) -> bool {
        let prev = chars[end - 1];
        match self {
            Boundary::Paragraph => prev == '\n' && end >= 2 && chars[end - 2] == '\n',
            Boundary::Line => prev == '\n',
            Boundary::Sentence => {
                prev.is_whitespace() && end >= 2 && matches!(chars[end - 2], '.' | '?' | '!')
            }
            Boundary::Word => prev.is_whitespace(),
        }
    }
}

/// Splits text into overlapping, size-bounded chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Create a chunker
    ///
    /// Fails with [`KbError::Config`] when `chunk_size` is zero or when
    /// `overlap` is not strictly smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(KbError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(KbError::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split a document into chunk strings
    ///
    /// Empty and whitespace-only documents produce no chunks. A document no
    /// longer than `chunk_size` comes back as a single chunk equal to itself.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.spans(text)
            .into_iter()
            .map(|span| &text[span])
            // Blank runs longer than a chunk leave whitespace-only spans, so the
            // chunks either side of such a gap are not source-adjacent
            .filter(|chunk| !chunk.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Split a document and attach source identity and ordinals
    pub fn chunk_document(&self, source: Option<&str>, text: &str) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Chunk {
                text,
                source: source.map(str::to_string),
                ordinal,
            })
            .collect();

        debug!(
            "Chunked {} ({} chars) into {} chunks",
            source.unwrap_or("<inline>"),
            text.chars().count(),
            chunks.len()
        );

        chunks
    }

    /// Byte ranges of each chunk in `text`
    fn spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = chars.len();

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            if len - start <= self.chunk_size {
                spans.push(offsets[start]..offsets[len]);
                break;
            }

            let end = self.find_cut(&chars, start);
            spans.push(offsets[start]..offsets[end]);
            // end > start + overlap, so this always moves forward
            start = end - self.overlap;
        }

        spans
    }

    /// Pick the exclusive end of the chunk starting at `start`
    ///
    /// Caller guarantees `start + chunk_size < chars.len()`.
    fn find_cut(&self, chars: &[char], start: usize) -> usize {
        let hard_end = start + self.chunk_size;
        let min_end = start + self.overlap + 1;

        for boundary in BOUNDARY_PRIORITY {
            if let Some(end) = (min_end..=hard_end)
                .rev()
                .find(|&end| boundary.matches(chars, end))
            {
                return end;
            }
        }

        hard_end
    }
}

/// Split `text` with the given parameters
///
/// Convenience wrapper over [`TextChunker`]; parameter errors are reported
/// before any splitting happens.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(TextChunker::new(chunk_size, overlap)?.split(text))
}
