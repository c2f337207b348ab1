//! Text chunking
//!
//! Splits a document into fixed-size, overlapping windows measured in
//! characters (Unicode scalar values). Adjacent chunks share exactly
//! `chunk_overlap` characters, and the windows together cover the whole text.

use crate::config::{default_chunk_overlap, default_chunk_size};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Chunk size and overlap for one chunking call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSettings {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by adjacent chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkSettings {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Replace whichever values a request supplies, keeping the rest
    pub fn with_overrides(self, chunk_size: Option<usize>, chunk_overlap: Option<usize>) -> Self {
        Self {
            chunk_size: chunk_size.unwrap_or(self.chunk_size),
            chunk_overlap: chunk_overlap.unwrap_or(self.chunk_overlap),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be > 0".to_string()));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be < chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        Ok(())
    }

    /// Distance between the starts of adjacent windows
    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Position and origin of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Label of the originating document (usually its file path)
    pub source: String,

    /// Chunk index (0-based) among chunks of the same source
    pub chunk_index: usize,

    /// Character start position in the source text
    pub char_start: usize,

    /// Character end position in the source text (exclusive)
    pub char_end: usize,
}

/// A text chunk with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Split `text` into overlapping chunks labelled with `source`
pub fn chunk_text(text: &str, source: &str, settings: &ChunkSettings) -> Result<Vec<Chunk>> {
    settings.validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char, plus the end of text, so windows slice on
    // char boundaries.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = offsets.len() - 1;

    let mut chunks = Vec::with_capacity(expected_chunk_count(char_len, settings));
    let mut start = 0;

    loop {
        let end = (start + settings.chunk_size).min(char_len);

        chunks.push(Chunk {
            text: text[offsets[start]..offsets[end]].to_string(),
            metadata: ChunkMetadata {
                source: source.to_string(),
                chunk_index: chunks.len(),
                char_start: start,
                char_end: end,
            },
        });

        if end == char_len {
            break;
        }
        start += settings.stride();
    }

    Ok(chunks)
}

/// Number of chunks `chunk_text` produces for a text of `char_len` characters
pub fn expected_chunk_count(char_len: usize, settings: &ChunkSettings) -> usize {
    if char_len == 0 {
        0
    } else if char_len <= settings.chunk_size {
        1
    } else {
        (char_len - settings.chunk_overlap).div_ceil(settings.stride())
    }
}
