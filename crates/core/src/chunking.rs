use crate::error::IngestError;
use crate::models::Chunk;
use tracing::warn;

/// Slices shorter than this after trimming are dropped, not padded.
pub const MIN_CHUNK_CHARS: usize = 10;

/// Hard cap on chunks emitted for a single document.
pub const MAX_CHUNKS: usize = 1_000;

/// Input longer than this is truncated before chunking begins.
pub const MAX_INPUT_CHARS: usize = 1_000_000;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits cleaned text into fixed-size overlapping windows. Offsets are
/// character offsets; consecutive chunk starts advance by
/// `chunk_size - overlap`. Deterministic for a given input and config.
pub fn create_chunks(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut characters: Vec<char> = text.chars().collect();
    if characters.len() > MAX_INPUT_CHARS {
        warn!(
            original_chars = characters.len(),
            truncated_to = MAX_INPUT_CHARS,
            "input exceeds chunking limit, truncating"
        );
        characters.truncate(MAX_INPUT_CHARS);
    }

    let step = config.chunk_size - config.overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < characters.len() {
        if chunks.len() >= MAX_CHUNKS {
            warn!(
                emitted = MAX_CHUNKS,
                remaining_chars = characters.len() - start,
                "chunk cap reached, dropping remainder"
            );
            break;
        }

        let end = (start + config.chunk_size).min(characters.len());
        let slice: String = characters[start..end].iter().collect();
        let trimmed = slice.trim();

        if trimmed.chars().count() > MIN_CHUNK_CHARS {
            chunks.push(Chunk {
                content: trimmed.to_string(),
                start,
                end,
                index,
            });
            index += 1;
        }

        start += step;
    }

    Ok(chunks)
}
