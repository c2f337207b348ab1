//! Payload schema for stored points

use super::Point;
use crate::chunk::Chunk;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload stored with each chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// The chunk text
    pub text: String,

    /// Document label (file path)
    pub source: String,

    /// Chunk index within the document
    pub chunk_index: usize,

    /// Character offsets of the chunk in the document
    pub char_start: usize,
    pub char_end: usize,

    /// When this chunk was ingested (RFC 3339)
    pub ingested_at: String,

    /// Provider and model that produced the vector
    pub embedding_provider: String,
    pub embedding_model: String,
}

/// Who produced the vectors for a batch of points
#[derive(Debug, Clone)]
pub struct Provenance {
    pub provider: String,
    pub model: String,
    pub ingested_at: String,
}

impl Provenance {
    pub fn now(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ingested_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl ChunkPayload {
    pub fn new(chunk: Chunk, provenance: &Provenance) -> Self {
        Self {
            text: chunk.text,
            source: chunk.metadata.source,
            chunk_index: chunk.metadata.chunk_index,
            char_start: chunk.metadata.char_start,
            char_end: chunk.metadata.char_end,
            ingested_at: provenance.ingested_at.clone(),
            embedding_provider: provenance.provider.clone(),
            embedding_model: provenance.model.clone(),
        }
    }

    /// Flatten into the JSON object stored as the point payload
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("text".to_string(), Value::String(self.text));
        map.insert("source".to_string(), Value::String(self.source));
        map.insert("chunk_index".to_string(), Value::from(self.chunk_index));
        map.insert("char_start".to_string(), Value::from(self.char_start));
        map.insert("char_end".to_string(), Value::from(self.char_end));
        map.insert("ingested_at".to_string(), Value::String(self.ingested_at));
        map.insert(
            "embedding_provider".to_string(),
            Value::String(self.embedding_provider),
        );
        map.insert(
            "embedding_model".to_string(),
            Value::String(self.embedding_model),
        );
        map
    }
}

impl Point {
    /// Pair a chunk with its vector under a fresh random id
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>, provenance: &Provenance) -> Self {
        Self {
            id: Uuid::new_v4(),
            vector,
            payload: ChunkPayload::new(chunk, provenance).into_map(),
        }
    }
}
