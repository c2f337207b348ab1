//! Vector database integration
//!
//! This module defines the store interface the pipeline depends on and provides:
//! - A Qdrant REST client
//! - An in-process store with cosine search
//! - The payload schema written with every chunk

mod memory;
mod payload;
mod qdrant;

pub use memory::*;
pub use payload::*;
pub use qdrant::*;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A point ready to be upserted
#[derive(Debug, Clone, Serialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// Search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    /// Similarity, higher is closer
    pub score: f32,
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// Operations the pipeline needs from a vector database
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Names of all collections
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Create a cosine collection; succeeds if it already exists
    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()>;

    /// Insert or replace points in one batch
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()>;

    /// Nearest neighbours of `vector`, best match first
    async fn search(&self, collection: &str, vector: &[f32], limit: usize)
        -> Result<Vec<SearchResult>>;

    /// Drop a collection and all its points
    async fn delete_collection(&self, name: &str) -> Result<()>;
}
