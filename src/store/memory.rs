//! In-process vector store with cosine search
//!
//! Backed by a `HashMap` under a `tokio::sync::RwLock`. Useful for tests and
//! for running the pipeline without a Qdrant server.

use super::{Point, SearchResult, VectorStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
struct Collection {
    dimension: usize,
    points: HashMap<Uuid, (Vec<f32>, Map<String, Value>)>,
}

/// In-memory store; collection name -> point id -> (vector, payload)
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection, if it exists
    pub async fn point_count(&self, collection: &str) -> Option<usize> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
    }
}

/// Cosine similarity; 0.0 when either side has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(name) {
            if existing.dimension != vector_size {
                return Err(Error::Qdrant(format!(
                    "Collection '{}' exists with dimension {}, requested {}",
                    name, existing.dimension, vector_size
                )));
            }
            return Ok(());
        }

        collections.insert(
            name.to_string(),
            Collection {
                dimension: vector_size,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        // Reject the whole batch before writing anything
        if let Some(bad) = points.iter().find(|p| p.vector.len() != store.dimension) {
            return Err(Error::Qdrant(format!(
                "Wrong input: Vector dimension error: expected dim: {}, got {}",
                store.dimension,
                bad.vector.len()
            )));
        }

        for point in points {
            store.points.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        if vector.len() != store.dimension {
            return Err(Error::Qdrant(format!(
                "Wrong input: Vector dimension error: expected dim: {}, got {}",
                store.dimension,
                vector.len()
            )));
        }

        let mut scored: Vec<SearchResult> = store
            .points
            .iter()
            .map(|(id, (stored, payload))| SearchResult {
                id: id.to_string(),
                score: cosine_similarity(stored, vector),
                payload: payload.clone(),
                vector: None,
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }
}
