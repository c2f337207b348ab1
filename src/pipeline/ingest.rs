//! Document ingestion: chunk, embed, ensure the collection, upsert

use super::StepGuard;
use crate::chunk::{chunk_text, ChunkSettings};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::store::{Point, Provenance, VectorStore};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// One document to ingest
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub content: String,
    /// Label stored with every chunk, usually the file path
    pub source: String,
    pub collection: String,
    pub chunk: ChunkSettings,
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub chunks_stored: usize,
    pub collection: String,
    /// Whether this call created the collection
    pub collection_created: bool,
}

/// Chunk, embed and store one document
pub async fn ingest(
    request: &IngestRequest,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    guard: &StepGuard,
) -> Result<IngestStats> {
    let chunks = chunk_text(&request.content, &request.source, &request.chunk)?;
    debug!(
        source = %request.source,
        chunks = chunks.len(),
        "Chunked document"
    );

    if chunks.is_empty() {
        info!("No content to ingest from {}", request.source);
        return Ok(IngestStats {
            chunks_stored: 0,
            collection: request.collection.clone(),
            collection_created: false,
        });
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = guard.run("embedding", embedder.embed(texts)).await?;
    if vectors.len() != chunks.len() {
        return Err(Error::Embedding(format!(
            "Expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        )));
    }

    guard.check()?;
    let collection_created =
        ensure_collection(store, &request.collection, embedder.dimension(), guard).await?;

    let provenance = Provenance::now(embedder.provider_name(), embedder.model_name());
    let points: Vec<Point> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| Point::from_chunk(chunk, vector, &provenance))
        .collect();
    let count = points.len();

    guard.check()?;
    guard
        .run("upsert", store.upsert(&request.collection, points))
        .await?;

    info!(
        "Stored {} chunks from {} in collection {}",
        count, request.source, request.collection
    );

    Ok(IngestStats {
        chunks_stored: count,
        collection: request.collection.clone(),
        collection_created,
    })
}

/// Create the collection if it is not listed yet; returns whether it was missing
pub async fn ensure_collection(
    store: &dyn VectorStore,
    name: &str,
    dimension: usize,
    guard: &StepGuard,
) -> Result<bool> {
    let existing = guard
        .run("list collections", store.list_collections())
        .await?;
    if existing.iter().any(|c| c == name) {
        debug!("Collection {} already exists", name);
        return Ok(false);
    }

    guard.check()?;
    guard
        .run(
            "create collection",
            store.create_collection(name, dimension),
        )
        .await?;
    Ok(true)
}

/// Read a UTF-8 file and ingest it with its path as the source label
pub async fn add_file(
    path: &Path,
    collection: &str,
    chunk: ChunkSettings,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    guard: &StepGuard,
) -> Result<IngestStats> {
    chunk.validate()?;

    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read {}: {}", path.display(), e),
        ))
    })?;

    let request = IngestRequest {
        content,
        source: path.display().to_string(),
        collection: collection.to_string(),
        chunk,
    };
    ingest(&request, embedder, store, guard).await
}
