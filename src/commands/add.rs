//! Add documents command implementation

use crate::config::Config;
use crate::embed::{Embedder, EmbeddingProvider, ProviderKind};
use crate::error::Result;
use crate::pipeline::{add_file, IngestStats, StepGuard};
use crate::store::VectorStore;
use std::path::PathBuf;
use tracing::info;

/// Options for adding one file to a collection
#[derive(Debug, Clone)]
pub struct AddOptions {
    pub file: PathBuf,
    pub collection: String,
    pub provider: ProviderKind,
    /// Overrides `[chunk] chunk_size`
    pub chunk_size: Option<usize>,
    /// Overrides `[chunk] chunk_overlap`
    pub chunk_overlap: Option<usize>,
}

/// Chunk, embed and store a file
pub async fn cmd_add_documents(
    config: &Config,
    store: &dyn VectorStore,
    options: &AddOptions,
    guard: &StepGuard,
) -> Result<IngestStats> {
    let chunk = config
        .chunk
        .with_overrides(options.chunk_size, options.chunk_overlap);
    chunk.validate()?;

    let embedder = EmbeddingProvider::from_config(options.provider, config)?;
    info!(
        "Adding {} to {} using {} ({})",
        options.file.display(),
        options.collection,
        options.provider,
        embedder.model_name()
    );

    add_file(
        &options.file,
        &options.collection,
        chunk,
        &embedder,
        store,
        guard,
    )
    .await
}

/// Message reported after a successful add
pub fn added_message(stats: &IngestStats) -> String {
    format!(
        "Successfully processed and added {} chunks to collection {}",
        stats.chunks_stored, stats.collection
    )
}

/// Print add stats to console
pub fn print_add_stats(stats: &IngestStats) {
    println!("✓ {}", added_message(stats));
    if stats.collection_created {
        println!("  Created collection {}", stats.collection);
    }
}
