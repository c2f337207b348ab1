//! FastEmbed implementation for local embeddings
//!
//! The ONNX model is not touched until the first `embed` call. Concurrent
//! first callers share a single load.

use super::{validate_embeddings, Embedder};
use crate::config::ResolvedProviderConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Map a model name to the fastembed model enum
pub fn fastembed_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "BAAI/bge-small-en" | "BAAI/bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "BAAI/bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "BAAI/bge-large-en-v1.5" => Some(EmbeddingModel::BGELargeENV15),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        _ => None,
    }
}

/// FastEmbed-based embedder
pub struct FastEmbedder {
    model: OnceCell<Arc<Mutex<TextEmbedding>>>,
    model_enum: EmbeddingModel,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Create the embedder; the model itself is loaded on first use
    pub fn new(config: &ResolvedProviderConfig) -> Result<Self> {
        let model_enum = fastembed_model(&config.model).ok_or_else(|| {
            Error::Config(format!(
                "Unsupported fastembed model '{}'",
                config.model
            ))
        })?;

        Ok(Self {
            model: OnceCell::new(),
            model_enum,
            model_name: config.model.clone(),
            dimension: config.dimension,
        })
    }

    /// Whether the model has been loaded yet
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn loaded_model(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!("Initializing FastEmbed with model: {}", self.model_name);
                let model_enum = self.model_enum.clone();

                // Loading may download weights, so keep it off the runtime threads
                let model = tokio::task::spawn_blocking(move || {
                    TextEmbedding::try_new(
                        InitOptions::new(model_enum).with_show_download_progress(false),
                    )
                })
                .await
                .map_err(|e| Error::Embedding(format!("Task join error: {}", e)))?
                .map_err(|e| Error::Embedding(format!("Failed to initialize model: {}", e)))?;

                info!("FastEmbed model loaded successfully");
                Ok::<_, Error>(Arc::new(Mutex::new(model)))
            })
            .await?;

        Ok(Arc::clone(model))
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.loaded_model().await?;
        let count = texts.len();
        debug!("Embedding {} texts", count);

        // FastEmbed is synchronous, so we wrap in blocking task
        let embeddings = tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.embed(texts, None)
        })
        .await
        .map_err(|e| Error::Embedding(format!("Task join error: {}", e)))?
        .map_err(|e| Error::Embedding(format!("Embedding failed: {}", e)))?;

        validate_embeddings(&self.model_name, count, self.dimension, &embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
