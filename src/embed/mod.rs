//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - A closed set of provider kinds selected by name
//! - OpenAI-compatible, Ollama and local FastEmbed backends

#[cfg(feature = "local-embed")]
mod fastembed_impl;
mod ollama;
mod openai;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;
pub use ollama::*;
pub use openai::*;

use crate::config::{Config, ResolvedProviderConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts; output order and length match the input
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Provider label recorded with stored vectors
    fn provider_name(&self) -> &str {
        "custom"
    }
}

/// Known embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(name = "openai")]
    OpenAi,
    #[value(name = "openrouter")]
    OpenRouter,
    #[value(name = "ollama")]
    Ollama,
    #[value(name = "fastembed")]
    FastEmbed,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::OpenRouter,
        ProviderKind::Ollama,
        ProviderKind::FastEmbed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Ollama => "ollama",
            ProviderKind::FastEmbed => "fastembed",
        }
    }

    /// Prefix of the environment variables that configure this provider
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI",
            ProviderKind::OpenRouter => "OPENROUTER",
            ProviderKind::Ollama => "OLLAMA",
            ProviderKind::FastEmbed => "FASTEMBED",
        }
    }

    /// Whether construction fails without an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderKind::OpenAi | ProviderKind::OpenRouter)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            "fastembed" => Ok(Self::FastEmbed),
            other => Err(Error::Config(format!(
                "Unsupported embedding service '{}'; expected one of openai, openrouter, ollama, fastembed",
                other
            ))),
        }
    }
}

/// A configured embedding backend, one variant per transport
pub enum EmbeddingProvider {
    OpenAi(OpenAiEmbedder),
    Ollama(OllamaEmbedder),
    #[cfg(feature = "local-embed")]
    FastEmbed(FastEmbedder),
}

impl EmbeddingProvider {
    /// Build the provider for `kind` from configuration and environment
    pub fn from_config(kind: ProviderKind, config: &Config) -> Result<Self> {
        let resolved = config.resolve_provider(kind)?;
        Self::from_resolved(&resolved)
    }

    /// Build a provider from already-resolved settings
    pub fn from_resolved(config: &ResolvedProviderConfig) -> Result<Self> {
        match config.kind {
            ProviderKind::OpenAi | ProviderKind::OpenRouter => {
                Ok(Self::OpenAi(OpenAiEmbedder::new(config)?))
            }
            ProviderKind::Ollama => Ok(Self::Ollama(OllamaEmbedder::new(config)?)),
            #[cfg(feature = "local-embed")]
            ProviderKind::FastEmbed => Ok(Self::FastEmbed(FastEmbedder::new(config)?)),
            #[cfg(not(feature = "local-embed"))]
            ProviderKind::FastEmbed => Err(Error::Config(
                "fastembed is unavailable: docvec was built without the 'local-embed' feature"
                    .to_string(),
            )),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            EmbeddingProvider::OpenAi(inner) => inner.kind(),
            EmbeddingProvider::Ollama(_) => ProviderKind::Ollama,
            #[cfg(feature = "local-embed")]
            EmbeddingProvider::FastEmbed(_) => ProviderKind::FastEmbed,
        }
    }

    fn inner(&self) -> &dyn Embedder {
        match self {
            EmbeddingProvider::OpenAi(inner) => inner,
            EmbeddingProvider::Ollama(inner) => inner,
            #[cfg(feature = "local-embed")]
            EmbeddingProvider::FastEmbed(inner) => inner,
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.inner().embed(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner().dimension()
    }

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }

    fn provider_name(&self) -> &str {
        self.kind().as_str()
    }
}

/// Check that a backend returned one vector per input, each of the declared size
pub fn validate_embeddings(
    model: &str,
    expected_count: usize,
    dimension: usize,
    embeddings: &[Vec<f32>],
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(Error::Embedding(format!(
            "Model '{}' returned {} embeddings for {} inputs",
            model,
            embeddings.len(),
            expected_count
        )));
    }

    if let Some(mismatch) = embeddings.iter().find(|vec| vec.len() != dimension) {
        return Err(Error::Embedding(format!(
            "Embedding dimension mismatch for model '{}': expected {}, got {}",
            model,
            dimension,
            mismatch.len()
        )));
    }

    Ok(())
}
