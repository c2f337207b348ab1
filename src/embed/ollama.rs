//! Ollama embeddings over its local HTTP API

use super::openai::endpoint_url;
use super::{validate_embeddings, Embedder};
use crate::config::ResolvedProviderConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for `POST {endpoint}/api/embed`
pub struct OllamaEmbedder {
    client: Client,
    url: Url,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &ResolvedProviderConfig) -> Result<Self> {
        let url = endpoint_url(&config.endpoint, "api/embed")?;
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size,
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(model = %self.model, count = batch.len(), "Requesting Ollama embeddings");

        let mut request = self.client.post(self.url.clone()).json(&EmbedRequest {
            model: &self.model,
            input: batch,
        });
        // A bare daemon has no auth; proxies in front of it may
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "ollama returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse ollama response: {}", e)))?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_batch(batch).await?;
            validate_embeddings(&self.model, batch.len(), self.dimension, &embeddings)?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}
