//! OpenAI-compatible embeddings API (OpenAI, OpenRouter)

use super::{validate_embeddings, Embedder, ProviderKind};
use crate::config::ResolvedProviderConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Client for `POST {endpoint}/embeddings`
pub struct OpenAiEmbedder {
    client: Client,
    url: Url,
    api_key: String,
    kind: ProviderKind,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &ResolvedProviderConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Config(format!(
                "{} requires an API key; set {}_API_KEY",
                config.kind,
                config.kind.env_prefix()
            ))
        })?;

        let url = endpoint_url(&config.endpoint, "embeddings")?;
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            url,
            api_key,
            kind: config.kind,
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(
            provider = %self.kind,
            model = %self.model,
            count = batch.len(),
            "Requesting embeddings"
        );

        let mut request = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: batch,
            });
        if self.kind == ProviderKind::OpenRouter {
            request = request.header("X-Title", "docvec");
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("{} request failed: {}", self.kind, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "{} returned HTTP {}: {}",
                self.kind,
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            Error::Embedding(format!("Failed to parse {} response: {}", self.kind, e))
        })?;

        // The API may answer out of order; `index` refers to the input position
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
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
        self.kind.as_str()
    }
}

/// Join `path` onto a base URL, keeping any path prefix the base carries
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<Url> {
    let mut base = Url::parse(base)
        .map_err(|e| Error::Config(format!("Invalid endpoint URL '{}': {}", base, e)))?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| Error::Config(format!("Invalid endpoint URL: {}", e)))
}
