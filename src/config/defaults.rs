//! Default values for configuration

use crate::embed::ProviderKind;

/// Default Qdrant REST URL for local development (port 6333, not 6334 gRPC)
pub fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default maximum characters per chunk
pub fn default_chunk_size() -> usize {
    1000
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    200
}

/// Default number of search results
pub fn default_query_limit() -> usize {
    10
}

/// Default HTTP request timeout in seconds
pub fn default_request_timeout() -> u64 {
    30
}

/// Default bound for a single pipeline step in seconds
pub fn default_step_timeout() -> u64 {
    30
}

/// Default number of texts sent per embedding request
pub fn default_embedding_batch_size() -> usize {
    96
}

/// Environment variable holding the API key for a provider
pub fn default_api_key_env(kind: ProviderKind) -> String {
    format!("{}_API_KEY", kind.env_prefix())
}

/// Default API endpoint for a provider (empty for in-process models)
pub fn default_provider_endpoint(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "https://api.openai.com/v1",
        ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        ProviderKind::Ollama => "http://localhost:11434",
        ProviderKind::FastEmbed => "",
    }
}

/// Default embedding model for a provider
pub fn default_provider_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "text-embedding-3-small",
        ProviderKind::OpenRouter => "openai/text-embedding-3-small",
        ProviderKind::Ollama => "nomic-embed-text",
        ProviderKind::FastEmbed => "BAAI/bge-small-en-v1.5",
    }
}
