//! Search command implementation

use crate::config::Config;
use crate::embed::{EmbeddingProvider, ProviderKind};
use crate::error::Result;
use crate::pipeline::{render_results, retrieve, FormattedResult, SearchRequest, StepGuard};
use crate::store::VectorStore;
use tracing::info;

/// Search options
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    pub collection: String,
    pub provider: ProviderKind,
    /// Number of results; `[query] default_limit` when unset
    pub limit: Option<usize>,
}

/// Execute a search
pub async fn cmd_search(
    config: &Config,
    store: &dyn VectorStore,
    options: &SearchOptions,
    guard: &StepGuard,
) -> Result<Vec<FormattedResult>> {
    info!("Searching {}: {}", options.collection, options.query);

    let embedder = EmbeddingProvider::from_config(options.provider, config)?;
    let request = SearchRequest {
        query: options.query.clone(),
        collection: options.collection.clone(),
        limit: options.limit,
    };

    retrieve(&request, config.query.default_limit, &embedder, store, guard).await
}

/// Print search results to console
pub fn print_search_results(results: &[FormattedResult]) {
    print!("{}", render_results(results));
    if !results.iter().any(|r| matches!(r, FormattedResult::Hit(_))) {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Point};
    use serde_json::{json, Map};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_embeds_query_and_formats() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(json!({ "input": ["where is it"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.0, 1.0]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        store.create_collection("docs", 2).await.unwrap();
        let mut payload = Map::new();
        payload.insert("text".to_string(), json!("under the stairs"));
        payload.insert("source".to_string(), json!("house.md"));
        store
            .upsert(
                "docs",
                vec![Point {
                    id: Uuid::new_v4(),
                    vector: vec![0.0, 2.0],
                    payload,
                }],
            )
            .await
            .unwrap();

        let mut config = Config::default();
        config.providers.ollama.endpoint = Some(server.uri());
        config.providers.ollama.model = Some("all-minilm".to_string());
        config.providers.ollama.dimension = Some(2);

        let options = SearchOptions {
            query: "where is it".to_string(),
            collection: "docs".to_string(),
            provider: ProviderKind::Ollama,
            limit: None,
        };
        let guard = StepGuard::new(Duration::from_secs(5), CancellationToken::new());
        let results = cmd_search(&config, &store, &options, &guard).await.unwrap();

        assert_eq!(
            render_results(&results),
            "Result 1 (Score: 1.00):\nunder the stairs\nSource: house.md\n\n"
        );
    }
}
