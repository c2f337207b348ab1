//! Qdrant REST client
//!
//! Talks to Qdrant's HTTP API (port 6333) with JSON bodies and an optional
//! `api-key` header.

use super::{Point, SearchResult, VectorStore};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: &'a [Point],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
    #[serde(default)]
    vector: Option<Value>,
}

impl From<ScoredPoint> for SearchResult {
    fn from(point: ScoredPoint) -> Self {
        Self {
            id: point_id_to_string(&point.id),
            score: point.score,
            payload: point.payload.unwrap_or_default(),
            // Named vectors come back as an object; only plain vectors are kept
            vector: point
                .vector
                .and_then(|v| serde_json::from_value::<Vec<f32>>(v).ok()),
        }
    }
}

/// Qdrant store handle
pub struct QdrantStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key(),
            config.timeouts.request(),
        )
    }

    /// Create a new store handle directly with URL and key
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let base_url = Url::parse(url)
            .map_err(|e| Error::Config(format!("Invalid Qdrant URL '{}': {}", url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Invalid Qdrant URL '{}'", url)));
        }
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid Qdrant URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| Error::Qdrant(format!("Failed to {}: {}", action, e)))
    }

    async fn parse<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
        let parsed: QdrantResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Qdrant(format!("Invalid response to {}: {}", action, e)))?;
        Ok(parsed.result)
    }

    /// Map a non-success response to an error; a 404 means a missing
    /// collection only when the call targeted one
    async fn into_error(response: Response, collection: Option<&str>, action: &str) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if let (StatusCode::NOT_FOUND, Some(collection)) = (status, collection) {
            return Error::CollectionNotFound(collection.to_string());
        }

        Error::Qdrant(format!(
            "Failed to {}: HTTP {}: {}",
            action,
            status.as_u16(),
            error_message(&body)
        ))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let url = self.endpoint(&["collections"])?;
        debug!("Listing collections at {}", url);

        let action = "list collections";
        let response = self.send(self.request(reqwest::Method::GET, url), action).await?;
        if !response.status().is_success() {
            return Err(Self::into_error(response, None, action).await);
        }

        let result: CollectionsResult = Self::parse(response, action).await?;
        Ok(result.collections.into_iter().map(|c| c.name).collect())
    }

    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<()> {
        let url = self.endpoint(&["collections", name])?;
        info!("Creating collection {} with dimension {}", name, vector_size);

        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine",
            }
        });
        let action = "create collection";
        let response = self
            .send(self.request(reqwest::Method::PUT, url).json(&body), action)
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Collection {} created successfully", name);
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        // Another writer may have created it between our check and this call
        if status == StatusCode::CONFLICT
            || (status == StatusCode::BAD_REQUEST && text.contains("already exists"))
        {
            warn!("Collection {} already exists; continuing", name);
            return Ok(());
        }

        Err(Error::Qdrant(format!(
            "Failed to {} '{}': HTTP {}: {}",
            action,
            name,
            status.as_u16(),
            error_message(&text)
        )))
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut url = self.endpoint(&["collections", collection, "points"])?;
        url.query_pairs_mut().append_pair("wait", "true");
        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            collection
        );

        let action = "upsert points";
        let response = self
            .send(
                self.request(reqwest::Method::PUT, url)
                    .json(&UpsertRequest { points: &points }),
                action,
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::into_error(response, Some(collection), action).await);
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let url = self.endpoint(&["collections", collection, "points", "search"])?;
        debug!(
            "Searching collection {} with limit {}",
            collection, limit
        );

        let action = "search";
        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
            with_vector: false,
        };
        let response = self
            .send(self.request(reqwest::Method::POST, url).json(&request), action)
            .await?;
        if !response.status().is_success() {
            return Err(Self::into_error(response, Some(collection), action).await);
        }

        let points: Vec<ScoredPoint> = Self::parse(response, action).await?;
        Ok(points.into_iter().map(SearchResult::from).collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["collections", name])?;
        info!("Deleting collection {}", name);

        let action = "delete collection";
        let response = self
            .send(self.request(reqwest::Method::DELETE, url), action)
            .await?;
        if !response.status().is_success() {
            return Err(Self::into_error(response, Some(name), action).await);
        }

        // Older servers answer 200 with `result: false` for unknown names
        let deleted: bool = Self::parse(response, action).await?;
        if !deleted {
            return Err(Error::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }
}

/// Pull `status.error` out of a Qdrant error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("status")
                .and_then(|s| s.get("error"))
                .and_then(|e| e.as_str())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Point ids are UUID strings or unsigned integers
fn point_id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer, api_key: Option<&str>) -> QdrantStore {
        QdrantStore::new(
            &server.uri(),
            api_key.map(ToString::to_string),
            Duration::from_secs(5),
        )
        .expect("store should initialize")
    }

    #[tokio::test]
    async fn test_list_collections_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .and(header("api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "collections": [{ "name": "docs" }, { "name": "notes" }] },
                "status": "ok",
                "time": 0.001
            })))
            .expect(1)
            .mount(&server)
            .await;

        let names = store(&server, Some("secret")).list_collections().await.unwrap();
        assert_eq!(names, vec!["docs", "notes"]);
    }

    #[tokio::test]
    async fn test_list_collections_404_is_not_collection_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(ResponseTemplate::new(404).set_body_string("404 page not found"))
            .mount(&server)
            .await;

        let err = store(&server, None).list_collections().await.unwrap_err();
        assert!(matches!(err, Error::Qdrant(_)));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn test_create_collection_uses_cosine() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/docs"))
            .and(body_partial_json(json!({
                "vectors": { "size": 384, "distance": "Cosine" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": true, "status": "ok", "time": 0.1
            })))
            .expect(1)
            .mount(&server)
            .await;

        store(&server, None).create_collection("docs", 384).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_existing_collection_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/docs"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "status": { "error": "Wrong input: Collection `docs` already exists!" },
                "time": 0.0
            })))
            .expect(2)
            .mount(&server)
            .await;

        let store = store(&server, None);
        let (a, b) = tokio::join!(
            store.create_collection("docs", 3),
            store.create_collection("docs", 3)
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_create_collection_legacy_bad_request_exists() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/docs"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": { "error": "Wrong input: Collection `docs` already exists!" }
            })))
            .mount(&server)
            .await;

        assert!(store(&server, None).create_collection("docs", 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_collection_other_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/docs"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": { "error": "Bad request: vector size must be positive" }
            })))
            .mount(&server)
            .await;

        let err = store(&server, None)
            .create_collection("docs", 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("vector size must be positive"));
    }

    #[tokio::test]
    async fn test_upsert_waits_and_sends_points() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("PUT"))
            .and(path("/collections/docs/points"))
            .and(query_param("wait", "true"))
            .and(body_partial_json(json!({
                "points": [{ "id": id.to_string(), "vector": [0.5, 0.25], "payload": { "text": "hi" } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "operation_id": 1, "status": "completed" }, "status": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut payload = Map::new();
        payload.insert("text".to_string(), json!("hi"));
        let point = Point {
            id,
            vector: vec![0.5, 0.25],
            payload,
        };

        store(&server, None).upsert("docs", vec![point]).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_empty_batch_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        store(&server, None).upsert("docs", Vec::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_search_parses_results_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/docs/points/search"))
            .and(body_partial_json(json!({
                "vector": [0.1, 0.2, 0.3],
                "limit": 2,
                "with_payload": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    { "id": "7b1c0c8e-2f6d-4d0c-9a57-0d4f1f0f3c11", "version": 0, "score": 0.91,
                      "payload": { "text": "first", "source": "a.md" } },
                    { "id": 42, "version": 0, "score": 0.40, "payload": null }
                ],
                "status": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = store(&server, None)
            .search("docs", &[0.1, 0.2, 0.3], 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "7b1c0c8e-2f6d-4d0c-9a57-0d4f1f0f3c11");
        assert_eq!(results[0].payload["text"], "first");
        assert_eq!(results[1].id, "42");
        assert!(results[1].payload.is_empty());
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_search_missing_collection_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/ghost/points/search"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "status": { "error": "Not found: Collection `ghost` doesn't exist!" }
            })))
            .mount(&server)
            .await;

        let err = store(&server, None)
            .search("ghost", &[0.0], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound(ref name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_delete_collection() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/collections/docs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": true, "status": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/collections/ghost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": false, "status": "ok"
            })))
            .mount(&server)
            .await;

        let store = store(&server, None);
        store.delete_collection("docs").await.unwrap();
        let err = store.delete_collection("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_collection_names_are_path_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/collections/my%20docs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": true, "status": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        store(&server, None).delete_collection("my docs").await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = store(&server, None).list_collections().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_base_url_prefix_is_kept() {
        let store =
            QdrantStore::new("https://qdrant.example.com/proxy/", None, Duration::from_secs(1))
                .unwrap();
        let url = store.endpoint(&["collections", "docs"]).unwrap();
        assert_eq!(url.as_str(), "https://qdrant.example.com/proxy/collections/docs");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"status":{"error":"boom"},"time":0}"#),
            "boom"
        );
        assert_eq!(error_message("plain failure\n"), "plain failure");
    }
}
