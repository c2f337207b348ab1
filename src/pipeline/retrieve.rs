//! Semantic search and result formatting

use super::StepGuard;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::store::{SearchResult, VectorStore};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

/// A similarity search against one collection
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub collection: String,
    /// Falls back to the configured default when unset
    pub limit: Option<usize>,
}

/// One displayable hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    /// 1-based position in the store's ordering
    pub rank: usize,
    pub score: f32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormattedResult {
    Hit(ResultEntry),
    NoResults,
}

/// Embed the query, search the collection and format the hits
pub async fn retrieve(
    request: &SearchRequest,
    default_limit: usize,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    guard: &StepGuard,
) -> Result<Vec<FormattedResult>> {
    let limit = request.limit.unwrap_or(default_limit);
    if limit == 0 {
        return Err(Error::Config("Search limit must be at least 1".to_string()));
    }

    let mut vectors = guard
        .run("embedding", embedder.embed(vec![request.query.clone()]))
        .await?;
    let vector = vectors
        .pop()
        .filter(|_| vectors.is_empty())
        .ok_or_else(|| Error::Embedding("Expected exactly one query embedding".to_string()))?;

    guard.check()?;
    let hits = guard
        .run("search", store.search(&request.collection, &vector, limit))
        .await?;
    info!(
        "Found {} results in collection {}",
        hits.len(),
        request.collection
    );

    if hits.is_empty() {
        return Ok(vec![FormattedResult::NoResults]);
    }

    Ok(hits
        .iter()
        .enumerate()
        .map(|(i, hit)| FormattedResult::Hit(format_result(i + 1, hit)))
        .collect())
}

/// Pull the display text and source out of a hit's payload
pub fn format_result(rank: usize, hit: &SearchResult) -> ResultEntry {
    let text = non_empty_str(&hit.payload, "text")
        .or_else(|| non_empty_str(&hit.payload, "content"))
        .map(ToString::to_string)
        .unwrap_or_else(|| Value::Object(hit.payload.clone()).to_string());

    let source = non_empty_str(&hit.payload, "source")
        .or_else(|| {
            hit.payload
                .get("metadata")
                .and_then(Value::as_object)
                .and_then(|m| non_empty_str(m, "source"))
        })
        .map(ToString::to_string);

    ResultEntry {
        rank,
        score: round_score(hit.score),
        text,
        source,
    }
}

/// Scores are reported to two decimal places
fn round_score(score: f32) -> f32 {
    (score * 100.0).round() / 100.0
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Render results as the plain-text block returned to users
pub fn render_results(results: &[FormattedResult]) -> String {
    let mut out = String::new();

    for result in results {
        if let FormattedResult::Hit(entry) = result {
            out.push_str(&format!(
                "Result {} (Score: {:.2}):\n{}\n",
                entry.rank, entry.score, entry.text
            ));
            if let Some(source) = &entry.source {
                out.push_str(&format!("Source: {}\n", source));
            }
            out.push('\n');
        }
    }

    if out.is_empty() {
        out.push_str("No results found.");
    }
    out
}
