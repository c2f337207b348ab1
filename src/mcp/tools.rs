//! MCP tool definitions and handlers

use super::types::{McpError, ToolDefinition, ToolResult};
use crate::commands::{
    added_message, cmd_add_documents, cmd_delete_collection, cmd_list_collections, cmd_search,
    AddOptions, SearchOptions,
};
use crate::config::Config;
use crate::embed::ProviderKind;
use crate::pipeline::{render_results, StepGuard};
use crate::store::VectorStore;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info};

/// Everything a tool call needs
pub struct ToolContext<'a> {
    pub config: &'a Config,
    pub store: &'a dyn VectorStore,
    pub guard: StepGuard,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddDocumentsArgs {
    file_path: String,
    collection: String,
    embedding_service: String,
    #[serde(default, deserialize_with = "whole_number")]
    chunk_size: Option<usize>,
    #[serde(default, deserialize_with = "whole_number")]
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArgs {
    query: String,
    collection: String,
    embedding_service: String,
    #[serde(default, deserialize_with = "whole_number")]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct DeleteCollectionArgs {
    collection: String,
}

/// JSON numbers such as `500` or `500.0`; fractional and negative values are rejected
fn whole_number<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 => Ok(Some(n as usize)),
        Some(n) => Err(D::Error::custom(format!("expected a whole number, got {}", n))),
    }
}

fn embedding_service_schema() -> Value {
    json!({
        "type": "string",
        "enum": ProviderKind::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
        "description": "Embedding service to use"
    })
}

/// Get all available tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_collections".to_string(),
            description: "List all available Qdrant collections".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
        ToolDefinition {
            name: "add_documents".to_string(),
            description: "Add documents to a Qdrant collection with specified embedding service"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filePath": {
                        "type": "string",
                        "description": "Path to the file to process"
                    },
                    "collection": {
                        "type": "string",
                        "description": "Name of the collection to add documents to"
                    },
                    "embeddingService": embedding_service_schema(),
                    "chunkSize": {
                        "type": "number",
                        "description": "Size of text chunks in characters (optional, default 1000)"
                    },
                    "chunkOverlap": {
                        "type": "number",
                        "description": "Overlap between chunks in characters (optional, default 200)"
                    }
                },
                "required": ["filePath", "collection", "embeddingService"]
            }),
        },
        ToolDefinition {
            name: "search".to_string(),
            description: "Search for similar documents in a collection".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "collection": {
                        "type": "string",
                        "description": "Name of the collection to search in"
                    },
                    "embeddingService": embedding_service_schema(),
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of results to return (optional)"
                    }
                },
                "required": ["query", "collection", "embeddingService"]
            }),
        },
        ToolDefinition {
            name: "delete_collection".to_string(),
            description: "Delete a Qdrant collection".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Name of the collection to delete"
                    }
                },
                "required": ["collection"]
            }),
        },
    ]
}

/// Decode a tool's arguments, mapping any shape mismatch to -32602
fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Option<Value>) -> Result<T, McpError> {
    let value = arguments.unwrap_or_else(|| json!({}));
    serde_json::from_value(value)
        .map_err(|_| McpError::invalid_params(format!("Invalid arguments for {}", tool)))
}

fn parse_service(tool: &str, service: &str) -> Result<ProviderKind, McpError> {
    service
        .parse()
        .map_err(|_| McpError::invalid_params(format!("Invalid arguments for {}", tool)))
}

/// Handle a tool call.
///
/// Protocol-level problems (unknown tool, bad arguments) are returned as
/// `Err`; failures of the operation itself become an error `ToolResult`.
pub async fn handle_tool_call(
    name: &str,
    arguments: Option<Value>,
    ctx: &ToolContext<'_>,
) -> Result<ToolResult, McpError> {
    match name {
        "list_collections" => Ok(handle_list_collections(ctx).await),
        "add_documents" => {
            let args: AddDocumentsArgs = parse_args(name, arguments)?;
            let provider = parse_service(name, &args.embedding_service)?;
            Ok(handle_add_documents(args, provider, ctx).await)
        }
        "search" => {
            let args: SearchArgs = parse_args(name, arguments)?;
            let provider = parse_service(name, &args.embedding_service)?;
            Ok(handle_search(args, provider, ctx).await)
        }
        "delete_collection" => {
            let args: DeleteCollectionArgs = parse_args(name, arguments)?;
            Ok(handle_delete_collection(args, ctx).await)
        }
        _ => Err(McpError::unknown_tool(name)),
    }
}

async fn handle_list_collections(ctx: &ToolContext<'_>) -> ToolResult {
    match cmd_list_collections(ctx.store, &ctx.guard).await {
        Ok(names) => match serde_json::to_string_pretty(&names) {
            Ok(text) => ToolResult::text(text),
            Err(e) => ToolResult::error(format!("Error listing collections: {}", e)),
        },
        Err(e) => {
            error!(error = %e, "list_collections failed");
            ToolResult::error(format!("Error listing collections: {}", e))
        }
    }
}

async fn handle_add_documents(
    args: AddDocumentsArgs,
    provider: ProviderKind,
    ctx: &ToolContext<'_>,
) -> ToolResult {
    let options = AddOptions {
        file: PathBuf::from(args.file_path),
        collection: args.collection,
        provider,
        chunk_size: args.chunk_size,
        chunk_overlap: args.chunk_overlap,
    };

    match cmd_add_documents(ctx.config, ctx.store, &options, &ctx.guard).await {
        Ok(stats) => {
            info!(
                chunks = stats.chunks_stored,
                collection = %stats.collection,
                "add_documents completed"
            );
            ToolResult::text(added_message(&stats))
        }
        Err(e) => {
            error!(error = %e, "add_documents failed");
            ToolResult::error(format!("Error adding documents: {}", e))
        }
    }
}

async fn handle_search(args: SearchArgs, provider: ProviderKind, ctx: &ToolContext<'_>) -> ToolResult {
    let options = SearchOptions {
        query: args.query,
        collection: args.collection,
        provider,
        limit: args.limit,
    };

    match cmd_search(ctx.config, ctx.store, &options, &ctx.guard).await {
        Ok(results) => ToolResult::text(render_results(&results)),
        Err(e) => {
            error!(error = %e, "search failed");
            ToolResult::error(format!("Error searching: {}", e))
        }
    }
}

async fn handle_delete_collection(args: DeleteCollectionArgs, ctx: &ToolContext<'_>) -> ToolResult {
    match cmd_delete_collection(ctx.store, &args.collection, &ctx.guard).await {
        Ok(()) => ToolResult::text(format!(
            "Successfully deleted collection: {}",
            args.collection
        )),
        Err(e) => {
            error!(error = %e, "delete_collection failed");
            ToolResult::error(format!("Error deleting collection: {}", e))
        }
    }
}
