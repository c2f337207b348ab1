//! docvec - document ingestion and semantic search over Qdrant
//!
//! Documents are split into overlapping character windows, embedded with a
//! selectable provider (OpenAI, OpenRouter, Ollama or local FastEmbed) and
//! stored as points in a Qdrant collection. The same operations are exposed
//! as a CLI and as MCP tools over stdio.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod mcp;
pub mod pipeline;
pub mod store;

pub use error::{Error, ErrorKind, Result};
