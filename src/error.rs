//! Custom error types for docvec

use thiserror::Error;

/// Main error type for docvec operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Timed out during {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("MCP protocol error: {0}")]
    McpProtocol(String),
}

/// Coarse classification used by callers deciding how to report a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad settings or missing credentials; never worth retrying
    Configuration,
    /// Network failure, timeout or non-success status from a remote service
    Transport,
    /// The targeted collection does not exist
    NotFound,
    Cancelled,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::UrlParse(_) | Error::TomlParse(_) => {
                ErrorKind::Configuration
            }
            Error::Qdrant(_) | Error::Embedding(_) | Error::Http(_) | Error::Timeout(_) => {
                ErrorKind::Transport
            }
            Error::CollectionNotFound(_) => ErrorKind::NotFound,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlSerialize(_)
            | Error::McpProtocol(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for docvec
pub type Result<T> = std::result::Result<T, Error>;
