//! Configuration management for docvec
//!
//! Handles loading, saving, and validating configuration from TOML files,
//! and resolving per-provider embedding settings against the environment.

mod defaults;

pub use defaults::*;

use crate::chunk::ChunkSettings;
use crate::embed::ProviderKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant REST URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Default chunking settings (requests may override either value)
    #[serde(default)]
    pub chunk: ChunkSettings,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Timeouts for remote calls
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Embedding provider settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of results when a search does not specify a limit
    #[serde(default = "default_query_limit")]
    pub default_limit: usize,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per HTTP request
    #[serde(default = "default_request_timeout")]
    pub request_secs: u64,

    /// Per pipeline step (embedding, collection check, upsert, search)
    #[serde(default = "default_step_timeout")]
    pub step_secs: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }
}

/// Settings for every known provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub openrouter: ProviderConfig,
    #[serde(default)]
    pub ollama: ProviderConfig,
    #[serde(default)]
    pub fastembed: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::OpenRouter => &self.openrouter,
            ProviderKind::Ollama => &self.ollama,
            ProviderKind::FastEmbed => &self.fastembed,
        }
    }
}

/// Settings for one provider; unset fields fall back to environment, then defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Model name/identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Vector size, required for models missing from the built-in table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Texts per embedding request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

/// Provider settings after merging config file, environment and defaults
#[derive(Debug, Clone)]
pub struct ResolvedProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub request_timeout: Duration,
}

/// Lookup the expected embedding dimension for a known model
pub fn embedding_dimension_for_model(model: &str) -> Option<usize> {
    // Ollama tags ("nomic-embed-text:latest") and OpenRouter vendor prefixes
    let model = model.split(':').next().unwrap_or(model);
    let model = model.strip_prefix("openai/").unwrap_or(model);

    match model {
        "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "text-embedding-ada-002" => Some(1536),
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" => Some(1024),
        "all-minilm" => Some(384),
        "bge-m3" => Some(1024),
        "snowflake-arctic-embed" => Some(1024),
        "BAAI/bge-small-en" | "BAAI/bge-small-en-v1.5" => Some(384),
        "BAAI/bge-base-en-v1.5" => Some(768),
        "BAAI/bge-large-en-v1.5" => Some(1024),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(384),
        _ => None,
    }
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for docvec data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            chunk: ChunkSettings::default(),
            query: QueryConfig::default(),
            timeouts: TimeoutConfig::default(),
            providers: ProvidersConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_query_limit(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: default_request_timeout(),
            step_secs: default_step_timeout(),
        }
    }
}

impl Config {
    /// Get the default base directory for docvec (~/.docvec)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docvec")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            base_dir: base,
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load an explicitly named file, or the default file when it exists,
    /// falling back to built-in defaults plus environment
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load(path);
        }

        let default_path = Self::default_config_path();
        if default_path.exists() {
            return Self::load(&default_path);
        }

        debug!("No config file found, using defaults");
        let mut config = Config::default();
        config.init_paths(None);
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `QDRANT_URL` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides with an explicit lookup; the environment
    /// wins over the file, as in `resolve_provider_with`
    pub fn apply_env_overrides_with<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = env("QDRANT_URL").filter(|v| !v.trim().is_empty()) {
            debug!("Using QDRANT_URL from environment: {}", url);
            self.qdrant_url = url;
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        if self.qdrant_api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.qdrant_api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Resolve settings for a provider using the process environment
    pub fn resolve_provider(&self, kind: ProviderKind) -> Result<ResolvedProviderConfig> {
        self.resolve_provider_with(kind, |name| std::env::var(name).ok())
    }

    /// Resolve settings for a provider with an explicit environment lookup.
    ///
    /// Precedence: `<PREFIX>_ENDPOINT` / `<PREFIX>_MODEL` from the environment,
    /// then the `[providers.<id>]` table, then built-in defaults.
    pub fn resolve_provider_with<F>(
        &self,
        kind: ProviderKind,
        env: F,
    ) -> Result<ResolvedProviderConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = self.providers.get(kind);
        let prefix = kind.env_prefix();
        let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let api_key_env = settings
            .api_key_env
            .clone()
            .unwrap_or_else(|| default_api_key_env(kind));
        let api_key = lookup(&api_key_env);

        let endpoint = lookup(&format!("{}_ENDPOINT", prefix))
            .or_else(|| settings.endpoint.clone())
            .unwrap_or_else(|| default_provider_endpoint(kind).to_string());

        let model = lookup(&format!("{}_MODEL", prefix))
            .or_else(|| settings.model.clone())
            .unwrap_or_else(|| default_provider_model(kind).to_string());

        let dimension = match settings.dimension {
            Some(0) => {
                return Err(Error::Config(format!(
                    "providers.{}.dimension must be > 0",
                    kind
                )))
            }
            Some(dimension) => dimension,
            None => embedding_dimension_for_model(&model).ok_or_else(|| {
                Error::Config(format!(
                    "Unknown vector size for model '{}'; set providers.{}.dimension",
                    model, kind
                ))
            })?,
        };

        let batch_size = match settings.batch_size {
            Some(0) => {
                return Err(Error::Config(format!(
                    "providers.{}.batch_size must be > 0",
                    kind
                )))
            }
            Some(size) => size,
            None => default_embedding_batch_size(),
        };

        Ok(ResolvedProviderConfig {
            kind,
            api_key,
            endpoint,
            model,
            dimension,
            batch_size,
            request_timeout: self.timeouts.request(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;

        if self.query.default_limit == 0 {
            return Err(Error::Config(
                "query.default_limit must be > 0".to_string(),
            ));
        }

        if self.timeouts.request_secs == 0 || self.timeouts.step_secs == 0 {
            return Err(Error::Config(
                "timeouts.request_secs and timeouts.step_secs must be > 0".to_string(),
            ));
        }

        url::Url::parse(&self.qdrant_url)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.qdrant_api_key_env, "QDRANT_API_KEY");
        assert_eq!(config.chunk.chunk_size, 1000);
        assert_eq!(config.chunk.chunk_overlap, 200);
        assert_eq!(config.query.default_limit, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.query.default_limit = 3;
        config.providers.ollama.model = Some("mxbai-embed-large".to_string());

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(loaded.query.default_limit, 3);
        assert_eq!(
            loaded.providers.ollama.model.as_deref(),
            Some("mxbai-embed-large")
        );
        assert_eq!(loaded.paths.base_dir, tmp.path());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "qdrant_url = \"http://qdrant:6333\"\n[chunk]\nchunk_size = 400\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.qdrant_url, "http://qdrant:6333");
        assert_eq!(config.chunk.chunk_size, 400);
        assert_eq!(config.chunk.chunk_overlap, 200);
        assert_eq!(config.timeouts.step_secs, 30);
    }

    #[test]
    fn test_qdrant_url_env_overrides_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.save().unwrap();

        let saved = std::fs::read_to_string(&config.paths.config_file).unwrap();
        assert!(saved.contains("qdrant_url = \"http://localhost:6333\""));

        let mut loaded = Config::load(&config.paths.config_file).unwrap();
        loaded.apply_env_overrides_with(env_from(&[("QDRANT_URL", "http://remote-qdrant:6333")]));
        assert_eq!(loaded.qdrant_url, "http://remote-qdrant:6333");

        loaded.apply_env_overrides_with(env_from(&[("QDRANT_URL", " ")]));
        assert_eq!(loaded.qdrant_url, "http://remote-qdrant:6333");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = Config::load(&tmp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.chunk.chunk_overlap = config.chunk.chunk_size;
        assert!(config.validate().is_err());

        config.chunk.chunk_overlap = 100;
        assert!(config.validate().is_ok());

        config.query.default_limit = 0;
        assert!(config.validate().is_err());
        config.query.default_limit = 5;

        config.timeouts.step_secs = 0;
        assert!(config.validate().is_err());
        config.timeouts.step_secs = 10;

        config.qdrant_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_provider_defaults() {
        let config = Config::default();
        let resolved = config
            .resolve_provider_with(ProviderKind::OpenAi, env_from(&[]))
            .unwrap();

        assert_eq!(resolved.endpoint, "https://api.openai.com/v1");
        assert_eq!(resolved.model, "text-embedding-3-small");
        assert_eq!(resolved.dimension, 1536);
        assert_eq!(resolved.batch_size, 96);
        assert!(resolved.api_key.is_none());
    }

    #[test]
    fn test_resolve_provider_env_overrides() {
        let mut config = Config::default();
        config.providers.ollama.endpoint = Some("http://from-file:11434".to_string());

        let resolved = config
            .resolve_provider_with(
                ProviderKind::Ollama,
                env_from(&[
                    ("OLLAMA_ENDPOINT", "http://gpu-box:11434"),
                    ("OLLAMA_MODEL", "mxbai-embed-large:latest"),
                ]),
            )
            .unwrap();

        assert_eq!(resolved.endpoint, "http://gpu-box:11434");
        assert_eq!(resolved.model, "mxbai-embed-large:latest");
        assert_eq!(resolved.dimension, 1024);
    }

    #[test]
    fn test_resolve_provider_custom_key_env() {
        let mut config = Config::default();
        config.providers.openrouter.api_key_env = Some("MY_ROUTER_KEY".to_string());

        let resolved = config
            .resolve_provider_with(
                ProviderKind::OpenRouter,
                env_from(&[("MY_ROUTER_KEY", "sk-or-123"), ("OPENROUTER_API_KEY", "ignored")]),
            )
            .unwrap();

        assert_eq!(resolved.api_key.as_deref(), Some("sk-or-123"));
        assert_eq!(resolved.dimension, 1536);
    }

    #[test]
    fn test_blank_api_key_is_treated_as_missing() {
        let config = Config::default();
        let resolved = config
            .resolve_provider_with(ProviderKind::OpenAi, env_from(&[("OPENAI_API_KEY", "  ")]))
            .unwrap();
        assert!(resolved.api_key.is_none());
    }

    #[test]
    fn test_unknown_model_requires_dimension() {
        let mut config = Config::default();
        config.providers.openai.model = Some("custom-embedder".to_string());

        let err = config
            .resolve_provider_with(ProviderKind::OpenAi, env_from(&[]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        config.providers.openai.dimension = Some(512);
        let resolved = config
            .resolve_provider_with(ProviderKind::OpenAi, env_from(&[]))
            .unwrap();
        assert_eq!(resolved.dimension, 512);
    }

    #[test]
    fn test_model_dimensions() {
        assert_eq!(embedding_dimension_for_model("BAAI/bge-small-en"), Some(384));
        assert_eq!(
            embedding_dimension_for_model("openai/text-embedding-3-large"),
            Some(3072)
        );
        assert_eq!(
            embedding_dimension_for_model("nomic-embed-text:latest"),
            Some(768)
        );
        assert_eq!(embedding_dimension_for_model("unknown-model"), None);
    }
}
