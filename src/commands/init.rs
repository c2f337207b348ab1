//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub config_path: PathBuf,
    pub force: bool,
}

/// Write a default configuration file, returning its path
pub fn cmd_init(options: InitOptions) -> Result<PathBuf> {
    let InitOptions { config_path, force } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(config_path.parent().map(|p| p.to_path_buf()));
    config.paths.config_file = config_path.clone();
    config.validate()?;
    config.save()?;

    Ok(config_path)
}

/// Print init summary to console
pub fn print_init_summary(config_path: &std::path::Path) {
    println!("✓ Initialized docvec config at {}", config_path.display());
    println!("\nNext steps:");
    println!("  export OPENAI_API_KEY=...                                  # or use ollama / fastembed");
    println!("  docvec add ./notes.md --collection notes --provider openai  # Index a file");
    println!("  docvec search \"how to use X\" --collection notes --provider openai");
    println!("  docvec serve                                               # Run the MCP server");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let written = cmd_init(InitOptions {
            config_path: path.clone(),
            force: false,
        })
        .unwrap();

        assert_eq!(written, path);
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.chunk.chunk_size, 1000);
        assert_eq!(loaded.chunk.chunk_overlap, 200);
        assert_eq!(loaded.paths.config_file, path);
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "qdrant_url = \"http://qdrant:6333\"\n").unwrap();

        let err = cmd_init(InitOptions {
            config_path: path.clone(),
            force: false,
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        cmd_init(InitOptions {
            config_path: path.clone(),
            force: true,
        })
        .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[chunk]"));
    }
}
