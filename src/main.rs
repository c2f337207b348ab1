//! docvec CLI entry point

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use docvec::{
    commands::{
        cmd_add_documents, cmd_delete_collection, cmd_init, cmd_list_collections, cmd_search,
        print_add_stats, print_collections, print_init_summary, print_search_results, AddOptions,
        InitOptions, SearchOptions,
    },
    config::Config,
    embed::ProviderKind,
    error::Error,
    mcp::McpServer,
    pipeline::StepGuard,
    store::QdrantStore,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docvec")]
#[command(version, about = "Document ingestion and semantic search over Qdrant, with an MCP server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio
    Serve,

    /// List collections
    Collections,

    /// Chunk, embed and store a text file
    Add {
        /// File to ingest (UTF-8 text)
        file: PathBuf,

        /// Target collection (created on first use)
        #[arg(long)]
        collection: String,

        /// Embedding provider
        #[arg(short, long, value_enum)]
        provider: ProviderKind,

        /// Characters per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by adjacent chunks
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Search a collection
    Search {
        /// The search query
        query: String,

        /// Collection to search
        #[arg(long)]
        collection: String,

        /// Embedding provider (must match the one used to add documents)
        #[arg(short, long, value_enum)]
        provider: ProviderKind,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete a collection and all its points
    Delete {
        /// Collection to delete
        collection: String,

        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries MCP frames and command output
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Handle completions command (doesn't need config/store)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "docvec", &mut std::io::stdout());
        return Ok(());
    }

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);
        let path = cmd_init(InitOptions {
            config_path: config_path.clone(),
            force,
        })
        .with_context(|| format!("Failed to initialize {}", config_path.display()))?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&json!({ "config": path }))?);
        } else {
            print_init_summary(&path);
        }
        return Ok(());
    }

    let config =
        Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    let store = QdrantStore::connect(&config)
        .with_context(|| format!("Failed to connect to Qdrant at {}", config.qdrant_url))?;

    let shutdown = CancellationToken::new();
    spawn_ctrl_c_handler(shutdown.clone());
    let guard = StepGuard::from_config(&config, shutdown.clone());

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Serve => {
            let server = McpServer::new(config, Arc::new(store), shutdown);
            server.run().await?;
        }

        Commands::Collections => {
            let collections = cmd_list_collections(&store, &guard).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&collections)?);
            } else {
                print_collections(&collections);
            }
        }

        Commands::Add {
            file,
            collection,
            provider,
            chunk_size,
            chunk_overlap,
        } => {
            let options = AddOptions {
                file,
                collection,
                provider,
                chunk_size,
                chunk_overlap,
            };
            let stats = cmd_add_documents(&config, &store, &options, &guard).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_add_stats(&stats);
            }
        }

        Commands::Search {
            query,
            collection,
            provider,
            limit,
        } => {
            let options = SearchOptions {
                query,
                collection,
                provider,
                limit,
            };
            let results = cmd_search(&config, &store, &options, &guard).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_search_results(&results);
            }
        }

        Commands::Delete { collection, yes } => {
            if !yes {
                return Err(Error::Config(format!(
                    "Refusing to delete collection '{}' without --yes",
                    collection
                ))
                .into());
            }

            cmd_delete_collection(&store, &collection, &guard).await?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "deleted": collection }))?
                );
            } else {
                println!("✓ Successfully deleted collection: {}", collection);
            }
        }
    }

    Ok(())
}

/// Cancel `token` on the first Ctrl-C
fn spawn_ctrl_c_handler(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, cancelling");
                token.cancel();
            }
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
    });
}
