//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use gagm_core::{GagmConfig, ManifestSource, ModelRegistry};
use gagm_graph::{GraphAdapter, GraphStore, Neo4jStore};
use tracing::debug;

pub mod graph;
pub mod models;
pub mod sync;
pub mod tags;

/// Game asset graph manager
#[derive(Parser)]
#[command(name = "gagm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file (defaults to ./gagm.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create collections, schema rules and edge definitions for every type
    Sync(sync::SyncArgs),

    /// Inspect the type manifests
    #[command(subcommand)]
    Models(models::ModelCommands),

    /// Manage asset tags
    #[command(subcommand)]
    Tags(tags::TagCommands),

    /// Explore assets in the graph
    #[command(subcommand)]
    Graph(graph::GraphCommands),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = GagmConfig::load(self.config.as_deref()).context("Failed to load configuration")?;

        match self.command {
            Commands::Sync(args) => sync::execute(args, &config).await,
            Commands::Models(cmd) => models::execute(cmd, &config),
            Commands::Tags(cmd) => tags::execute(cmd, &config).await,
            Commands::Graph(cmd) => graph::execute(cmd, &config).await,
        }
    }
}

/// Load the model registry from the configured manifests.
pub fn load_registry(config: &GagmConfig) -> Result<Arc<ModelRegistry>> {
    let source = ManifestSource::new(config.models.path.clone());
    let registry = ModelRegistry::from_source(source).with_context(|| {
        format!("Failed to load models from {}", config.models.path.display())
    })?;
    debug!(types = registry.list_names().len(), "Model registry ready");
    Ok(Arc::new(registry))
}

/// Connect to the configured graph store.
pub async fn connect_store(config: &GagmConfig) -> Result<Arc<dyn GraphStore>> {
    let store = Neo4jStore::connect(&config.graph)
        .await
        .with_context(|| format!("Failed to connect to graph store at {}", config.graph.uri))?;
    Ok(Arc::new(store))
}

/// Registry plus store, ready for asset operations.
pub async fn connect_adapter(config: &GagmConfig) -> Result<GraphAdapter> {
    let registry = load_registry(config)?;
    let store = connect_store(config).await?;
    Ok(GraphAdapter::new(store, registry))
}
