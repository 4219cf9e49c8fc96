//! Asset graph exploration commands.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use gagm_core::{AssetId, GagmConfig};
use gagm_graph::{FilterMode, GraphFilter, GraphViews};

use crate::output;

#[derive(Subcommand)]
pub enum GraphCommands {
    /// Show one asset
    Show {
        /// Asset id (type/key)
        id: String,
    },

    /// List the assets of a type
    List {
        type_name: String,
    },

    /// Assets one hop away from an asset
    Neighbors {
        /// Asset id (type/key)
        id: String,
    },

    /// Print the whole graph, or a filtered part of it, as JSON
    Export {
        /// Tags to filter on
        #[arg(long)]
        tag: Vec<String>,
        /// Keep nodes carrying the tags instead of excluding them
        #[arg(long)]
        include_tags: bool,
        /// Node types to filter on
        #[arg(long = "type")]
        types: Vec<String>,
        /// Keep only the listed types instead of excluding them
        #[arg(long)]
        include_types: bool,
    },
}

pub async fn execute(cmd: GraphCommands, config: &GagmConfig) -> Result<()> {
    let adapter = super::connect_adapter(config).await?;

    match cmd {
        GraphCommands::Show { id } => {
            let id = AssetId::parse(&id)?;
            match adapter.get(&id).await? {
                Some(asset) => output::print_asset(&asset),
                None => println!("{} {}", "Asset not found:".red(), id),
            }
        }
        GraphCommands::List { type_name } => {
            let assets = adapter.list_by_type(&type_name).await?;
            output::print_assets(&assets);
        }
        GraphCommands::Neighbors { id } => {
            let id = AssetId::parse(&id)?;
            println!("{} {}", "Neighbors of".bold(), id.to_string().cyan());
            println!("{}", "─".repeat(50));
            let assets = adapter.neighbors(&id).await?;
            output::print_assets(&assets);
        }
        GraphCommands::Export {
            tag,
            include_tags,
            types,
            include_types,
        } => {
            let filter = GraphFilter {
                tags: tag.into_iter().collect::<BTreeSet<_>>(),
                tag_mode: mode(include_tags),
                types: types.into_iter().collect::<BTreeSet<_>>(),
                type_mode: mode(include_types),
            };
            let views = GraphViews::new(adapter);
            let view = if filter == GraphFilter::default() {
                views.full_graph().await?
            } else {
                views.filtered_graph(&filter).await?
            };
            let json = serde_json::to_string_pretty(&view).context("Failed to render graph")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn mode(include: bool) -> FilterMode {
    if include {
        FilterMode::Include
    } else {
        FilterMode::Exclude
    }
}
