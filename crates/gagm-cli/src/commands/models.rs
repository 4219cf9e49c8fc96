//! Type catalog commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use gagm_core::GagmConfig;

use crate::output;

#[derive(Subcommand)]
pub enum ModelCommands {
    /// List registered node and edge types
    List,

    /// Print the JSON schema of one type
    Show {
        /// Type name
        name: String,
    },
}

pub fn execute(cmd: ModelCommands, config: &GagmConfig) -> Result<()> {
    let registry = super::load_registry(config)?;

    match cmd {
        ModelCommands::List => {
            let catalog = registry.catalog();
            if catalog.is_empty() {
                println!("{}", "No models found.".dimmed());
                return Ok(());
            }
            output::print_types_table(&catalog.node_types(), &catalog.edge_types());
            if let Some(loaded) = catalog.last_reload() {
                println!("\n{} {}", "Loaded at".dimmed(), loaded.to_rfc3339().dimmed());
            }
            Ok(())
        }
        ModelCommands::Show { name } => {
            let schema = registry.schema(&name)?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}
