//! Schema sync command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use gagm_core::{GagmConfig, ValidationLevel};
use gagm_graph::SchemaSynchronizer;

#[derive(Args)]
pub struct SyncArgs {
    /// Store-side validation level recorded with each rule (none, new, moderate, strict)
    #[arg(long)]
    pub level: Option<String>,
}

pub async fn execute(args: SyncArgs, config: &GagmConfig) -> Result<()> {
    let level = match args.level.as_deref() {
        Some(level) => parse_level(level)?,
        None => config.sync.validation_level,
    };

    let registry = super::load_registry(config)?;
    let store = super::connect_store(config).await?;

    println!("{}", "Syncing types to the graph store...".bold());
    let result = SchemaSynchronizer::new(store)
        .with_level(level)
        .sync_all(&registry.catalog())
        .await
        .context("Schema sync failed")?;

    println!("\n{}", "Sync complete:".green().bold());
    println!("  Collections created: {}", result.collections_created);
    println!("  Schema rules applied: {}", result.rules_applied);
    println!("  Edge definitions:     {}", result.edge_definitions);
    Ok(())
}

fn parse_level(level: &str) -> Result<ValidationLevel> {
    match level.to_lowercase().as_str() {
        "none" => Ok(ValidationLevel::None),
        "new" => Ok(ValidationLevel::New),
        "moderate" => Ok(ValidationLevel::Moderate),
        "strict" => Ok(ValidationLevel::Strict),
        other => anyhow::bail!("Unknown validation level '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("Strict").unwrap(), ValidationLevel::Strict);
        assert_eq!(parse_level("none").unwrap(), ValidationLevel::None);
        assert!(parse_level("loose").is_err());
    }
}
