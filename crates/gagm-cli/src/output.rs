//! Terminal output formatting.

use std::sync::Arc;

use colored::Colorize;
use gagm_core::{Asset, TypeDescriptor};

/// Print node and edge types as a table.
pub fn print_types_table(nodes: &[Arc<TypeDescriptor>], edges: &[Arc<TypeDescriptor>]) {
    println!("{:<28} {:<6} {:<8} {}", "Name", "Kind", "Fields", "Endpoints");
    println!("{}", "-".repeat(80));

    for node in nodes {
        println!(
            "{:<28} {:<6} {:<8} {}",
            node.name.cyan(),
            "node",
            node.field_schema.fields.len(),
            "".dimmed()
        );
    }
    for edge in edges {
        println!(
            "{:<28} {:<6} {:<8} {} → {}",
            edge.name.magenta(),
            "edge",
            edge.field_schema.fields.len(),
            endpoint_set(&edge.origin_types),
            endpoint_set(&edge.target_types)
        );
    }
}

/// Print a single asset with its fields.
pub fn print_asset(asset: &Asset) {
    println!("{}", asset.id.to_string().cyan().bold());
    if let (Some(origin), Some(target)) = (asset.origin_id(), asset.target_id()) {
        println!("{}: {} → {}", "Link".bold(), origin, target);
    }
    if !asset.notes.is_empty() {
        println!("{}: {}", "Notes".bold(), asset.notes);
    }
    for (name, value) in &asset.fields {
        println!("  {}: {}", name.dimmed(), value);
    }
}

/// Print assets one per line.
pub fn print_assets(assets: &[Asset]) {
    if assets.is_empty() {
        println!("{}", "No assets found.".dimmed());
        return;
    }
    for asset in assets {
        match (asset.origin_id(), asset.target_id()) {
            (Some(origin), Some(target)) => println!(
                "  {} {} ({} → {})",
                "→".dimmed(),
                asset.id.to_string().magenta(),
                origin,
                target
            ),
            _ => println!("  {} {}", "•".dimmed(), asset.id.to_string().cyan()),
        }
    }
    println!("\n{} assets.", assets.len().to_string().bold());
}

fn endpoint_set(types: &[String]) -> String {
    if types.is_empty() {
        "*".to_string()
    } else {
        types.join("|")
    }
}
