//! Tag commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use gagm_core::{AssetId, GagmConfig};
use gagm_graph::{TagService, Toggle};

#[derive(Subcommand)]
pub enum TagCommands {
    /// List all tags, or the tags of one asset
    List {
        /// Asset id (type/key)
        #[arg(long)]
        asset: Option<String>,
    },

    /// Create a tag
    Create {
        name: String,
    },

    /// Delete a tag and detach it from every asset
    Delete {
        name: String,
    },

    /// Attach a tag to an asset, or detach it if already attached
    Toggle {
        /// Asset id (type/key)
        asset: String,
        /// Tag name
        tag: String,
    },

    /// List assets carrying any of the given tags
    Assets {
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

pub async fn execute(cmd: TagCommands, config: &GagmConfig) -> Result<()> {
    let service = TagService::new(super::connect_adapter(config).await?);

    match cmd {
        TagCommands::List { asset: None } => {
            let tags = service.list_all_tags().await?;
            print_tags(&tags);
        }
        TagCommands::List { asset: Some(asset) } => {
            let id = AssetId::parse(&asset)?;
            let tags = service.tags_for_asset(&id).await?;
            print_tags(&tags);
        }
        TagCommands::Create { name } => {
            service.create_tag(&name).await?;
            println!("{} {}", "Tag ready:".green(), name.cyan());
        }
        TagCommands::Delete { name } => {
            if service.delete_tag(&name).await? {
                println!("{} {}", "Deleted tag".green(), name.cyan());
            } else {
                println!("{} {}", "No such tag:".yellow(), name);
            }
        }
        TagCommands::Toggle { asset, tag } => {
            let id = AssetId::parse(&asset)?;
            match service.toggle_tag(&id, &tag).await? {
                Toggle::Added => println!("{} {} → {}", "Tagged".green(), tag.cyan(), id),
                Toggle::Removed => println!("{} {} from {}", "Untagged".yellow(), tag.cyan(), id),
            }
        }
        TagCommands::Assets { tags } => {
            let assets = service.adapter().assets_by_tags(&tags).await?;
            crate::output::print_assets(&assets);
        }
    }
    Ok(())
}

fn print_tags(tags: &[String]) {
    if tags.is_empty() {
        println!("{}", "No tags.".dimmed());
        return;
    }
    for tag in tags {
        println!("  {} {}", "•".dimmed(), tag);
    }
}
