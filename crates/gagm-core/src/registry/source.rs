//! Type-definition sources.
//!
//! Types are data: they come from TOML manifests on disk or from an explicit
//! in-code list, never from loading code at runtime.
//!
//! ```toml
//! [[types]]
//! name = "Dungeon"
//! kind = "node"
//! description = "A dungeon instance."
//!
//! [types.fields.max_players]
//! type = "integer"
//! default = 1
//! minimum = 1
//! maximum = 5
//!
//! [[types]]
//! name = "CheckpointOfDungeon"
//! kind = "edge"
//! origin_types = ["Dungeon"]
//! target_types = ["Checkpoint"]
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::descriptor::RawDefinition;
use crate::error::{GagmError, GagmResult};

/// One entry read from a source; malformed entries carry their error.
pub type DefinitionEntry = GagmResult<RawDefinition>;

/// An enumerable set of type definitions.
pub trait TypeSource: Send + Sync {
    /// Human-readable origin of the definitions, for logs.
    fn describe(&self) -> String;

    /// Read every definition.
    ///
    /// An `Err` means the source as a whole could not be read; per-entry
    /// problems are returned inside the vector so the load can skip them.
    fn definitions(&self) -> GagmResult<Vec<DefinitionEntry>>;
}

/// Definitions from a TOML manifest file or a directory of `*.toml` manifests.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the `[[types]]` entries of one manifest document.
    pub fn parse_manifest(content: &str) -> GagmResult<Vec<DefinitionEntry>> {
        let table: toml::Table = content.parse()?;

        let entries = match table.get("types") {
            None => Vec::new(),
            Some(toml::Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(GagmError::Config("'types' must be an array of tables".to_string()));
            }
        };

        Ok(entries
            .into_iter()
            .map(|item| {
                let name = item
                    .get("name")
                    .and_then(toml::Value::as_str)
                    .unwrap_or("<unnamed>")
                    .to_string();
                item.try_into::<RawDefinition>()
                    .map_err(|e| GagmError::definition(name, e.to_string()))
            })
            .collect())
    }

    fn manifest_files(&self) -> GagmResult<Vec<PathBuf>> {
        if !self.path.is_dir() {
            return Ok(vec![self.path.clone()]);
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl TypeSource for ManifestSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn definitions(&self) -> GagmResult<Vec<DefinitionEntry>> {
        let mut all = Vec::new();
        for file in self.manifest_files()? {
            debug!(file = %file.display(), "Reading type manifest");
            let content = std::fs::read_to_string(&file)?;
            let entries = Self::parse_manifest(&content).map_err(|e| {
                GagmError::Config(format!("Failed to parse manifest {}: {}", file.display(), e))
            })?;
            all.extend(entries);
        }
        Ok(all)
    }
}

/// Definitions registered explicitly in code.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    definitions: Vec<RawDefinition>,
}

impl StaticSource {
    pub fn new(definitions: Vec<RawDefinition>) -> Self {
        Self { definitions }
    }

    pub fn register(mut self, definition: RawDefinition) -> Self {
        self.definitions.push(definition);
        self
    }
}

impl TypeSource for StaticSource {
    fn describe(&self) -> String {
        format!("static ({} definitions)", self.definitions.len())
    }

    fn definitions(&self) -> GagmResult<Vec<DefinitionEntry>> {
        Ok(self.definitions.iter().cloned().map(Ok).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[[types]]
name = "Dungeon"
kind = "node"

[types.fields.max_players]
type = "integer"
default = 1
minimum = 1
maximum = 5

[[types]]
name = "Broken"

[[types]]
name = "CheckpointOfDungeon"
kind = "edge"
origin_types = ["Dungeon"]
target_types = ["Checkpoint"]
"#;

    #[test]
    fn test_parse_manifest_keeps_bad_entries_separate() {
        let entries = ManifestSource::parse_manifest(MANIFEST).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_ok());
        assert!(matches!(&entries[1], Err(GagmError::Definition { name, .. }) if name == "Broken"));

        let edge = entries[2].as_ref().unwrap();
        assert_eq!(edge.origin_types, vec!["Dungeon".to_string()]);
    }

    #[test]
    fn test_unparsable_manifest_is_source_error() {
        assert!(ManifestSource::parse_manifest("[[types]\nname = ").is_err());
    }

    #[test]
    fn test_directory_scan_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.toml"),
            "[[types]]\nname = \"Checkpoint\"\nkind = \"node\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.toml"),
            "[[types]]\nname = \"Dungeon\"\nkind = \"node\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "not a manifest").unwrap();

        let names: Vec<String> = ManifestSource::new(dir.path())
            .definitions()
            .unwrap()
            .into_iter()
            .map(|e| e.unwrap().name)
            .collect();
        assert_eq!(names, vec!["Dungeon", "Checkpoint"]);
    }
}
