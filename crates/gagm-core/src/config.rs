//! Runtime configuration.
//!
//! Values come from an optional `gagm.toml`, then environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GagmError, GagmResult};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "gagm.toml";

/// Store-side strictness of a collection's schema rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Rule is informational only; writes are never rejected.
    #[default]
    None,
    /// Only newly inserted documents are validated.
    New,
    /// New and modified documents, unless the old value was already invalid.
    Moderate,
    /// Every new and modified document.
    Strict,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::None => "none",
            ValidationLevel::New => "new",
            ValidationLevel::Moderate => "moderate",
            ValidationLevel::Strict => "strict",
        }
    }
}

/// Configuration for connecting to the graph store (Neo4j).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
    pub fetch_size: usize,
    /// Upper bound for any single store call.
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "secret".to_string(),
            database: "neo4j".to_string(),
            max_connections: 8,
            fetch_size: 200,
            timeout_secs: 10,
        }
    }
}

/// Where type manifests are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// A manifest file or a directory of `*.toml` manifests.
    pub path: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub validation_level: ValidationLevel,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GagmConfig {
    pub graph: GraphConfig,
    pub models: ModelsConfig,
    pub sync: SyncConfig,
}

impl GagmConfig {
    /// Load from `path`, or from `gagm.toml` if present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> GagmResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> GagmResult<Self> {
        debug!(path = %path.display(), "Reading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            GagmError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Override settings from `GRAPH_DB_*` and `GAGM_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(uri) = std::env::var("GRAPH_DB_URI") {
            self.graph.uri = uri;
        }
        if let Ok(user) = std::env::var("GRAPH_DB_USER") {
            self.graph.user = user;
        }
        if let Ok(password) = std::env::var("GRAPH_DB_PASS") {
            self.graph.password = password;
        }
        if let Ok(database) = std::env::var("GRAPH_DB_NAME") {
            self.graph.database = database;
        }
        if let Ok(path) = std::env::var("GAGM_MODELS_PATH") {
            self.models.path = PathBuf::from(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: GagmConfig = toml::from_str(
            r#"
[graph]
uri = "bolt://graph:7687"

[sync]
validation_level = "strict"
"#,
        )
        .unwrap();

        assert_eq!(config.graph.uri, "bolt://graph:7687");
        assert_eq!(config.graph.user, "neo4j");
        assert_eq!(config.graph.timeout_secs, 10);
        assert_eq!(config.sync.validation_level, ValidationLevel::Strict);
        assert_eq!(config.models.path, PathBuf::from("models"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = GagmConfig::load(Some(Path::new("/nonexistent/gagm.toml"))).unwrap_err();
        assert!(matches!(err, GagmError::Config(_)));
    }
}
