//! Graph store contract.
//!
//! A document-oriented graph store: named vertex and edge collections,
//! documents addressed by `{collection}/{key}`, edge endpoint definitions,
//! schema rules, and breadth-first traversal.

pub mod memory;
pub mod neo4j;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use gagm_core::{AssetId, GagmError, ValidationLevel};

pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;

/// A raw store record: `_id`, `_key`, optional `_from`/`_to`, `notes` and fields.
pub type Document = Map<String, Value>;

/// Store-level error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Collection already exists: {0}")]
    AlreadyExists(String),

    #[error("Unique constraint violated: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Edge definition violated: {0}")]
    Constraint(String),

    #[error("Store did not respond: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for GagmError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateKey(msg) => GagmError::DuplicateKey(msg),
            StoreError::NotFound(msg) => GagmError::NotFound(msg),
            StoreError::Constraint(msg) => GagmError::Constraint(msg),
            StoreError::Unavailable(msg) => GagmError::StoreUnavailable(msg),
            other @ (StoreError::AlreadyExists(_) | StoreError::Backend(_)) => {
                GagmError::Store(other.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Vertex,
    Edge,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Vertex => "vertex",
            CollectionKind::Edge => "edge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vertex" => Some(Self::Vertex),
            "edge" => Some(Self::Edge),
            _ => None,
        }
    }
}

/// Schema-validation rule attached to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub rule: Value,
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationRule {
    pub const DEFAULT_MESSAGE: &'static str =
        "The provided data doesn't pass the schema validation.";

    pub fn new(rule: Value, level: ValidationLevel) -> Self {
        Self {
            rule,
            level,
            message: Self::DEFAULT_MESSAGE.to_string(),
        }
    }
}

/// Allowed endpoint collections of an edge collection; empty means any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub collection: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

impl EdgeDefinition {
    pub fn new(collection: impl Into<String>, from: Vec<String>, to: Vec<String>) -> Self {
        Self {
            collection: collection.into(),
            from,
            to,
        }
    }

    /// Check an edge's endpoints against this definition.
    pub fn check(&self, from: &AssetId, to: &AssetId) -> StoreResult<()> {
        if !self.from.is_empty() && !self.from.iter().any(|c| c == from.type_name()) {
            return Err(StoreError::Constraint(format!(
                "'{}' is not a valid origin collection for '{}'",
                from.type_name(),
                self.collection
            )));
        }
        if !self.to.is_empty() && !self.to.iter().any(|c| c == to.type_name()) {
            return Err(StoreError::Constraint(format!(
                "'{}' is not a valid target collection for '{}'",
                to.type_name(),
                self.collection
            )));
        }
        Ok(())
    }
}

/// Traversal direction relative to the start vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
    Any,
}

/// One step of a breadth-first traversal: the edge taken and the vertex reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub depth: u32,
    pub edge: Document,
    pub vertex: Document,
}

impl Hop {
    pub fn edge_id(&self) -> Option<AssetId> {
        document_id(&self.edge)
    }

    pub fn vertex_id(&self) -> Option<AssetId> {
        document_id(&self.vertex)
    }

    /// Whether the edge belongs to `collection`.
    pub fn edge_in(&self, collection: &str) -> bool {
        self.edge_id().is_some_and(|id| id.type_name() == collection)
    }
}

/// Parse the `_id` of a document.
pub fn document_id(doc: &Document) -> Option<AssetId> {
    doc.get("_id")
        .and_then(Value::as_str)
        .and_then(|id| AssetId::parse(id).ok())
}

/// Parse the `_from`/`_to` endpoints of an edge document.
pub(crate) fn endpoints(doc: &Document) -> Option<(AssetId, AssetId)> {
    let from = doc.get("_from").and_then(Value::as_str)?;
    let to = doc.get("_to").and_then(Value::as_str)?;
    Some((AssetId::parse(from).ok()?, AssetId::parse(to).ok()?))
}

/// Operations the registry-backed layers need from a graph store.
///
/// Implementations report "already exists" on collection creation as
/// `StoreError::AlreadyExists` and key collisions on insert as
/// `StoreError::DuplicateKey`; callers rely on both for idempotence.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Kind of an existing collection, if any.
    async fn collection_kind(&self, name: &str) -> StoreResult<Option<CollectionKind>>;

    async fn has_collection(&self, name: &str) -> StoreResult<bool> {
        Ok(self.collection_kind(name).await?.is_some())
    }

    async fn create_collection(&self, name: &str, kind: CollectionKind) -> StoreResult<()>;

    async fn configure_schema(&self, name: &str, rule: &ValidationRule) -> StoreResult<()>;

    /// Returns whether a definition existed.
    async fn delete_edge_definition(&self, collection: &str) -> StoreResult<bool>;

    async fn create_edge_definition(&self, definition: &EdgeDefinition) -> StoreResult<()>;

    async fn get_document(&self, id: &AssetId) -> StoreResult<Option<Document>>;

    /// Insert a document carrying `_key` (and `_from`/`_to` for edges); returns the stored document.
    async fn insert_document(&self, collection: &str, doc: Document) -> StoreResult<Document>;

    /// Replace a document wholesale; `None` if it does not exist.
    ///
    /// Stored `notes` survive unless `doc` carries its own.
    async fn replace_document(&self, id: &AssetId, doc: Document) -> StoreResult<Option<Document>>;

    /// Atomically merge `patch` into a document, leaving `_id`, `_key`,
    /// `_from` and `_to` untouched; `None` if it does not exist.
    async fn update_document(&self, id: &AssetId, patch: Document) -> StoreResult<Option<Document>>;

    /// Delete a document; deleting a vertex also removes its incident edges.
    async fn delete_document(&self, id: &AssetId) -> StoreResult<bool>;

    async fn all_documents(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Breadth-first traversal up to `max_depth`; an unknown start yields no hops.
    async fn traverse(&self, start: &AssetId, direction: Direction, max_depth: u32)
        -> StoreResult<Vec<Hop>>;
}
