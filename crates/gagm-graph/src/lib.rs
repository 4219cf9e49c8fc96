//! # GAGM Graph
//!
//! Typed persistence of game assets in a graph store.
//!
//! Provides the store contract with in-memory and Neo4j backends, schema
//! synchronization from the model registry, the registry-aware adapter, the
//! tag overlay and whole-graph views.

pub mod adapter;
pub mod store;
pub mod sync;
pub mod tags;
pub mod view;

pub use adapter::GraphAdapter;
pub use store::{
    CollectionKind, Direction, Document, EdgeDefinition, GraphStore, Hop, MemoryStore,
    Neo4jStore, StoreError, StoreResult, ValidationRule,
};
pub use sync::{SchemaSynchronizer, SyncResult};
pub use tags::{decode_tag_key, tag_edge_key, tag_key, TagService, Toggle};
pub use view::{FilterMode, GraphFilter, GraphView, GraphViews};
