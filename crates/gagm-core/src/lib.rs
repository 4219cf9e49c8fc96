//! GAGM Core Library
//!
//! Type descriptors, field schemas, assets and the model registry for the
//! game asset graph.

pub mod asset;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod schema;

pub use asset::{Asset, AssetId, Link};
pub use config::{GagmConfig, GraphConfig, ValidationLevel};
pub use descriptor::{
    RawDefinition, TypeDescriptor, TypeKind, TAG_COLLECTION, TAG_EDGE_COLLECTION,
};
pub use error::{GagmError, GagmResult};
pub use registry::source::{ManifestSource, StaticSource, TypeSource};
pub use registry::{LoadReport, ModelCatalog, ModelRegistry};
pub use schema::{FieldSchema, FieldSpec, FieldType, PartialSchema};
