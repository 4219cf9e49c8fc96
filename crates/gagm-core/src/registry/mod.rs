//! Model registry: the authoritative catalog of node and edge types.
//!
//! Readers take a snapshot (`Arc<ModelCatalog>`) and never see a catalog that
//! is still being built. Loads build a fresh catalog off to the side and swap
//! it in with a single pointer store; overlapping loads queue on a mutex.

pub mod source;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::descriptor::{TypeDescriptor, TypeKind};
use crate::error::{GagmError, GagmResult};
use crate::schema::PartialSchema;
use source::{DefinitionEntry, TypeSource};

/// Immutable snapshot of all registered types.
#[derive(Debug, Default)]
pub struct ModelCatalog {
    nodes: BTreeMap<String, Arc<TypeDescriptor>>,
    edges: BTreeMap<String, Arc<TypeDescriptor>>,
    partials: HashMap<String, OnceLock<Arc<PartialSchema>>>,
    last_reload: Option<DateTime<Utc>>,
}

impl ModelCatalog {
    /// Look up a node or edge type.
    pub fn get(&self, name: &str) -> GagmResult<Arc<TypeDescriptor>> {
        self.nodes
            .get(name)
            .or_else(|| self.edges.get(name))
            .cloned()
            .ok_or_else(|| GagmError::not_found(format!("Model not found: {name}")))
    }

    /// All-optional variant of a type, derived on first use and cached for this catalog.
    pub fn get_partial(&self, name: &str) -> GagmResult<Arc<PartialSchema>> {
        let descriptor = self.get(name)?;
        let cell = self
            .partials
            .get(name)
            .ok_or_else(|| GagmError::not_found(format!("Model not found: {name}")))?;

        Ok(cell
            .get_or_init(|| {
                debug!(model = name, "Deriving partial schema");
                Arc::new(descriptor.field_schema.partial())
            })
            .clone())
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.nodes.contains_key(name) || self.edges.contains_key(name)
    }

    /// Node type names followed by edge type names.
    pub fn list_names(&self) -> Vec<String> {
        self.nodes.keys().chain(self.edges.keys()).cloned().collect()
    }

    pub fn node_types(&self) -> Vec<Arc<TypeDescriptor>> {
        self.nodes.values().cloned().collect()
    }

    pub fn edge_types(&self) -> Vec<Arc<TypeDescriptor>> {
        self.edges.values().cloned().collect()
    }

    pub fn node_type_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_reload(&self) -> Option<DateTime<Utc>> {
        self.last_reload
    }

    /// Exported JSON schema for every type.
    pub fn schemas(&self) -> GagmResult<BTreeMap<String, Value>> {
        if self.is_empty() {
            return Err(GagmError::not_found("No models found"));
        }
        Ok(self
            .nodes
            .values()
            .chain(self.edges.values())
            .map(|d| (d.name.clone(), d.json_schema()))
            .collect())
    }

    fn insert(&mut self, descriptor: TypeDescriptor) {
        let name = descriptor.name.clone();
        self.partials.insert(name.clone(), OnceLock::new());
        let map = match descriptor.kind {
            TypeKind::Node => &mut self.nodes,
            TypeKind::Edge => &mut self.edges,
        };
        map.insert(name, Arc::new(descriptor));
    }

    fn remove(&mut self, name: &str) {
        self.nodes.remove(name);
        self.edges.remove(name);
        self.partials.remove(name);
    }
}

/// Outcome of a load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub node_types: usize,
    pub edge_types: usize,
    /// One message per definition that was skipped.
    pub skipped: Vec<String>,
}

impl LoadReport {
    pub fn total(&self) -> usize {
        self.node_types + self.edge_types
    }
}

/// Process-wide type catalog, shared as an `Arc<ModelRegistry>`.
pub struct ModelRegistry {
    source: Option<Box<dyn TypeSource>>,
    catalog: RwLock<Arc<ModelCatalog>>,
    load_lock: Mutex<()>,
}

impl ModelRegistry {
    /// An empty registry with no source to reload from.
    pub fn empty() -> Self {
        Self {
            source: None,
            catalog: RwLock::new(Arc::new(ModelCatalog::default())),
            load_lock: Mutex::new(()),
        }
    }

    /// Create a registry bound to `source` and load it once.
    pub fn from_source(source: impl TypeSource + 'static) -> GagmResult<Self> {
        let registry = Self {
            source: Some(Box::new(source)),
            ..Self::empty()
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Load every definition of `source` into a fresh catalog and install it.
    ///
    /// Malformed or conflicting definitions are logged and skipped. A source
    /// that cannot be read at all leaves the current catalog in place.
    pub fn load_types(&self, source: &dyn TypeSource) -> GagmResult<LoadReport> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        info!(source = %source.describe(), "Loading models");
        let entries = source.definitions()?;
        let (mut catalog, report) = build_catalog(entries);
        catalog.last_reload = Some(Utc::now());

        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);

        info!(
            nodes = report.node_types,
            edges = report.edge_types,
            skipped = report.skipped.len(),
            "Loaded models"
        );
        Ok(report)
    }

    /// Rebuild the catalog from the registry's own source.
    pub fn reload(&self) -> GagmResult<LoadReport> {
        let source = self
            .source
            .as_deref()
            .ok_or_else(|| GagmError::Config("registry has no type source to reload from".to_string()))?;
        self.load_types(source)
    }

    /// Consistent snapshot of the current catalog.
    pub fn catalog(&self) -> Arc<ModelCatalog> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, name: &str) -> GagmResult<Arc<TypeDescriptor>> {
        self.catalog().get(name)
    }

    pub fn get_partial(&self, name: &str) -> GagmResult<Arc<PartialSchema>> {
        self.catalog().get_partial(name)
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.catalog().is_present(name)
    }

    pub fn list_names(&self) -> Vec<String> {
        self.catalog().list_names()
    }

    pub fn node_types(&self) -> Vec<Arc<TypeDescriptor>> {
        self.catalog().node_types()
    }

    pub fn edge_types(&self) -> Vec<Arc<TypeDescriptor>> {
        self.catalog().edge_types()
    }

    pub fn schemas(&self) -> GagmResult<BTreeMap<String, Value>> {
        self.catalog().schemas()
    }

    pub fn schema(&self, name: &str) -> GagmResult<Value> {
        Ok(self.get(name)?.json_schema())
    }

    pub fn last_reload(&self) -> Option<DateTime<Utc>> {
        self.catalog().last_reload()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("types", &self.list_names())
            .field("last_reload", &self.last_reload())
            .finish()
    }
}

fn build_catalog(entries: Vec<DefinitionEntry>) -> (ModelCatalog, LoadReport) {
    let mut catalog = ModelCatalog::default();
    let mut report = LoadReport::default();

    for entry in entries {
        let descriptor = match entry.and_then(|raw| raw.into_descriptor()) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "Skipping type definition");
                report.skipped.push(e.to_string());
                continue;
            }
        };

        if catalog.is_present(&descriptor.name) {
            let e = GagmError::definition(&descriptor.name, "type name is already registered");
            warn!(error = %e, "Skipping type definition");
            report.skipped.push(e.to_string());
            continue;
        }

        debug!(model = %descriptor.name, kind = %descriptor.kind, "Loaded model");
        catalog.insert(descriptor);
    }

    // Endpoint sets may only name node types.
    let bad_edges: Vec<(String, String)> = catalog
        .edges
        .values()
        .filter_map(|edge| {
            edge.origin_types
                .iter()
                .chain(edge.target_types.iter())
                .find(|t| catalog.edges.contains_key(t.as_str()))
                .map(|t| (edge.name.clone(), t.clone()))
        })
        .collect();
    for (edge, endpoint) in bad_edges {
        let e = GagmError::definition(&edge, format!("endpoint type '{endpoint}' is an edge type"));
        warn!(error = %e, "Skipping type definition");
        report.skipped.push(e.to_string());
        catalog.remove(&edge);
    }

    for edge in catalog.edges.values() {
        for endpoint in edge.origin_types.iter().chain(edge.target_types.iter()) {
            if !catalog.nodes.contains_key(endpoint) {
                warn!(edge = %edge.name, endpoint = %endpoint, "Edge type references an unregistered node type");
            }
        }
    }

    report.node_types = catalog.nodes.len();
    report.edge_types = catalog.edges.len();
    if report.total() == 0 {
        warn!("No models found.");
    }

    (catalog, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RawDefinition;
    use crate::schema::{FieldSpec, FieldType};
    use source::StaticSource;

    fn game_source() -> StaticSource {
        StaticSource::default()
            .register(RawDefinition::node("Dungeon").field(
                "max_players",
                FieldSpec::new(FieldType::Integer)
                    .with_default(serde_json::json!(1))
                    .with_range(Some(1.0), Some(5.0)),
            ))
            .register(RawDefinition::node("Checkpoint"))
            .register(RawDefinition::edge("CheckpointOfDungeon", &["Dungeon"], &["Checkpoint"]))
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = ModelRegistry::from_source(game_source()).unwrap();

        assert_eq!(
            registry.list_names(),
            vec!["Checkpoint", "Dungeon", "CheckpointOfDungeon"]
        );
        assert_eq!(registry.node_types().len(), 2);
        assert_eq!(registry.edge_types().len(), 1);
        assert!(registry.get("CheckpointOfDungeon").unwrap().is_edge());
        assert!(registry.last_reload().is_some());
        assert!(matches!(registry.get("Nope"), Err(GagmError::NotFound(_))));
        assert!(registry.get_partial("Nope").is_err());
    }

    #[test]
    fn test_name_collision_fails_only_that_entry() {
        let source = game_source()
            .register(RawDefinition::edge("Dungeon", &[], &[]))
            .register(RawDefinition::node("Enemy"));
        let registry = ModelRegistry::empty();
        let report = registry.load_types(&source).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.node_types, 3);
        assert_eq!(registry.get("Dungeon").unwrap().kind, TypeKind::Node);
        assert!(registry.is_present("Enemy"));
    }

    #[test]
    fn test_edge_endpoints_must_be_node_types() {
        let source = game_source().register(RawDefinition::edge(
            "Meta",
            &["CheckpointOfDungeon"],
            &["Dungeon"],
        ));
        let registry = ModelRegistry::empty();
        let report = registry.load_types(&source).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert!(!registry.is_present("Meta"));
    }

    #[test]
    fn test_empty_source_is_not_fatal() {
        let registry = ModelRegistry::from_source(StaticSource::default()).unwrap();
        assert!(registry.list_names().is_empty());
        assert!(registry.schemas().is_err());
    }

    #[test]
    fn test_partial_cached_per_load_cycle() {
        let registry = ModelRegistry::from_source(game_source()).unwrap();
        let first = registry.get_partial("Dungeon").unwrap();
        let second = registry.get_partial("Dungeon").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.title(), "PartialDungeon");

        registry.reload().unwrap();
        let third = registry.get_partial("Dungeon").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_reload_without_source() {
        let registry = ModelRegistry::empty();
        assert!(matches!(registry.reload(), Err(GagmError::Config(_))));
        assert!(registry.last_reload().is_none());
    }
}
