//! Schema synchronization: reconcile store collections with the model catalog.
//!
//! Every registered type gets a collection named after it with the type's
//! JSON-schema rule; edge types also get their endpoint definition, which is
//! always recreated so it tracks the current catalog. The reserved tag overlay
//! (`AssetTag`, `TagEdge`) is synced last so `TagEdge` can target every node type.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use gagm_core::{
    GagmError, GagmResult, ModelCatalog, TypeDescriptor, ValidationLevel, TAG_COLLECTION,
    TAG_EDGE_COLLECTION,
};

use crate::store::{CollectionKind, EdgeDefinition, GraphStore, StoreError, ValidationRule};

/// Result of a sync operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub collections_created: usize,
    pub rules_applied: usize,
    pub edge_definitions: usize,
}

impl SyncResult {
    fn merge(&mut self, other: &SyncResult) {
        self.collections_created += other.collections_created;
        self.rules_applied += other.rules_applied;
        self.edge_definitions += other.edge_definitions;
    }
}

/// Pushes catalog types into a graph store.
#[derive(Clone)]
pub struct SchemaSynchronizer {
    store: Arc<dyn GraphStore>,
    level: ValidationLevel,
}

impl SchemaSynchronizer {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            level: ValidationLevel::default(),
        }
    }

    /// Store-side strictness recorded with every rule.
    pub fn with_level(mut self, level: ValidationLevel) -> Self {
        self.level = level;
        self
    }

    /// Sync every node type, then every edge type, then the tag overlay.
    pub async fn sync_all(&self, catalog: &ModelCatalog) -> GagmResult<SyncResult> {
        info!(types = catalog.len(), level = self.level.as_str(), "Starting schema sync");
        let mut total = SyncResult::default();

        for descriptor in catalog.node_types() {
            total.merge(&self.sync_node_type(&descriptor).await?);
        }
        for descriptor in catalog.edge_types() {
            total.merge(&self.sync_edge_type(&descriptor).await?);
        }
        total.merge(&self.sync_tag_overlay(&catalog.node_type_names()).await?);

        info!(
            collections_created = total.collections_created,
            rules_applied = total.rules_applied,
            edge_definitions = total.edge_definitions,
            "Schema sync complete"
        );
        Ok(total)
    }

    pub async fn sync_node_type(&self, descriptor: &TypeDescriptor) -> GagmResult<SyncResult> {
        let mut result = SyncResult::default();
        if self.ensure_collection(&descriptor.name, CollectionKind::Vertex).await? {
            result.collections_created += 1;
        }
        self.apply_rule(&descriptor.name, self.rule_for(descriptor)).await?;
        result.rules_applied += 1;
        Ok(result)
    }

    pub async fn sync_edge_type(&self, descriptor: &TypeDescriptor) -> GagmResult<SyncResult> {
        let mut result = SyncResult::default();
        if self.ensure_collection(&descriptor.name, CollectionKind::Edge).await? {
            result.collections_created += 1;
        }
        self.replace_edge_definition(EdgeDefinition::new(
            descriptor.name.as_str(),
            descriptor.origin_types.clone(),
            descriptor.target_types.clone(),
        ))
        .await?;
        result.edge_definitions += 1;

        self.apply_rule(&descriptor.name, self.rule_for(descriptor)).await?;
        result.rules_applied += 1;
        Ok(result)
    }

    /// Ensure the tag collections; `TagEdge` may point at any of `node_type_names`.
    pub async fn sync_tag_overlay(&self, node_type_names: &[String]) -> GagmResult<SyncResult> {
        let mut result = SyncResult::default();

        if self.ensure_collection(TAG_COLLECTION, CollectionKind::Vertex).await? {
            result.collections_created += 1;
        }
        let tag_rule = json!({
            "type": "object",
            "title": TAG_COLLECTION,
            "properties": {"name": {"type": "string"}},
            "required": ["name"],
        });
        self.apply_rule(TAG_COLLECTION, ValidationRule::new(tag_rule, self.level))
            .await?;
        result.rules_applied += 1;

        if self.ensure_collection(TAG_EDGE_COLLECTION, CollectionKind::Edge).await? {
            result.collections_created += 1;
        }
        self.replace_edge_definition(EdgeDefinition::new(
            TAG_EDGE_COLLECTION,
            vec![TAG_COLLECTION.to_string()],
            node_type_names.to_vec(),
        ))
        .await?;
        result.edge_definitions += 1;

        let edge_rule = json!({
            "type": "object",
            "title": TAG_EDGE_COLLECTION,
            "properties": {"tag_name": {"type": "string"}},
            "required": ["tag_name"],
        });
        self.apply_rule(TAG_EDGE_COLLECTION, ValidationRule::new(edge_rule, self.level))
            .await?;
        result.rules_applied += 1;

        debug!(targets = node_type_names.len(), "Tag overlay synced");
        Ok(result)
    }

    fn rule_for(&self, descriptor: &TypeDescriptor) -> ValidationRule {
        let mut rule = ValidationRule::new(descriptor.json_schema(), self.level);
        if let Some(description) = descriptor.description() {
            rule.message = format!("{description}: {}", ValidationRule::DEFAULT_MESSAGE);
        }
        rule
    }

    /// Returns whether the collection was created.
    async fn ensure_collection(&self, name: &str, kind: CollectionKind) -> GagmResult<bool> {
        match self.store.collection_kind(name).await? {
            Some(existing) if existing == kind => return Ok(false),
            Some(existing) => {
                return Err(GagmError::constraint(format!(
                    "collection '{name}' exists as a {} collection, expected {}",
                    existing.as_str(),
                    kind.as_str()
                )))
            }
            None => {}
        }

        match self.store.create_collection(name, kind).await {
            Ok(()) => {
                info!(collection = name, kind = kind.as_str(), "Created collection");
                Ok(true)
            }
            // Lost a race with a concurrent sync.
            Err(StoreError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_rule(&self, name: &str, rule: ValidationRule) -> GagmResult<()> {
        self.store.configure_schema(name, &rule).await?;
        debug!(collection = name, level = rule.level.as_str(), "Applied schema rule");
        Ok(())
    }

    async fn replace_edge_definition(&self, definition: EdgeDefinition) -> GagmResult<()> {
        if self.store.delete_edge_definition(&definition.collection).await? {
            debug!(collection = %definition.collection, "Dropped edge definition");
        }
        match self.store.create_edge_definition(&definition).await {
            Ok(()) | Err(StoreError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use gagm_core::{ModelRegistry, RawDefinition, StaticSource};

    fn registry() -> ModelRegistry {
        ModelRegistry::from_source(
            StaticSource::default()
                .register(RawDefinition::node("Dungeon").described("A playable dungeon"))
                .register(RawDefinition::node("Checkpoint"))
                .register(RawDefinition::edge(
                    "CheckpointOfDungeon",
                    &["Dungeon"],
                    &["Checkpoint"],
                )),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sync_all_creates_everything() {
        let store = Arc::new(MemoryStore::new());
        let sync = SchemaSynchronizer::new(store.clone()).with_level(ValidationLevel::Strict);

        let result = sync.sync_all(&registry().catalog()).await.unwrap();
        // three types plus the two tag collections
        assert_eq!(result.collections_created, 5);
        assert_eq!(result.rules_applied, 5);
        assert_eq!(result.edge_definitions, 2);

        let rule = store.rule("Dungeon").unwrap();
        assert_eq!(rule.level, ValidationLevel::Strict);
        assert_eq!(rule.rule["title"], "Dungeon");
        assert!(rule.message.starts_with("A playable dungeon"));

        let def = store.edge_definition("CheckpointOfDungeon").unwrap();
        assert_eq!(def.from, vec!["Dungeon"]);
        assert_eq!(def.to, vec!["Checkpoint"]);

        let tag_def = store.edge_definition(TAG_EDGE_COLLECTION).unwrap();
        assert_eq!(tag_def.from, vec![TAG_COLLECTION]);
        assert_eq!(tag_def.to, vec!["Checkpoint", "Dungeon"]);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let sync = SchemaSynchronizer::new(store.clone());
        let registry = registry();

        sync.sync_all(&registry.catalog()).await.unwrap();
        let second = sync.sync_all(&registry.catalog()).await.unwrap();
        assert_eq!(second.collections_created, 0);
        assert_eq!(second.edge_definitions, 2);
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_collection("Dungeon", CollectionKind::Edge)
            .await
            .unwrap();
        let sync = SchemaSynchronizer::new(store);

        let err = sync.sync_all(&registry().catalog()).await.unwrap_err();
        assert!(matches!(err, GagmError::Constraint(_)));
    }
}
