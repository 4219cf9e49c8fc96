//! Typed asset access over a graph store.
//!
//! Store documents are resolved through the model registry: the id prefix
//! names the type, the payload is validated against that type's schema, and
//! the result is a typed [`Asset`]. Writes run the same validation first.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use gagm_core::{
    Asset, AssetId, GagmError, GagmResult, ModelRegistry, TypeDescriptor, TAG_COLLECTION,
    TAG_EDGE_COLLECTION,
};

use crate::store::{document_id, Direction, Document, GraphStore, StoreError};
use crate::tags::tag_key;

/// Registry-aware adapter; cheap to clone and share.
#[derive(Clone)]
pub struct GraphAdapter {
    store: Arc<dyn GraphStore>,
    registry: Arc<ModelRegistry>,
}

impl GraphAdapter {
    pub fn new(store: Arc<dyn GraphStore>, registry: Arc<ModelRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Build a typed asset from a store document.
    ///
    /// The id prefix must name a registered type and the payload must pass
    /// that type's schema.
    pub fn resolve(&self, doc: Document) -> GagmResult<Asset> {
        let id = document_id(&doc)
            .ok_or_else(|| GagmError::Store("document has no valid '_id'".to_string()))?;
        let descriptor = self.descriptor_for(&id)?;

        let mut asset = Asset::from_document(doc)?;
        asset.fields = descriptor.field_schema.validate(&asset.fields)?;
        if descriptor.is_edge() != asset.is_edge() {
            return Err(GagmError::validation(format!(
                "'{id}' does not match its {} type '{}'",
                descriptor.kind, descriptor.name
            )));
        }
        Ok(asset)
    }

    /// `None` when the asset does not exist; unknown types are `NotFound`.
    pub async fn get_by_id(&self, type_name: &str, key: &str) -> GagmResult<Option<Asset>> {
        self.registry.get(type_name)?;
        self.load(&AssetId::new(type_name, key)).await
    }

    /// Like [`get_by_id`](Self::get_by_id), addressed by full id; unknown prefixes are `UnknownType`.
    pub async fn get(&self, id: &AssetId) -> GagmResult<Option<Asset>> {
        self.descriptor_for(id)?;
        self.load(id).await
    }

    pub async fn list_by_type(&self, type_name: &str) -> GagmResult<Vec<Asset>> {
        self.registry.get(type_name)?;
        let docs = match self.store.all_documents(type_name).await {
            Ok(docs) => docs,
            // Registered but never synced.
            Err(StoreError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        docs.into_iter().map(|doc| self.resolve(doc)).collect()
    }

    /// Assets one hop away in either direction, tag overlay excluded.
    pub async fn neighbors(&self, id: &AssetId) -> GagmResult<Vec<Asset>> {
        self.descriptor_for(id)?;

        let mut found = BTreeMap::new();
        for hop in self.store.traverse(id, Direction::Any, 1).await? {
            if hop.edge_in(TAG_EDGE_COLLECTION) {
                continue;
            }
            let asset = self.resolve(hop.vertex)?;
            found.entry(asset.id.clone()).or_insert(asset);
        }
        debug!(asset = %id, count = found.len(), "Resolved neighbors");
        Ok(found.into_values().collect())
    }

    /// Edges whose both endpoints are in `node_ids`, tag edges excluded.
    pub async fn edges_between(&self, node_ids: &[AssetId]) -> GagmResult<Vec<Asset>> {
        let members: BTreeSet<&AssetId> = node_ids.iter().collect();

        let mut edges = BTreeMap::new();
        for id in &members {
            for hop in self.store.traverse(id, Direction::Outbound, 1).await? {
                if hop.edge_in(TAG_EDGE_COLLECTION) {
                    continue;
                }
                let reached = hop.vertex_id();
                if !reached.as_ref().is_some_and(|v| members.contains(v)) {
                    continue;
                }
                let edge = self.resolve(hop.edge)?;
                edges.entry(edge.id.clone()).or_insert(edge);
            }
        }
        Ok(edges.into_values().collect())
    }

    /// The first non-tag edge going from `origin` to `target`.
    pub async fn connection(&self, origin: &AssetId, target: &AssetId) -> GagmResult<Option<Asset>> {
        for hop in self.store.traverse(origin, Direction::Outbound, 1).await? {
            if hop.edge_in(TAG_EDGE_COLLECTION) || hop.vertex_id().as_ref() != Some(target) {
                continue;
            }
            return self.resolve(hop.edge).map(Some);
        }
        Ok(None)
    }

    /// Validate and insert a new asset; the store reports key collisions.
    pub async fn create(&self, asset: &Asset) -> GagmResult<Asset> {
        let prepared = self.prepare(asset)?;
        let stored = self
            .store
            .insert_document(prepared.type_name(), prepared.to_document())
            .await?;
        info!(asset = %prepared.id, "Created asset");
        self.resolve(stored)
    }

    /// Replace an existing asset's fields; stored notes are left alone.
    pub async fn update(&self, asset: &Asset) -> GagmResult<Asset> {
        let prepared = self.prepare(asset)?;
        self.replace(prepared).await
    }

    /// Apply a partial field update.
    ///
    /// `fields` is checked against the type's partial schema and merged onto
    /// the stored fields (`null` removes a field); the merged payload must
    /// then pass the full schema before the asset is replaced.
    pub async fn patch(&self, id: &AssetId, fields: &Map<String, Value>) -> GagmResult<Asset> {
        let partial = self.registry.catalog().get_partial(id.type_name()).map_err(|e| {
            if e.is_not_found() {
                GagmError::UnknownType(id.type_name().to_string())
            } else {
                e
            }
        })?;
        let changes = partial.validate(fields)?;

        let mut asset = self
            .load(id)
            .await?
            .ok_or_else(|| GagmError::not_found(format!("Asset not found: {id}")))?;
        for (name, value) in changes {
            if value.is_null() {
                asset.fields.remove(&name);
            } else {
                asset.fields.insert(name, value);
            }
        }

        let prepared = self.prepare(&asset)?;
        self.replace(prepared).await
    }

    /// Delete an asset; nodes take their incident edges with them.
    pub async fn delete(&self, id: &AssetId) -> GagmResult<bool> {
        let deleted = self.store.delete_document(id).await?;
        if deleted {
            info!(asset = %id, "Deleted asset");
        }
        Ok(deleted)
    }

    pub async fn exists(&self, id: &AssetId) -> GagmResult<bool> {
        Ok(self.store.get_document(id).await?.is_some())
    }

    pub async fn get_notes(&self, id: &AssetId) -> GagmResult<String> {
        let doc = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| GagmError::not_found(format!("Asset not found: {id}")))?;
        Ok(doc
            .get("notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Overwrite an asset's notes; returns the stored text.
    pub async fn set_notes(&self, id: &AssetId, notes: &str) -> GagmResult<String> {
        let mut patch = Document::new();
        patch.insert("notes".into(), Value::String(notes.to_string()));
        let doc = self
            .store
            .update_document(id, patch)
            .await?
            .ok_or_else(|| GagmError::not_found(format!("Asset not found: {id}")))?;
        Ok(doc
            .get("notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Union of the node assets carrying any of `tag_names`.
    pub async fn assets_by_tags(&self, tag_names: &[String]) -> GagmResult<Vec<Asset>> {
        let mut found = BTreeMap::new();
        for name in tag_names {
            let tag_id = AssetId::new(TAG_COLLECTION, tag_key(name)?);
            for hop in self.store.traverse(&tag_id, Direction::Outbound, 1).await? {
                if !hop.edge_in(TAG_EDGE_COLLECTION) {
                    continue;
                }
                let asset = self.resolve(hop.vertex)?;
                found.entry(asset.id.clone()).or_insert(asset);
            }
        }
        Ok(found.into_values().collect())
    }

    async fn load(&self, id: &AssetId) -> GagmResult<Option<Asset>> {
        match self.store.get_document(id).await? {
            Some(doc) => self.resolve(doc).map(Some),
            None => Ok(None),
        }
    }

    async fn replace(&self, asset: Asset) -> GagmResult<Asset> {
        let mut doc = asset.to_document();
        // Notes only change through set_notes.
        doc.remove("notes");
        let stored = self
            .store
            .replace_document(&asset.id, doc)
            .await?
            .ok_or_else(|| GagmError::not_found(format!("Asset not found: {}", asset.id)))?;
        debug!(asset = %asset.id, "Replaced asset");
        self.resolve(stored)
    }

    /// Schema-check an outgoing asset and apply field defaults.
    fn prepare(&self, asset: &Asset) -> GagmResult<Asset> {
        let descriptor = self.registry.get(asset.type_name())?;
        asset.id.check_key()?;

        let mut prepared = asset.clone();
        prepared.fields = descriptor.field_schema.validate(&asset.fields)?;

        match (&prepared.link, descriptor.is_edge()) {
            (Some(link), true) => {
                if !descriptor.allows_origin(link.origin_id.type_name()) {
                    return Err(GagmError::constraint(format!(
                        "'{}' may not originate a '{}' edge",
                        link.origin_id, descriptor.name
                    )));
                }
                if !descriptor.allows_target(link.target_id.type_name()) {
                    return Err(GagmError::constraint(format!(
                        "'{}' may not be the target of a '{}' edge",
                        link.target_id, descriptor.name
                    )));
                }
            }
            (None, false) => {}
            (Some(_), false) => {
                return Err(GagmError::validation(format!(
                    "'{}' is a node type and cannot carry endpoints",
                    descriptor.name
                )))
            }
            (None, true) => {
                return Err(GagmError::validation(format!(
                    "'{}' is an edge type and needs origin and target ids",
                    descriptor.name
                )))
            }
        }
        Ok(prepared)
    }

    fn descriptor_for(&self, id: &AssetId) -> GagmResult<Arc<TypeDescriptor>> {
        self.registry
            .get(id.type_name())
            .map_err(|_| GagmError::UnknownType(id.type_name().to_string()))
    }
}

impl std::fmt::Debug for GraphAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphAdapter")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
