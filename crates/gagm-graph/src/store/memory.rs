//! In-process graph store.
//!
//! Keeps collections, edge definitions and schema rules in memory with the
//! same observable semantics as the Neo4j store: unique keys per collection,
//! endpoint definitions enforced on edge writes, cascading vertex deletes.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use gagm_core::AssetId;

use super::{
    document_id, endpoints, CollectionKind, Direction, Document, EdgeDefinition, GraphStore, Hop,
    StoreError, StoreResult, ValidationRule,
};

#[derive(Debug)]
struct Collection {
    kind: CollectionKind,
    rule: Option<ValidationRule>,
    docs: BTreeMap<String, Document>,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    edge_definitions: BTreeMap<String, EdgeDefinition>,
}

impl State {
    fn contains(&self, id: &AssetId) -> bool {
        self.collections
            .get(id.type_name())
            .is_some_and(|c| c.docs.contains_key(id.key()))
    }

    fn check_edge(&self, collection: &str, doc: &Document) -> StoreResult<()> {
        let (from, to) = endpoints(doc)
            .ok_or_else(|| StoreError::Backend(format!("edge in '{collection}' lacks _from/_to")))?;
        for endpoint in [&from, &to] {
            let is_vertex = self
                .collections
                .get(endpoint.type_name())
                .is_some_and(|c| c.kind == CollectionKind::Vertex);
            if !is_vertex || !self.contains(endpoint) {
                return Err(StoreError::NotFound(format!("vertex '{endpoint}' not found")));
            }
        }
        if let Some(def) = self.edge_definitions.get(collection) {
            def.check(&from, &to)?;
        }
        Ok(())
    }

    /// Every edge touching `vertex`, with the vertex on the other side.
    fn incident(&self, vertex: &AssetId, direction: Direction) -> Vec<(Document, AssetId)> {
        let vertex = vertex.to_string();
        let mut out = Vec::new();
        for collection in self.collections.values() {
            if collection.kind != CollectionKind::Edge {
                continue;
            }
            for doc in collection.docs.values() {
                let Some((from, to)) = endpoints(doc) else { continue };
                let outbound = from.to_string() == vertex;
                let inbound = to.to_string() == vertex;
                match direction {
                    Direction::Outbound if outbound => out.push((doc.clone(), to)),
                    Direction::Inbound if inbound => out.push((doc.clone(), from)),
                    Direction::Any if outbound => out.push((doc.clone(), to)),
                    Direction::Any if inbound => out.push((doc.clone(), from)),
                    _ => {}
                }
            }
        }
        out
    }

    fn get(&self, id: &AssetId) -> Option<&Document> {
        self.collections.get(id.type_name())?.docs.get(id.key())
    }
}

/// Graph store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema rule currently attached to a collection.
    pub fn rule(&self, collection: &str) -> Option<ValidationRule> {
        self.read()
            .collections
            .get(collection)
            .and_then(|c| c.rule.clone())
    }

    /// The endpoint definition currently attached to an edge collection.
    pub fn edge_definition(&self, collection: &str) -> Option<EdgeDefinition> {
        self.read().edge_definitions.get(collection).cloned()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.read()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn collection_kind(&self, name: &str) -> StoreResult<Option<CollectionKind>> {
        Ok(self.read().collections.get(name).map(|c| c.kind))
    }

    async fn create_collection(&self, name: &str, kind: CollectionKind) -> StoreResult<()> {
        let mut state = self.write();
        if state.collections.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        state.collections.insert(
            name.to_string(),
            Collection {
                kind,
                rule: None,
                docs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn configure_schema(&self, name: &str, rule: &ValidationRule) -> StoreResult<()> {
        let mut state = self.write();
        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("collection '{name}'")))?;
        collection.rule = Some(rule.clone());
        Ok(())
    }

    async fn delete_edge_definition(&self, collection: &str) -> StoreResult<bool> {
        Ok(self.write().edge_definitions.remove(collection).is_some())
    }

    async fn create_edge_definition(&self, definition: &EdgeDefinition) -> StoreResult<()> {
        let mut state = self.write();
        match state.collections.get(&definition.collection) {
            Some(c) if c.kind == CollectionKind::Edge => {}
            Some(_) => {
                return Err(StoreError::Constraint(format!(
                    "'{}' is not an edge collection",
                    definition.collection
                )));
            }
            None => {
                return Err(StoreError::NotFound(format!(
                    "collection '{}'",
                    definition.collection
                )));
            }
        }
        if state.edge_definitions.contains_key(&definition.collection) {
            return Err(StoreError::AlreadyExists(definition.collection.clone()));
        }
        state
            .edge_definitions
            .insert(definition.collection.clone(), definition.clone());
        Ok(())
    }

    async fn get_document(&self, id: &AssetId) -> StoreResult<Option<Document>> {
        Ok(self.read().get(id).cloned())
    }

    async fn insert_document(&self, collection: &str, mut doc: Document) -> StoreResult<Document> {
        let mut state = self.write();
        let kind = state
            .collections
            .get(collection)
            .map(|c| c.kind)
            .ok_or_else(|| StoreError::NotFound(format!("collection '{collection}'")))?;

        let key = match doc.get("_key") {
            Some(Value::String(key)) if !key.is_empty() => key.clone(),
            _ => return Err(StoreError::Backend("document has no '_key'".to_string())),
        };
        let id = AssetId::new(collection, key.as_str());
        doc.insert("_id".into(), Value::String(id.to_string()));

        if kind == CollectionKind::Edge {
            state.check_edge(collection, &doc)?;
        }

        let docs = &mut state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(format!("collection '{collection}'")))?
            .docs;
        if docs.contains_key(&key) {
            return Err(StoreError::DuplicateKey(id.to_string()));
        }
        docs.insert(key, doc.clone());
        Ok(doc)
    }

    async fn replace_document(&self, id: &AssetId, mut doc: Document) -> StoreResult<Option<Document>> {
        let mut state = self.write();
        let Some(kind) = state.collections.get(id.type_name()).map(|c| c.kind) else {
            return Ok(None);
        };
        if !state.contains(id) {
            return Ok(None);
        }

        doc.insert("_id".into(), Value::String(id.to_string()));
        doc.insert("_key".into(), Value::String(id.key().to_string()));
        if kind == CollectionKind::Edge {
            state.check_edge(id.type_name(), &doc)?;
        }

        if let Some(collection) = state.collections.get_mut(id.type_name()) {
            if !doc.contains_key("notes") {
                if let Some(notes) = collection.docs.get(id.key()).and_then(|old| old.get("notes")) {
                    doc.insert("notes".into(), notes.clone());
                }
            }
            collection.docs.insert(id.key().to_string(), doc.clone());
        }
        Ok(Some(doc))
    }

    async fn update_document(&self, id: &AssetId, patch: Document) -> StoreResult<Option<Document>> {
        let mut state = self.write();
        let Some(doc) = state
            .collections
            .get_mut(id.type_name())
            .and_then(|c| c.docs.get_mut(id.key()))
        else {
            return Ok(None);
        };
        for (field, value) in patch {
            if !matches!(field.as_str(), "_id" | "_key" | "_from" | "_to") {
                doc.insert(field, value);
            }
        }
        Ok(Some(doc.clone()))
    }

    async fn delete_document(&self, id: &AssetId) -> StoreResult<bool> {
        let mut state = self.write();
        let Some(kind) = state.collections.get(id.type_name()).map(|c| c.kind) else {
            return Ok(false);
        };

        let removed = state
            .collections
            .get_mut(id.type_name())
            .and_then(|c| c.docs.remove(id.key()))
            .is_some();

        if removed && kind == CollectionKind::Vertex {
            let target = id.to_string();
            for collection in state.collections.values_mut() {
                if collection.kind == CollectionKind::Edge {
                    collection.docs.retain(|_, edge| {
                        edge.get("_from").and_then(Value::as_str) != Some(target.as_str())
                            && edge.get("_to").and_then(Value::as_str) != Some(target.as_str())
                    });
                }
            }
        }
        Ok(removed)
    }

    async fn all_documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.read()
            .collections
            .get(collection)
            .map(|c| c.docs.values().cloned().collect())
            .ok_or_else(|| StoreError::NotFound(format!("collection '{collection}'")))
    }

    async fn traverse(
        &self,
        start: &AssetId,
        direction: Direction,
        max_depth: u32,
    ) -> StoreResult<Vec<Hop>> {
        let state = self.read();
        if !state.contains(start) {
            return Ok(Vec::new());
        }

        let mut hops = Vec::new();
        let mut seen_edges: HashSet<String> = HashSet::new();
        let mut expanded: HashSet<AssetId> = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([(start.clone(), 0u32)]);

        while let Some((vertex, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for (edge, other) in state.incident(&vertex, direction) {
                let Some(edge_id) = document_id(&edge) else { continue };
                if !seen_edges.insert(edge_id.to_string()) {
                    continue;
                }
                let Some(reached) = state.get(&other) else { continue };
                hops.push(Hop {
                    depth: depth + 1,
                    edge,
                    vertex: reached.clone(),
                });
                if expanded.insert(other.clone()) {
                    queue.push_back((other, depth + 1));
                }
            }
        }
        Ok(hops)
    }
}
