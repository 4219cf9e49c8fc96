use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use gagm_core::{
    Asset, AssetId, FieldSpec, FieldType, GagmError, ModelRegistry, RawDefinition, StaticSource,
    TAG_EDGE_COLLECTION,
};
use gagm_graph::{
    CollectionKind, Direction, Document, EdgeDefinition, FilterMode, GraphAdapter, GraphFilter,
    GraphStore, GraphViews, Hop, MemoryStore, SchemaSynchronizer, StoreResult, TagService, Toggle,
    ValidationRule,
};

fn game_source() -> StaticSource {
    StaticSource::default()
        .register(
            RawDefinition::node("Dungeon").field(
                "max_players",
                FieldSpec::new(FieldType::Integer)
                    .with_default(json!(1))
                    .with_range(Some(1.0), Some(5.0)),
            ),
        )
        .register(RawDefinition::node("Checkpoint"))
        .register(RawDefinition::node("Enemy"))
        .register(RawDefinition::edge(
            "CheckpointOfDungeon",
            &["Dungeon"],
            &["Checkpoint"],
        ))
        .register(RawDefinition::edge("Guards", &["Enemy"], &[]))
}

struct World {
    store: Arc<MemoryStore>,
    adapter: GraphAdapter,
    tags: TagService,
}

async fn world() -> World {
    let registry = Arc::new(ModelRegistry::from_source(game_source()).unwrap());
    let store = Arc::new(MemoryStore::new());
    SchemaSynchronizer::new(store.clone())
        .sync_all(&registry.catalog())
        .await
        .unwrap();
    let adapter = GraphAdapter::new(store.clone(), registry);
    World {
        store,
        tags: TagService::new(adapter.clone()),
        adapter,
    }
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn id(raw: &str) -> AssetId {
    AssetId::parse(raw).unwrap()
}

async fn seed(world: &World) {
    let adapter = &world.adapter;
    adapter
        .create(&Asset::node("Dungeon", "d1", fields(json!({"max_players": 4}))))
        .await
        .unwrap();
    adapter
        .create(&Asset::node("Checkpoint", "c1", Map::new()))
        .await
        .unwrap();
    adapter
        .create(&Asset::node("Checkpoint", "c2", Map::new()))
        .await
        .unwrap();
    adapter
        .create(&Asset::node("Enemy", "goblin", Map::new()))
        .await
        .unwrap();
    adapter
        .create(&Asset::edge(
            "CheckpointOfDungeon",
            "e1",
            id("Dungeon/d1"),
            id("Checkpoint/c1"),
            Map::new(),
        ))
        .await
        .unwrap();
    adapter
        .create(&Asset::edge(
            "Guards",
            "g1",
            id("Enemy/goblin"),
            id("Checkpoint/c2"),
            Map::new(),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn dungeon_checkpoint_scenario() {
    let world = world().await;
    seed(&world).await;
    let adapter = &world.adapter;

    let neighbors = adapter.neighbors(&id("Dungeon/d1")).await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].id, id("Checkpoint/c1"));

    let edges = adapter
        .edges_between(&[id("Dungeon/d1"), id("Checkpoint/c1")])
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].id, id("CheckpointOfDungeon/e1"));
    assert_eq!(edges[0].origin_id(), Some(&id("Dungeon/d1")));

    let link = adapter
        .connection(&id("Dungeon/d1"), &id("Checkpoint/c1"))
        .await
        .unwrap();
    assert_eq!(link.map(|e| e.id), Some(id("CheckpointOfDungeon/e1")));
    assert!(adapter
        .connection(&id("Checkpoint/c1"), &id("Dungeon/d1"))
        .await
        .unwrap()
        .is_none());

    // Reversed endpoints violate the edge type.
    let err = adapter
        .create(&Asset::edge(
            "CheckpointOfDungeon",
            "bad",
            id("Checkpoint/c1"),
            id("Dungeon/d1"),
            Map::new(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, GagmError::Constraint(_)));

    let dungeons = adapter.list_by_type("Dungeon").await.unwrap();
    assert_eq!(dungeons.len(), 1);
    assert_eq!(dungeons[0].fields["max_players"], 4);
}

#[tokio::test]
async fn duplicate_key_is_reported_by_store() {
    let world = world().await;
    seed(&world).await;

    let err = world
        .adapter
        .create(&Asset::node("Checkpoint", "c1", Map::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, GagmError::DuplicateKey(_)));
}

#[tokio::test]
async fn edge_to_missing_node_is_not_found() {
    let world = world().await;
    seed(&world).await;

    let err = world
        .adapter
        .create(&Asset::edge(
            "CheckpointOfDungeon",
            "e2",
            id("Dungeon/d1"),
            id("Checkpoint/ghost"),
            Map::new(),
        ))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let world = world().await;
    let asset = Asset::node("Dungeon", "d9", fields(json!({"max_players": 2, "theme": "ice"})))
        .with_notes("unused level");

    let created = world.adapter.create(&asset).await.unwrap();
    let loaded = world
        .adapter
        .get_by_id("Dungeon", "d9")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created, loaded);
    assert_eq!(loaded, asset);
}

#[tokio::test]
async fn update_requires_existing_asset() {
    let world = world().await;
    seed(&world).await;

    let updated = world
        .adapter
        .update(&Asset::node("Dungeon", "d1", Map::new()))
        .await
        .unwrap();
    // Full replace: omitted fields fall back to their defaults.
    assert_eq!(updated.fields["max_players"], 1);

    let err = world
        .adapter
        .update(&Asset::node("Dungeon", "nope", Map::new()))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn tag_toggle_is_symmetric() {
    let world = world().await;
    seed(&world).await;
    let tags = &world.tags;
    let d1 = id("Dungeon/d1");

    assert_eq!(tags.toggle_tag(&d1, "boss").await.unwrap(), Toggle::Added);
    assert_eq!(tags.tags_for_asset(&d1).await.unwrap(), vec!["boss"]);
    assert_eq!(tags.list_all_tags().await.unwrap(), vec!["boss"]);

    assert_eq!(tags.toggle_tag(&d1, "boss").await.unwrap(), Toggle::Removed);
    assert!(tags.tags_for_asset(&d1).await.unwrap().is_empty());
    // The tag itself outlives its last edge.
    assert_eq!(tags.list_all_tags().await.unwrap(), vec!["boss"]);

    // Tagging never shows up as a neighbor.
    tags.toggle_tag(&d1, "boss").await.unwrap();
    let neighbors = world.adapter.neighbors(&d1).await.unwrap();
    assert_eq!(neighbors.len(), 1);
}

/// Answers tag-edge lookups as if another caller toggled right after the read.
struct StaleTagEdges {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl GraphStore for StaleTagEdges {
    async fn collection_kind(&self, name: &str) -> StoreResult<Option<CollectionKind>> {
        self.inner.collection_kind(name).await
    }

    async fn create_collection(&self, name: &str, kind: CollectionKind) -> StoreResult<()> {
        self.inner.create_collection(name, kind).await
    }

    async fn configure_schema(&self, name: &str, rule: &ValidationRule) -> StoreResult<()> {
        self.inner.configure_schema(name, rule).await
    }

    async fn delete_edge_definition(&self, collection: &str) -> StoreResult<bool> {
        self.inner.delete_edge_definition(collection).await
    }

    async fn create_edge_definition(&self, definition: &EdgeDefinition) -> StoreResult<()> {
        self.inner.create_edge_definition(definition).await
    }

    async fn get_document(&self, id: &AssetId) -> StoreResult<Option<Document>> {
        let current = self.inner.get_document(id).await?;
        if id.type_name() != TAG_EDGE_COLLECTION {
            return Ok(current);
        }
        Ok(match current {
            Some(_) => None,
            None => Some(Document::new()),
        })
    }

    async fn insert_document(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        self.inner.insert_document(collection, doc).await
    }

    async fn replace_document(&self, id: &AssetId, doc: Document) -> StoreResult<Option<Document>> {
        self.inner.replace_document(id, doc).await
    }

    async fn update_document(&self, id: &AssetId, patch: Document) -> StoreResult<Option<Document>> {
        self.inner.update_document(id, patch).await
    }

    async fn delete_document(&self, id: &AssetId) -> StoreResult<bool> {
        self.inner.delete_document(id).await
    }

    async fn all_documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.inner.all_documents(collection).await
    }

    async fn traverse(
        &self,
        start: &AssetId,
        direction: Direction,
        max_depth: u32,
    ) -> StoreResult<Vec<Hop>> {
        self.inner.traverse(start, direction, max_depth).await
    }
}

#[tokio::test]
async fn toggle_tolerates_concurrent_toggles() {
    let world = world().await;
    seed(&world).await;
    let d1 = id("Dungeon/d1");

    let stale = Arc::new(StaleTagEdges {
        inner: world.store.clone(),
    });
    let racing = TagService::new(GraphAdapter::new(stale, world.adapter.registry().clone()));

    // The edge appears between the lookup and the insert.
    world.tags.toggle_tag(&d1, "boss").await.unwrap();
    assert_eq!(racing.toggle_tag(&d1, "boss").await.unwrap(), Toggle::Added);
    assert_eq!(world.store.document_count(TAG_EDGE_COLLECTION), 1);

    // The edge disappears between the lookup and the delete.
    world.tags.toggle_tag(&d1, "boss").await.unwrap();
    assert_eq!(racing.toggle_tag(&d1, "boss").await.unwrap(), Toggle::Removed);
    assert_eq!(world.store.document_count(TAG_EDGE_COLLECTION), 0);
}

#[tokio::test]
async fn field_updates_leave_notes_alone() {
    let world = world().await;
    seed(&world).await;
    let adapter = &world.adapter;
    let c1 = id("Checkpoint/c1");

    assert_eq!(adapter.set_notes(&c1, "save point").await.unwrap(), "save point");
    adapter
        .update(&Asset::node("Checkpoint", "c1", Map::new()))
        .await
        .unwrap();
    assert_eq!(adapter.get_notes(&c1).await.unwrap(), "save point");

    adapter
        .update(&Asset::edge(
            "CheckpointOfDungeon",
            "e1",
            id("Dungeon/d1"),
            id("Checkpoint/c1"),
            Map::new(),
        ))
        .await
        .unwrap();
    assert_eq!(adapter.get_notes(&c1).await.unwrap(), "save point");
}

#[tokio::test]
async fn toggle_rejects_edges_and_missing_assets() {
    let world = world().await;
    seed(&world).await;

    let err = world
        .tags
        .toggle_tag(&id("CheckpointOfDungeon/e1"), "boss")
        .await
        .unwrap_err();
    assert!(matches!(err, GagmError::Constraint(_)));

    let err = world
        .tags
        .toggle_tag(&id("Dungeon/ghost"), "boss")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = world.tags.toggle_tag(&id("Dungeon/d1"), "").await.unwrap_err();
    assert!(matches!(err, GagmError::Validation(_)));
}

#[tokio::test]
async fn create_tag_is_idempotent() {
    let world = world().await;
    world.tags.create_tag("loot").await.unwrap();
    world.tags.create_tag("loot").await.unwrap();
    assert_eq!(world.tags.list_all_tags().await.unwrap(), vec!["loot"]);

    assert!(world.tags.delete_tag("loot").await.unwrap());
    assert!(!world.tags.delete_tag("loot").await.unwrap());
}

#[tokio::test]
async fn deleting_nodes_and_tags_cascades() {
    let world = world().await;
    seed(&world).await;
    let tags = &world.tags;

    tags.toggle_tag(&id("Checkpoint/c1"), "safe").await.unwrap();
    tags.toggle_tag(&id("Checkpoint/c2"), "safe").await.unwrap();
    assert_eq!(world.store.document_count(TAG_EDGE_COLLECTION), 2);

    assert!(world.adapter.delete(&id("Checkpoint/c1")).await.unwrap());
    assert!(!world.adapter.exists(&id("CheckpointOfDungeon/e1")).await.unwrap());
    assert_eq!(world.store.document_count(TAG_EDGE_COLLECTION), 1);
    assert!(!world.adapter.delete(&id("Checkpoint/c1")).await.unwrap());

    tags.delete_tag("safe").await.unwrap();
    assert_eq!(world.store.document_count(TAG_EDGE_COLLECTION), 0);
    assert!(tags.tags_for_asset(&id("Checkpoint/c2")).await.unwrap().is_empty());
}

#[tokio::test]
async fn assets_by_tags_is_a_union() {
    let world = world().await;
    seed(&world).await;
    let tags = &world.tags;

    tags.toggle_tag(&id("Dungeon/d1"), "act1").await.unwrap();
    tags.toggle_tag(&id("Checkpoint/c1"), "act1").await.unwrap();
    tags.toggle_tag(&id("Checkpoint/c1"), "safe").await.unwrap();

    let found = world
        .adapter
        .assets_by_tags(&["act1".to_string(), "safe".to_string(), "unused".to_string()])
        .await
        .unwrap();
    let ids: Vec<String> = found.iter().map(|a| a.id.to_string()).collect();
    assert_eq!(ids, vec!["Checkpoint/c1", "Dungeon/d1"]);
}

#[tokio::test]
async fn resync_refreshes_tag_targets() {
    let store = Arc::new(MemoryStore::new());
    let before = ModelRegistry::from_source(
        StaticSource::default().register(RawDefinition::node("Dungeon")),
    )
    .unwrap();
    SchemaSynchronizer::new(store.clone())
        .sync_all(&before.catalog())
        .await
        .unwrap();
    assert_eq!(store.edge_definition(TAG_EDGE_COLLECTION).unwrap().to, vec!["Dungeon"]);

    let after = ModelRegistry::from_source(game_source()).unwrap();
    let result = SchemaSynchronizer::new(store.clone())
        .sync_all(&after.catalog())
        .await
        .unwrap();
    // Dungeon and the tag collections already exist.
    assert_eq!(result.collections_created, 4);
    assert_eq!(
        store.edge_definition(TAG_EDGE_COLLECTION).unwrap().to,
        vec!["Checkpoint", "Dungeon", "Enemy"]
    );
    assert!(store.has_collection("Guards").await.unwrap());
}

#[tokio::test]
async fn filtered_views() {
    let world = world().await;
    seed(&world).await;
    world.tags.toggle_tag(&id("Dungeon/d1"), "act1").await.unwrap();
    world.tags.toggle_tag(&id("Checkpoint/c1"), "act1").await.unwrap();
    world.tags.toggle_tag(&id("Enemy/goblin"), "act2").await.unwrap();
    let views = GraphViews::new(world.adapter.clone());

    let full = views.full_graph().await.unwrap();
    assert_eq!(full.node_count(), 4);
    assert_eq!(full.edge_count(), 2);

    let everything = views.filtered_graph(&GraphFilter::default()).await.unwrap();
    assert_eq!(everything, full);

    let act1 = views
        .filtered_graph(&GraphFilter {
            tags: BTreeSet::from(["act1".to_string()]),
            tag_mode: FilterMode::Include,
            ..GraphFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(act1.node_count(), 2);
    assert!(act1.edges["CheckpointOfDungeon"].contains_key("e1"));

    let not_act1 = views
        .filtered_graph(&GraphFilter {
            tags: BTreeSet::from(["act1".to_string()]),
            tag_mode: FilterMode::Exclude,
            ..GraphFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(not_act1.node_ids(), vec![id("Enemy/goblin")]);
    assert_eq!(not_act1.edge_count(), 0);

    let checkpoints = views
        .filtered_graph(&GraphFilter {
            types: BTreeSet::from(["Checkpoint".to_string()]),
            type_mode: FilterMode::Include,
            ..GraphFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(checkpoints.node_count(), 2);
    assert!(checkpoints.edges.is_empty());
}
