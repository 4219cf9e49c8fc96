//! Neo4j-backed graph store.
//!
//! Mapping onto the property graph:
//! - a collection is a `(:_GagmCollection {name, kind, rule, level, message})` catalog node
//! - an edge definition is a `(:_GagmEdgeDefinition {collection, definition})` node
//! - a vertex is a `(:{Collection}:_GagmVertex {_id, _key, doc, notes})` node
//! - an edge is a `[:{Collection} {_id, _key, doc, notes}]` relationship between two vertices
//!
//! `doc` holds the document minus its notes as JSON text, so fields of any
//! shape round-trip. Notes live in their own property so they can change
//! without rewriting `doc`. Key uniqueness is enforced by a per-collection
//! constraint.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query, Row};
use serde_json::Value;
use tracing::{debug, info, warn};

use gagm_core::{AssetId, GraphConfig};

use super::{
    document_id, endpoints, CollectionKind, Direction, Document, EdgeDefinition, GraphStore, Hop,
    StoreError, StoreResult, ValidationRule,
};

/// Constraints every GAGM database needs, safe to run repeatedly.
const BOOTSTRAP_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT gagm_collection_name IF NOT EXISTS FOR (c:_GagmCollection) REQUIRE c.name IS UNIQUE",
    "CREATE CONSTRAINT gagm_edge_definition IF NOT EXISTS FOR (d:_GagmEdgeDefinition) REQUIRE d.collection IS UNIQUE",
    "CREATE CONSTRAINT gagm_vertex_id IF NOT EXISTS FOR (v:_GagmVertex) REQUIRE v._id IS UNIQUE",
];

/// Compare-and-set rounds before a contended field update gives up.
const UPDATE_ATTEMPTS: usize = 5;

/// Graph store over a Neo4j database.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
    timeout: Duration,
}

impl Neo4jStore {
    /// Connect, ping and bootstrap the catalog constraints.
    ///
    /// `Graph::connect` only builds a lazy pool, so a `RETURN 1` ping forces a
    /// real handshake; an unreachable server fails within the configured timeout.
    pub async fn connect(config: &GraphConfig) -> StoreResult<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| StoreError::Backend(format!("Failed to build Neo4j config: {e}")))?;

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let graph = match tokio::time::timeout(timeout, Graph::connect(neo4j_config)).await {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => return Err(classify(e)),
            Err(_) => {
                return Err(StoreError::Unavailable(format!(
                    "connecting to {} timed out",
                    config.uri
                )))
            }
        };

        let store = Self { graph, timeout };
        store.execute(Query::new("RETURN 1".to_string())).await?;
        store.bootstrap().await?;
        info!(uri = %config.uri, database = %config.database, "Connected to graph store");
        Ok(store)
    }

    async fn bootstrap(&self) -> StoreResult<()> {
        for statement in BOOTSTRAP_STATEMENTS {
            self.execute(Query::new(statement.to_string())).await?;
        }
        debug!(statements = BOOTSTRAP_STATEMENTS.len(), "Graph store constraints ensured");
        Ok(())
    }

    /// Bound a driver call by the store timeout.
    async fn guarded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, neo4rs::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(StoreError::Unavailable(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn execute(&self, query: Query) -> StoreResult<()> {
        self.guarded(self.graph.run(query)).await
    }

    async fn rows(&self, query: Query) -> StoreResult<Vec<Row>> {
        self.guarded(async {
            let mut stream = self.graph.execute(query).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await? {
                rows.push(row);
            }
            Ok::<_, neo4rs::Error>(rows)
        })
        .await
    }

    /// Rows carrying `doc` and `notes` columns, as documents.
    async fn docs(&self, query: Query) -> StoreResult<Vec<Document>> {
        self.rows(query)
            .await?
            .iter()
            .map(|row| stored_document(row, "doc", "notes"))
            .collect()
    }

    async fn edge_definition(&self, collection: &str) -> StoreResult<Option<EdgeDefinition>> {
        let query = Query::new(
            "MATCH (d:_GagmEdgeDefinition {collection: $collection}) RETURN d.definition AS definition"
                .to_string(),
        )
        .param("collection", collection);

        match self.rows(query).await?.first() {
            Some(row) => {
                let text = string_column(row, "definition")?;
                serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| StoreError::Backend(format!("corrupt edge definition: {e}")))
            }
            None => Ok(None),
        }
    }

    async fn vertex_exists(&self, id: &AssetId) -> StoreResult<bool> {
        let query = Query::new(format!(
            "MATCH (v:{}:_GagmVertex {{_id: $id}}) RETURN v._id AS id",
            ident(id.type_name())
        ))
        .param("id", id.to_string());
        Ok(!self.rows(query).await?.is_empty())
    }

    /// Endpoints present and allowed by the collection's edge definition.
    async fn check_edge(&self, collection: &str, doc: &Document) -> StoreResult<(AssetId, AssetId)> {
        let (from, to) = endpoints(doc)
            .ok_or_else(|| StoreError::Backend(format!("edge in '{collection}' lacks _from/_to")))?;
        for endpoint in [&from, &to] {
            if !self.vertex_exists(endpoint).await? {
                return Err(StoreError::NotFound(format!("vertex '{endpoint}' not found")));
            }
        }
        if let Some(def) = self.edge_definition(collection).await? {
            def.check(&from, &to)?;
        }
        Ok((from, to))
    }

    async fn require_kind(&self, collection: &str) -> StoreResult<CollectionKind> {
        self.collection_kind(collection)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("collection '{collection}'")))
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn collection_kind(&self, name: &str) -> StoreResult<Option<CollectionKind>> {
        let query = Query::new(
            "MATCH (c:_GagmCollection {name: $name}) RETURN c.kind AS kind".to_string(),
        )
        .param("name", name);

        match self.rows(query).await?.first() {
            Some(row) => {
                let kind = string_column(row, "kind")?;
                CollectionKind::parse(&kind)
                    .map(Some)
                    .ok_or_else(|| StoreError::Backend(format!("unknown collection kind '{kind}'")))
            }
            None => Ok(None),
        }
    }

    async fn create_collection(&self, name: &str, kind: CollectionKind) -> StoreResult<()> {
        if self.collection_kind(name).await?.is_some() {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let query = Query::new(
            "CREATE (c:_GagmCollection {name: $name, kind: $kind})".to_string(),
        )
        .param("name", name)
        .param("kind", kind.as_str());

        match self.execute(query).await {
            Err(StoreError::DuplicateKey(_)) => Err(StoreError::AlreadyExists(name.to_string())),
            other => other,
        }?;

        self.execute(Query::new(key_constraint(name, kind))).await?;
        debug!(collection = name, kind = kind.as_str(), "Created collection");
        Ok(())
    }

    async fn configure_schema(&self, name: &str, rule: &ValidationRule) -> StoreResult<()> {
        let query = Query::new(
            "MATCH (c:_GagmCollection {name: $name})
             SET c.rule = $rule, c.level = $level, c.message = $message
             RETURN c.name AS name"
                .to_string(),
        )
        .param("name", name)
        .param("rule", rule.rule.to_string())
        .param("level", rule.level.as_str())
        .param("message", rule.message.as_str());

        if self.rows(query).await?.is_empty() {
            return Err(StoreError::NotFound(format!("collection '{name}'")));
        }
        Ok(())
    }

    async fn delete_edge_definition(&self, collection: &str) -> StoreResult<bool> {
        let query = Query::new(
            "MATCH (d:_GagmEdgeDefinition {collection: $collection})
             WITH d, d.collection AS collection
             DELETE d
             RETURN collection"
                .to_string(),
        )
        .param("collection", collection);
        Ok(!self.rows(query).await?.is_empty())
    }

    async fn create_edge_definition(&self, definition: &EdgeDefinition) -> StoreResult<()> {
        match self.require_kind(&definition.collection).await? {
            CollectionKind::Edge => {}
            CollectionKind::Vertex => {
                return Err(StoreError::Constraint(format!(
                    "'{}' is not an edge collection",
                    definition.collection
                )))
            }
        }
        let text = serde_json::to_string(definition)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let query = Query::new(
            "CREATE (d:_GagmEdgeDefinition {collection: $collection, definition: $definition})"
                .to_string(),
        )
        .param("collection", definition.collection.as_str())
        .param("definition", text);

        match self.execute(query).await {
            Err(StoreError::DuplicateKey(_)) => {
                Err(StoreError::AlreadyExists(definition.collection.clone()))
            }
            other => other,
        }
    }

    async fn get_document(&self, id: &AssetId) -> StoreResult<Option<Document>> {
        let Some(kind) = self.collection_kind(id.type_name()).await? else {
            return Ok(None);
        };
        let query = Query::new(format!(
            "MATCH {} RETURN x.doc AS doc, coalesce(x.notes, '') AS notes",
            entity_pattern(kind, id.type_name())
        ))
        .param("id", id.to_string());
        Ok(self.docs(query).await?.into_iter().next())
    }

    async fn insert_document(&self, collection: &str, mut doc: Document) -> StoreResult<Document> {
        let kind = self.require_kind(collection).await?;
        let key = match doc.get("_key") {
            Some(Value::String(key)) if !key.is_empty() => key.clone(),
            _ => return Err(StoreError::Backend("document has no '_key'".to_string())),
        };
        let id = AssetId::new(collection, key.as_str());
        doc.insert("_id".into(), Value::String(id.to_string()));

        let (text, notes) = split_notes(&doc);
        let query = match kind {
            CollectionKind::Vertex => Query::new(format!(
                "CREATE (x:{}:_GagmVertex {{_id: $id, _key: $key, doc: $doc{}}})
                 RETURN x._id AS id",
                ident(collection),
                notes_property(notes.as_deref())
            )),
            CollectionKind::Edge => {
                let (from, to) = self.check_edge(collection, &doc).await?;
                Query::new(format!(
                    "MATCH (a:_GagmVertex {{_id: $from}}), (b:_GagmVertex {{_id: $to}})
                     CREATE (a)-[x:{} {{_id: $id, _key: $key, doc: $doc{}}}]->(b)
                     RETURN x._id AS id",
                    ident(collection),
                    notes_property(notes.as_deref())
                ))
                .param("from", from.to_string())
                .param("to", to.to_string())
            }
        }
        .param("id", id.to_string())
        .param("key", key.as_str())
        .param("doc", text);

        // The key constraint rejects collisions, including concurrent ones.
        let created = match self.rows(with_notes(query, notes)).await {
            Err(StoreError::DuplicateKey(_)) => return Err(StoreError::DuplicateKey(id.to_string())),
            other => other?,
        };
        if created.is_empty() {
            return Err(StoreError::NotFound(format!("endpoints of '{id}' vanished")));
        }
        Ok(doc)
    }

    async fn replace_document(&self, id: &AssetId, mut doc: Document) -> StoreResult<Option<Document>> {
        let Some(kind) = self.collection_kind(id.type_name()).await? else {
            return Ok(None);
        };

        doc.insert("_id".into(), Value::String(id.to_string()));
        doc.insert("_key".into(), Value::String(id.key().to_string()));
        let (text, notes) = split_notes(&doc);

        let query = match kind {
            CollectionKind::Vertex => Query::new(format!(
                "MATCH {} SET x.doc = $doc{}
                 RETURN x.doc AS doc, coalesce(x.notes, '') AS notes",
                entity_pattern(kind, id.type_name()),
                if notes.is_some() { ", x.notes = $notes" } else { "" }
            )),
            CollectionKind::Edge => {
                if self.get_document(id).await?.is_none() {
                    return Ok(None);
                }
                let (from, to) = self.check_edge(id.type_name(), &doc).await?;
                // Relationships cannot be re-pointed; recreate with the new endpoints.
                Query::new(format!(
                    "MATCH ()-[old:{rel} {{_id: $id}}]->()
                     MATCH (a:_GagmVertex {{_id: $from}}), (b:_GagmVertex {{_id: $to}})
                     WITH old, a, b, old.notes AS kept
                     DELETE old
                     CREATE (a)-[x:{rel} {{_id: $id, _key: $key, doc: $doc}}]->(b)
                     SET x.notes = {notes}
                     RETURN x.doc AS doc, coalesce(x.notes, '') AS notes",
                    rel = ident(id.type_name()),
                    notes = if notes.is_some() { "$notes" } else { "kept" }
                ))
                .param("from", from.to_string())
                .param("to", to.to_string())
                .param("key", id.key())
            }
        }
        .param("id", id.to_string())
        .param("doc", text);

        Ok(self.docs(with_notes(query, notes)).await?.into_iter().next())
    }

    /// Notes are set in place; other fields go through a compare-and-set on
    /// `doc`, so a concurrent writer is never silently overwritten.
    async fn update_document(&self, id: &AssetId, mut patch: Document) -> StoreResult<Option<Document>> {
        let Some(kind) = self.collection_kind(id.type_name()).await? else {
            return Ok(None);
        };
        let pattern = entity_pattern(kind, id.type_name());
        for field in ["_id", "_key", "_from", "_to"] {
            patch.remove(field);
        }
        let notes = match patch.remove("notes") {
            Some(Value::String(notes)) => Some(notes),
            Some(other) => {
                patch.insert("notes".into(), other);
                None
            }
            None => None,
        };
        let set_notes = if notes.is_some() { ", x.notes = $notes" } else { "" };

        if patch.is_empty() {
            let Some(notes) = notes else {
                return self.get_document(id).await;
            };
            let query = Query::new(format!(
                "MATCH {pattern} SET x.notes = $notes
                 RETURN x.doc AS doc, coalesce(x.notes, '') AS notes"
            ))
            .param("id", id.to_string())
            .param("notes", notes);
            return Ok(self.docs(query).await?.into_iter().next());
        }

        for _ in 0..UPDATE_ATTEMPTS {
            let query = Query::new(format!("MATCH {pattern} RETURN x.doc AS doc"))
                .param("id", id.to_string());
            let Some(row) = self.rows(query).await?.into_iter().next() else {
                return Ok(None);
            };
            let current = string_column(&row, "doc")?;
            let mut doc = parse_document(&current)?;
            doc.extend(patch.clone());

            let query = Query::new(format!(
                "MATCH {pattern} WHERE x.doc = $current
                 SET x.doc = $doc{set_notes}
                 RETURN x.doc AS doc, coalesce(x.notes, '') AS notes"
            ))
            .param("id", id.to_string())
            .param("current", current)
            .param("doc", Value::Object(doc).to_string());

            if let Some(stored) = self.docs(with_notes(query, notes.clone())).await?.into_iter().next() {
                return Ok(Some(stored));
            }
            debug!(document = %id, "Concurrent write detected, retrying update");
        }
        warn!(document = %id, attempts = UPDATE_ATTEMPTS, "Update gave up under contention");
        Err(StoreError::Backend(format!("'{id}' kept changing during update")))
    }

    async fn delete_document(&self, id: &AssetId) -> StoreResult<bool> {
        let cypher = match self.collection_kind(id.type_name()).await? {
            Some(kind @ CollectionKind::Vertex) => format!(
                "MATCH {}
                 WITH x, x._id AS id
                 DETACH DELETE x
                 RETURN id",
                entity_pattern(kind, id.type_name())
            ),
            Some(kind @ CollectionKind::Edge) => format!(
                "MATCH {}
                 WITH x, x._id AS id
                 DELETE x
                 RETURN id",
                entity_pattern(kind, id.type_name())
            ),
            None => return Ok(false),
        };
        let query = Query::new(cypher).param("id", id.to_string());
        Ok(!self.rows(query).await?.is_empty())
    }

    async fn all_documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let pattern = match self.require_kind(collection).await? {
            CollectionKind::Vertex => format!("(x:{}:_GagmVertex)", ident(collection)),
            CollectionKind::Edge => format!("()-[x:{}]->()", ident(collection)),
        };
        let query = Query::new(format!(
            "MATCH {pattern} RETURN x.doc AS doc, coalesce(x.notes, '') AS notes ORDER BY x._key"
        ));
        self.docs(query).await
    }

    async fn traverse(
        &self,
        start: &AssetId,
        direction: Direction,
        max_depth: u32,
    ) -> StoreResult<Vec<Hop>> {
        if max_depth == 0 {
            return Ok(Vec::new());
        }
        let pattern = match direction {
            Direction::Outbound => format!("-[*1..{max_depth}]->"),
            Direction::Inbound => format!("<-[*1..{max_depth}]-"),
            Direction::Any => format!("-[*1..{max_depth}]-"),
        };
        let query = Query::new(format!(
            "MATCH p = (s:_GagmVertex {{_id: $id}}){pattern}(v:_GagmVertex)
             WITH p, v, last(relationships(p)) AS r
             RETURN length(p) AS depth,
                    r.doc AS edge, coalesce(r.notes, '') AS edge_notes,
                    v.doc AS vertex, coalesce(v.notes, '') AS vertex_notes
             ORDER BY depth"
        ))
        .param("id", start.to_string());

        // Variable-length matches revisit edges through longer paths; keep the shallowest.
        let mut seen = std::collections::HashSet::new();
        let mut hops = Vec::new();
        for row in self.rows(query).await? {
            let depth: i64 = row
                .get("depth")
                .map_err(|e| StoreError::Backend(format!("missing column 'depth': {e:?}")))?;
            let edge = stored_document(&row, "edge", "edge_notes")?;
            let Some(edge_id) = document_id(&edge) else { continue };
            if !seen.insert(edge_id) {
                continue;
            }
            hops.push(Hop {
                depth: u32::try_from(depth).unwrap_or(u32::MAX),
                edge,
                vertex: stored_document(&row, "vertex", "vertex_notes")?,
            });
        }
        Ok(hops)
    }
}

/// Quote a label, relationship type or constraint name.
fn ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Match pattern binding `x` to the entity whose `_id` is `$id`.
fn entity_pattern(kind: CollectionKind, collection: &str) -> String {
    match kind {
        CollectionKind::Vertex => format!("(x:{}:_GagmVertex {{_id: $id}})", ident(collection)),
        CollectionKind::Edge => format!("()-[x:{} {{_id: $id}}]->()", ident(collection)),
    }
}

/// Uniqueness constraint on `_key` for a collection's nodes or relationships.
fn key_constraint(collection: &str, kind: CollectionKind) -> String {
    let name = ident(&format!("gagm_{collection}_key"));
    match kind {
        CollectionKind::Vertex => format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (x:{}) REQUIRE x._key IS UNIQUE",
            ident(collection)
        ),
        CollectionKind::Edge => format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS FOR ()-[x:{}]-() REQUIRE x._key IS UNIQUE",
            ident(collection)
        ),
    }
}

/// JSON text of `doc` without its notes, and the notes when they are text.
fn split_notes(doc: &Document) -> (String, Option<String>) {
    let mut rest = doc.clone();
    let notes = match rest.remove("notes") {
        Some(Value::String(notes)) => Some(notes),
        Some(other) => {
            rest.insert("notes".into(), other);
            None
        }
        None => None,
    };
    (Value::Object(rest).to_string(), notes)
}

fn notes_property(notes: Option<&str>) -> &'static str {
    if notes.is_some() {
        ", notes: $notes"
    } else {
        ""
    }
}

fn with_notes(query: Query, notes: Option<String>) -> Query {
    match notes {
        Some(notes) => query.param("notes", notes),
        None => query,
    }
}

fn splice_notes(doc: &mut Document, notes: String) {
    if !notes.is_empty() {
        doc.insert("notes".into(), Value::String(notes));
    }
}

fn string_column(row: &Row, column: &str) -> StoreResult<String> {
    row.get::<String>(column)
        .map_err(|e| StoreError::Backend(format!("missing column '{column}': {e:?}")))
}

fn parse_document(text: &str) -> StoreResult<Document> {
    match serde_json::from_str(text) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(StoreError::Backend("stored value is not a document".to_string())),
        Err(e) => Err(StoreError::Backend(format!("corrupt document: {e}"))),
    }
}

fn stored_document(row: &Row, doc_column: &str, notes_column: &str) -> StoreResult<Document> {
    let mut doc = parse_document(&string_column(row, doc_column)?)?;
    splice_notes(&mut doc, string_column(row, notes_column)?);
    Ok(doc)
}

/// Map driver errors onto store errors by their server message.
fn classify(e: neo4rs::Error) -> StoreError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if message.contains("ConstraintValidationFailed") || lower.contains("already exists") {
        StoreError::DuplicateKey(message)
    } else if lower.contains("connection")
        || lower.contains("io error")
        || lower.contains("unreachable")
        || lower.contains("refused")
    {
        StoreError::Unavailable(message)
    } else {
        StoreError::Backend(message)
    }
}
