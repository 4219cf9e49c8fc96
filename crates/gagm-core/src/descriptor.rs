//! Type descriptors: the registry's view of a node or edge type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GagmError, GagmResult};
use crate::schema::{FieldSchema, FieldSpec};

/// Reserved vertex collection holding tag vertices.
pub const TAG_COLLECTION: &str = "AssetTag";

/// Reserved edge collection connecting tags to node assets.
pub const TAG_EDGE_COLLECTION: &str = "TagEdge";

/// Names that can never be registered as user types.
pub const RESERVED_TYPE_NAMES: &[&str] = &[TAG_COLLECTION, TAG_EDGE_COLLECTION];

/// Built-in base kinds; a definition may extend them but not be one.
const BASE_KIND_NAMES: &[&str] = &["asset", "node", "edge"];

/// Whether a type is a vertex or an edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Node,
    Edge,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Node => "node",
            TypeKind::Edge => "edge",
        }
    }

    /// Parse a definition's kind tag (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "node" | "vertex" => Some(Self::Node),
            "edge" => Some(Self::Edge),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered node or edge type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub kind: TypeKind,
    pub field_schema: FieldSchema,
    /// Allowed origin node types; empty means unrestricted.
    #[serde(default)]
    pub origin_types: Vec<String>,
    /// Allowed target node types; empty means unrestricted.
    #[serde(default)]
    pub target_types: Vec<String>,
}

impl TypeDescriptor {
    /// Describe a node type.
    pub fn node(name: impl Into<String>, fields: BTreeMap<String, FieldSpec>) -> Self {
        let name = name.into();
        Self {
            field_schema: FieldSchema::new(name.clone(), fields),
            name,
            kind: TypeKind::Node,
            origin_types: Vec::new(),
            target_types: Vec::new(),
        }
    }

    /// Describe an edge type with its endpoint constraints.
    pub fn edge(
        name: impl Into<String>,
        fields: BTreeMap<String, FieldSpec>,
        origin_types: Vec<String>,
        target_types: Vec<String>,
    ) -> Self {
        let name = name.into();
        Self {
            field_schema: FieldSchema::new(name.clone(), fields),
            name,
            kind: TypeKind::Edge,
            origin_types: dedup(origin_types),
            target_types: dedup(target_types),
        }
    }

    pub fn is_edge(&self) -> bool {
        self.kind == TypeKind::Edge
    }

    pub fn description(&self) -> Option<&str> {
        self.field_schema.description.as_deref()
    }

    /// Edge types with both endpoint sets empty accept any node types.
    pub fn is_unrestricted(&self) -> bool {
        self.origin_types.is_empty() && self.target_types.is_empty()
    }

    pub fn allows_origin(&self, type_name: &str) -> bool {
        self.origin_types.is_empty() || self.origin_types.iter().any(|t| t == type_name)
    }

    pub fn allows_target(&self, type_name: &str) -> bool {
        self.target_types.is_empty() || self.target_types.iter().any(|t| t == type_name)
    }

    /// Exported JSON schema, including endpoint sets for edge types.
    pub fn json_schema(&self) -> Value {
        let mut schema = self.field_schema.to_json_schema();
        if self.is_edge() {
            schema["origin_types"] = Value::from(self.origin_types.clone());
            schema["target_types"] = Value::from(self.target_types.clone());
        }
        schema
    }
}

/// One entry of a type-definition source, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDefinition {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
    #[serde(default)]
    pub origin_types: Vec<String>,
    #[serde(default)]
    pub target_types: Vec<String>,
}

impl RawDefinition {
    /// Start a node type definition.
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Node.as_str().to_string(),
            description: None,
            fields: BTreeMap::new(),
            origin_types: Vec::new(),
            target_types: Vec::new(),
        }
    }

    /// Start an edge type definition.
    pub fn edge(name: impl Into<String>, origin_types: &[&str], target_types: &[&str]) -> Self {
        Self {
            kind: TypeKind::Edge.as_str().to_string(),
            origin_types: origin_types.iter().map(|s| s.to_string()).collect(),
            target_types: target_types.iter().map(|s| s.to_string()).collect(),
            ..Self::node(name)
        }
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Resolve into a descriptor, rejecting anything that is not a proper node or edge type.
    pub fn into_descriptor(self) -> GagmResult<TypeDescriptor> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(GagmError::definition("<unnamed>", "type name must not be empty"));
        }
        if !name.starts_with(|c: char| c.is_ascii_alphabetic())
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(GagmError::definition(
                &name,
                "type names start with a letter and use only letters, digits, '_' or '-'",
            ));
        }
        if BASE_KIND_NAMES.contains(&name.to_lowercase().as_str()) {
            return Err(GagmError::definition(&name, "built-in base kinds cannot be registered"));
        }
        if RESERVED_TYPE_NAMES.contains(&name.as_str()) {
            return Err(GagmError::definition(&name, "name is reserved for the tag overlay"));
        }

        let kind = TypeKind::parse(&self.kind).ok_or_else(|| {
            GagmError::definition(&name, format!("'{}' is not a node or edge kind", self.kind))
        })?;

        let mut descriptor = match kind {
            TypeKind::Node => {
                if !self.origin_types.is_empty() || !self.target_types.is_empty() {
                    return Err(GagmError::definition(&name, "node types cannot declare endpoint types"));
                }
                TypeDescriptor::node(name.clone(), self.fields)
            }
            TypeKind::Edge => TypeDescriptor::edge(
                name.clone(),
                self.fields,
                self.origin_types,
                self.target_types,
            ),
        };
        descriptor.field_schema.description = self.description;

        descriptor
            .field_schema
            .check_definition()
            .map_err(|reason| GagmError::definition(&name, reason))?;

        Ok(descriptor)
    }
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, kind: &str) -> RawDefinition {
        RawDefinition {
            name: name.to_string(),
            kind: kind.to_string(),
            description: None,
            fields: BTreeMap::new(),
            origin_types: Vec::new(),
            target_types: Vec::new(),
        }
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(TypeKind::parse("Node"), Some(TypeKind::Node));
        assert_eq!(TypeKind::parse(" edge "), Some(TypeKind::Edge));
        assert_eq!(TypeKind::parse("asset"), None);
    }

    #[test]
    fn test_rejects_base_kinds_and_reserved_names() {
        assert!(raw("Node", "node").into_descriptor().is_err());
        assert!(raw("Edge", "edge").into_descriptor().is_err());
        assert!(raw("TagEdge", "edge").into_descriptor().is_err());
        assert!(raw("Location", "value").into_descriptor().is_err());
        assert!(raw("Bad/Name", "node").into_descriptor().is_err());
    }

    #[test]
    fn test_name_charset() {
        assert!(raw("Boss_Room-2", "node").into_descriptor().is_ok());
        assert!(raw("2ndFloor", "node").into_descriptor().is_err());
        assert!(raw("Boss Room", "node").into_descriptor().is_err());
        assert!(raw("_hidden", "node").into_descriptor().is_err());
    }

    #[test]
    fn test_edge_endpoints() {
        let mut def = raw("CheckpointOfDungeon", "edge");
        def.origin_types = vec!["Dungeon".into(), "Dungeon".into()];
        def.target_types = vec!["Checkpoint".into()];
        let d = def.into_descriptor().unwrap();

        assert_eq!(d.origin_types, vec!["Dungeon".to_string()]);
        assert!(d.allows_origin("Dungeon"));
        assert!(!d.allows_origin("Checkpoint"));
        assert!(d.allows_target("Checkpoint"));
        assert!(!d.is_unrestricted());
        assert_eq!(d.json_schema()["target_types"][0], "Checkpoint");
    }

    #[test]
    fn test_node_with_endpoints_rejected() {
        let mut def = raw("Dungeon", "node");
        def.origin_types = vec!["X".into()];
        assert!(matches!(def.into_descriptor(), Err(GagmError::Definition { .. })));
    }
}
