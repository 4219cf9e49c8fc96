//! Assets: typed node and edge instances, and their store document form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GagmError, GagmResult};

/// Composite asset identifier, `{type_name}/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId {
    type_name: String,
    key: String,
}

impl AssetId {
    pub fn new(type_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
        }
    }

    /// Parse `type/key`, splitting on the first separator.
    pub fn parse(id: &str) -> GagmResult<Self> {
        match id.split_once('/') {
            Some((type_name, key)) if !type_name.is_empty() && !key.is_empty() => {
                Ok(Self::new(type_name, key))
            }
            _ => Err(GagmError::validation(format!(
                "'{id}' is not a valid asset id (expected 'type/key')"
            ))),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Keys must be non-empty and cannot contain the id separator.
    pub fn check_key(&self) -> GagmResult<()> {
        if self.key.is_empty() {
            return Err(GagmError::validation("asset key must not be empty"));
        }
        if self.key.contains('/') {
            return Err(GagmError::validation(format!(
                "asset key '{}' may not contain '/'",
                self.key
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_name, self.key)
    }
}

impl FromStr for AssetId {
    type Err = GagmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AssetId {
    type Error = GagmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.to_string()
    }
}

/// Endpoints of an edge asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub origin_id: AssetId,
    pub target_id: AssetId,
}

/// A node or edge instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

impl Asset {
    pub fn node(type_name: &str, key: &str, fields: Map<String, Value>) -> Self {
        Self {
            id: AssetId::new(type_name, key),
            notes: String::new(),
            fields,
            link: None,
        }
    }

    pub fn edge(
        type_name: &str,
        key: &str,
        origin_id: AssetId,
        target_id: AssetId,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            id: AssetId::new(type_name, key),
            notes: String::new(),
            fields,
            link: Some(Link { origin_id, target_id }),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn type_name(&self) -> &str {
        self.id.type_name()
    }

    pub fn key(&self) -> &str {
        self.id.key()
    }

    pub fn is_edge(&self) -> bool {
        self.link.is_some()
    }

    pub fn origin_id(&self) -> Option<&AssetId> {
        self.link.as_ref().map(|l| &l.origin_id)
    }

    pub fn target_id(&self) -> Option<&AssetId> {
        self.link.as_ref().map(|l| &l.target_id)
    }

    /// Store document: the fields plus `_id`, `_key`, `notes` and, for edges, `_from`/`_to`.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = self.fields.clone();
        doc.insert("_id".into(), Value::String(self.id.to_string()));
        doc.insert("_key".into(), Value::String(self.key().to_string()));
        doc.insert("notes".into(), Value::String(self.notes.clone()));
        if let Some(link) = &self.link {
            doc.insert("_from".into(), Value::String(link.origin_id.to_string()));
            doc.insert("_to".into(), Value::String(link.target_id.to_string()));
        }
        doc
    }

    /// Split a store document back into its envelope and field payload.
    ///
    /// The payload is not validated here; the adapter does that against the
    /// registered schema of the id's type.
    pub fn from_document(mut doc: Map<String, Value>) -> GagmResult<Self> {
        let id = match doc.remove("_id") {
            Some(Value::String(id)) => AssetId::parse(&id)?,
            _ => return Err(GagmError::Store("document has no '_id'".to_string())),
        };
        doc.remove("_key");
        doc.remove("_rev");

        let notes = match doc.remove("notes") {
            Some(Value::String(notes)) => notes,
            _ => String::new(),
        };

        let link = match (doc.remove("_from"), doc.remove("_to")) {
            (Some(Value::String(from)), Some(Value::String(to))) => Some(Link {
                origin_id: AssetId::parse(&from)?,
                target_id: AssetId::parse(&to)?,
            }),
            _ => None,
        };

        Ok(Self {
            id,
            notes,
            fields: doc,
            link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_splits_on_first_separator() {
        let id = AssetId::parse("Dungeon/d1").unwrap();
        assert_eq!(id.type_name(), "Dungeon");
        assert_eq!(id.key(), "d1");

        let odd = AssetId::parse("Dungeon/a/b").unwrap();
        assert_eq!(odd.key(), "a/b");
        assert!(odd.check_key().is_err());

        assert!(AssetId::parse("Dungeon").is_err());
        assert!(AssetId::parse("/d1").is_err());
        assert!(AssetId::parse("Dungeon/").is_err());
    }

    #[test]
    fn test_id_serde_as_string() {
        let id = AssetId::new("Checkpoint", "c1");
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("Checkpoint/c1"));
        let back: AssetId = serde_json::from_value(json!("Checkpoint/c1")).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_document_envelope() {
        let edge = Asset::edge(
            "CheckpointOfDungeon",
            "e1",
            AssetId::new("Dungeon", "d1"),
            AssetId::new("Checkpoint", "c1"),
            json!({"order": 1}).as_object().cloned().unwrap(),
        )
        .with_notes("first");

        let doc = edge.to_document();
        assert_eq!(doc["_id"], "CheckpointOfDungeon/e1");
        assert_eq!(doc["_from"], "Dungeon/d1");

        let back = Asset::from_document(doc).unwrap();
        assert_eq!(back, edge);
        assert_eq!(back.fields.len(), 1);
    }
}
