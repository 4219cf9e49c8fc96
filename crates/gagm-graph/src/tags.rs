//! Tag overlay: free-form labels attached to node assets.
//!
//! A tag is an `AssetTag` vertex keyed by the URL-safe base64 of its name; a
//! `TagEdge` from the tag to an asset is keyed by `{tag key}.{asset id key}`.
//! `.` never occurs in the unpadded URL-safe alphabet, so both encodings are
//! injective and reversible.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::{debug, info};

use gagm_core::{AssetId, GagmError, GagmResult, TAG_COLLECTION, TAG_EDGE_COLLECTION};

use crate::adapter::GraphAdapter;
use crate::store::{Direction, Document, GraphStore, StoreError};

/// Outcome of [`TagService::toggle_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
}

/// Store key of a tag vertex.
pub fn tag_key(name: &str) -> GagmResult<String> {
    if name.is_empty() {
        return Err(GagmError::validation("tag name must not be empty"));
    }
    Ok(URL_SAFE_NO_PAD.encode(name))
}

/// Store key of the edge tagging `asset_id` with `tag`.
pub fn tag_edge_key(tag: &str, asset_id: &AssetId) -> GagmResult<String> {
    Ok(format!(
        "{}.{}",
        tag_key(tag)?,
        URL_SAFE_NO_PAD.encode(asset_id.to_string())
    ))
}

/// Recover a tag name from its vertex key.
pub fn decode_tag_key(key: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(key).ok()?;
    String::from_utf8(bytes).ok()
}

/// Tag operations over the reserved tag collections.
#[derive(Clone)]
pub struct TagService {
    adapter: GraphAdapter,
}

impl TagService {
    pub fn new(adapter: GraphAdapter) -> Self {
        Self { adapter }
    }

    fn store(&self) -> &Arc<dyn GraphStore> {
        self.adapter.store()
    }

    /// Create the tag vertex; an existing tag is left as it is.
    pub async fn create_tag(&self, name: &str) -> GagmResult<()> {
        let mut doc = Document::new();
        doc.insert("_key".into(), Value::String(tag_key(name)?));
        doc.insert("name".into(), Value::String(name.to_string()));
        doc.insert("notes".into(), Value::String(String::new()));

        match self.store().insert_document(TAG_COLLECTION, doc).await {
            Ok(_) => {
                info!(tag = name, "Created tag");
                Ok(())
            }
            Err(StoreError::DuplicateKey(_)) => {
                debug!(tag = name, "Tag already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a tag and every tag edge it owns. Returns whether it existed.
    pub async fn delete_tag(&self, name: &str) -> GagmResult<bool> {
        let id = AssetId::new(TAG_COLLECTION, tag_key(name)?);
        let deleted = self.store().delete_document(&id).await?;
        if deleted {
            info!(tag = name, "Deleted tag");
        }
        Ok(deleted)
    }

    /// Attach `tag_name` to the asset if absent, detach it otherwise.
    pub async fn toggle_tag(&self, asset_id: &AssetId, tag_name: &str) -> GagmResult<Toggle> {
        let edge_id = AssetId::new(TAG_EDGE_COLLECTION, tag_edge_key(tag_name, asset_id)?);

        let asset = self
            .adapter
            .get(asset_id)
            .await?
            .ok_or_else(|| GagmError::not_found(format!("Asset not found: {asset_id}")))?;
        if asset.is_edge() {
            return Err(GagmError::constraint(format!(
                "tags attach to node assets, '{asset_id}' is an edge"
            )));
        }

        if self.store().get_document(&edge_id).await?.is_some() {
            // Someone else may have removed it already.
            self.store().delete_document(&edge_id).await?;
            debug!(tag = tag_name, asset = %asset_id, "Removed tag");
            return Ok(Toggle::Removed);
        }

        self.create_tag(tag_name).await?;
        let mut doc = Document::new();
        doc.insert("_key".into(), Value::String(edge_id.key().to_string()));
        doc.insert(
            "_from".into(),
            Value::String(format!("{TAG_COLLECTION}/{}", tag_key(tag_name)?)),
        );
        doc.insert("_to".into(), Value::String(asset_id.to_string()));
        doc.insert("tag_name".into(), Value::String(tag_name.to_string()));

        match self.store().insert_document(TAG_EDGE_COLLECTION, doc).await {
            Ok(_) | Err(StoreError::DuplicateKey(_)) => {
                debug!(tag = tag_name, asset = %asset_id, "Added tag");
                Ok(Toggle::Added)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Names of the tags attached to an asset, sorted.
    pub async fn tags_for_asset(&self, asset_id: &AssetId) -> GagmResult<Vec<String>> {
        let mut names: Vec<String> = self
            .store()
            .traverse(asset_id, Direction::Inbound, 1)
            .await?
            .into_iter()
            .filter(|hop| hop.edge_in(TAG_EDGE_COLLECTION))
            .filter_map(|hop| tag_name(&hop.vertex))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Every tag name, sorted.
    pub async fn list_all_tags(&self) -> GagmResult<Vec<String>> {
        let docs = match self.store().all_documents(TAG_COLLECTION).await {
            Ok(docs) => docs,
            Err(StoreError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names: Vec<String> = docs.iter().filter_map(tag_name).collect();
        names.sort();
        Ok(names)
    }

    pub fn adapter(&self) -> &GraphAdapter {
        &self.adapter
    }
}

/// A tag vertex's name, falling back to decoding its key.
fn tag_name(doc: &Map<String, Value>) -> Option<String> {
    if let Some(name) = doc.get("name").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    doc.get("_key").and_then(Value::as_str).and_then(decode_tag_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_key_reversible() {
        for name in ["boss", "act 1/scene 2", "ñandú", "a.b"] {
            let key = tag_key(name).unwrap();
            assert!(!key.contains('/'));
            assert!(!key.contains('='));
            assert_eq!(decode_tag_key(&key).unwrap(), name);
        }
        assert!(matches!(tag_key(""), Err(GagmError::Validation(_))));
    }

    #[test]
    fn test_tag_edge_key_injective() {
        // "{tag}-{asset}" style keys collide on these pairs.
        let a = tag_edge_key("a-b", &AssetId::new("C", "d")).unwrap();
        let b = tag_edge_key("a", &AssetId::new("b-C", "d")).unwrap();
        assert_ne!(a, b);

        let (tag_part, _) = a.split_once('.').unwrap();
        assert_eq!(decode_tag_key(tag_part).unwrap(), "a-b");
    }
}
