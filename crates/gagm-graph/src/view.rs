//! Whole-graph and filtered snapshots of the asset graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use gagm_core::{Asset, AssetId, GagmResult};

use crate::adapter::GraphAdapter;
use crate::tags::TagService;

/// Assets grouped by type name, then key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphView {
    pub nodes: BTreeMap<String, BTreeMap<String, Asset>>,
    pub edges: BTreeMap<String, BTreeMap<String, Asset>>,
}

impl GraphView {
    fn add_node(&mut self, asset: Asset) {
        self.nodes
            .entry(asset.type_name().to_string())
            .or_default()
            .insert(asset.key().to_string(), asset);
    }

    fn add_edge(&mut self, asset: Asset) {
        self.edges
            .entry(asset.type_name().to_string())
            .or_default()
            .insert(asset.key().to_string(), asset);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.values().map(BTreeMap::len).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    pub fn node_ids(&self) -> Vec<AssetId> {
        self.nodes
            .values()
            .flat_map(|by_key| by_key.values().map(|a| a.id.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Include,
    #[default]
    Exclude,
}

/// Node selection for [`GraphViews::filtered_graph`].
///
/// The default filter excludes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphFilter {
    pub tags: BTreeSet<String>,
    pub tag_mode: FilterMode,
    pub types: BTreeSet<String>,
    pub type_mode: FilterMode,
}

/// Builds [`GraphView`]s from the adapter and tag overlay.
#[derive(Clone)]
pub struct GraphViews {
    adapter: GraphAdapter,
    tags: TagService,
}

impl GraphViews {
    pub fn new(adapter: GraphAdapter) -> Self {
        Self {
            tags: TagService::new(adapter.clone()),
            adapter,
        }
    }

    /// Every node and edge of every registered type.
    pub async fn full_graph(&self) -> GagmResult<GraphView> {
        let catalog = self.adapter.registry().catalog();
        let mut view = GraphView::default();
        for descriptor in catalog.node_types() {
            for asset in self.adapter.list_by_type(&descriptor.name).await? {
                view.add_node(asset);
            }
        }
        for descriptor in catalog.edge_types() {
            for asset in self.adapter.list_by_type(&descriptor.name).await? {
                view.add_edge(asset);
            }
        }
        Ok(view)
    }

    /// Nodes passing both the tag and the type selection, with the edges among them.
    pub async fn filtered_graph(&self, filter: &GraphFilter) -> GagmResult<GraphView> {
        let node_types: BTreeSet<String> = self
            .adapter
            .registry()
            .catalog()
            .node_type_names()
            .into_iter()
            .filter(|name| match filter.type_mode {
                FilterMode::Include => filter.types.contains(name),
                FilterMode::Exclude => !filter.types.contains(name),
            })
            .collect();

        let candidates = match (filter.tag_mode, filter.tags.is_empty()) {
            (FilterMode::Exclude, true) => {
                let mut all = Vec::new();
                for type_name in &node_types {
                    all.extend(self.adapter.list_by_type(type_name).await?);
                }
                all
            }
            (FilterMode::Include, _) => {
                let wanted: Vec<String> = filter.tags.iter().cloned().collect();
                self.adapter.assets_by_tags(&wanted).await?
            }
            (FilterMode::Exclude, false) => {
                let others: Vec<String> = self
                    .tags
                    .list_all_tags()
                    .await?
                    .into_iter()
                    .filter(|tag| !filter.tags.contains(tag))
                    .collect();
                self.adapter.assets_by_tags(&others).await?
            }
        };

        let mut view = GraphView::default();
        for asset in candidates {
            if node_types.contains(asset.type_name()) {
                view.add_node(asset);
            }
        }
        for edge in self.adapter.edges_between(&view.node_ids()).await? {
            view.add_edge(edge);
        }

        debug!(
            nodes = view.node_count(),
            edges = view.edge_count(),
            "Built filtered graph"
        );
        Ok(view)
    }
}
