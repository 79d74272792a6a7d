use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use super::error::{EditorError, Result};
use super::ids::IdGenerator;
use super::registry::{NodeKind, NodeKindRegistry, NodeKindSpec, PlanLimits, PlanLookup, PlanTier};

// Basic type aliases for clarity
pub type NodeId = String;
pub type EdgeId = String;
type Key = String;
type Value = serde_json::Value;

/// World-space coordinate. For nodes this is the top-left corner of the box.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self { Point { x, y } }
}

/// Named anchor on a node border where an edge attaches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    Top,
    Right,
    Bottom,
    Left,
}

impl Handle {
    pub const ALL: [Handle; 4] = [Handle::Top, Handle::Right, Handle::Bottom, Handle::Left];

    pub fn as_str(self) -> &'static str {
        match self {
            Handle::Top => "top",
            Handle::Right => "right",
            Handle::Bottom => "bottom",
            Handle::Left => "left",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Point,
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub attributes: HashMap<Key, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    #[serde(rename = "sourceNodeId")]
    pub source: NodeId,
    pub source_handle: Option<Handle>,
    #[serde(rename = "targetNodeId")]
    pub target: NodeId,
    pub target_handle: Option<Handle>,
    #[serde(default)]
    pub animated: bool,
}

impl Edge {
    pub fn touches(&self, node: &str) -> bool { self.source == node || self.target == node }
}

/// Whole-graph value. Used as the live state, as a history entry, and as
/// what gets handed to the host on save. Cloning is a deep copy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn new() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() && self.edges.is_empty() }
}

/// Sole owner of the node and edge collections.
pub struct GraphStore {
    graph: GraphSnapshot,
    registry: NodeKindRegistry,
    plans: Box<dyn PlanLookup>,
    ids: Box<dyn IdGenerator>,
}

impl GraphStore {
    // Instantiate a new, empty store
    pub fn new(
        registry: NodeKindRegistry,
        plans: impl PlanLookup + 'static,
        ids: impl IdGenerator + 'static,
    ) -> Self {
        GraphStore {
            graph: GraphSnapshot::new(),
            registry,
            plans: Box::new(plans),
            ids: Box::new(ids),
        }
    }

    pub fn registry(&self) -> &NodeKindRegistry { &self.registry }

    pub fn limits(&self, tier: PlanTier) -> PlanLimits { self.plans.limits(tier) }

    fn kind_spec(&self, kind: &NodeKind) -> Result<&NodeKindSpec> {
        self.registry.get(kind).ok_or_else(|| EditorError::UnknownKind(kind.clone()))
    }

    fn check_pro(&self, kind: &NodeKind, spec: &NodeKindSpec, limits: PlanLimits) -> Result<()> {
        if spec.is_pro && !limits.allows_pro_kinds {
            return Err(EditorError::PlanRestricted { kind: kind.clone() });
        }
        Ok(())
    }

    /// Whether a node of `kind` could be added right now under `tier`.
    pub fn check_can_add(&self, kind: &NodeKind, tier: PlanTier) -> Result<()> {
        let spec = self.kind_spec(kind)?;
        let limits = self.plans.limits(tier);
        if let Some(limit) = limits.max_nodes {
            if self.graph.nodes.len() >= limit {
                return Err(EditorError::CapacityExceeded { limit });
            }
        }
        self.check_pro(kind, spec, limits)
    }

    // Add a node and return its new ID
    pub fn add_node(&mut self, position: Point, kind: NodeKind, tier: PlanTier) -> Result<NodeId> {
        self.check_can_add(&kind, tier)?;
        let label = self.kind_spec(&kind)?.display_label.clone();
        let id = self.ids.next_node_id();
        debug!("add node {} ({}) at ({}, {})", id, kind, position.x, position.y);
        self.graph.nodes.push(Node { id: id.clone(), position, kind, label, attributes: HashMap::new() });
        Ok(id)
    }

    /// Remove a node and cascade to every edge touching it. Absent ids are a no-op.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let before = self.graph.nodes.len();
        self.graph.nodes.retain(|n| n.id != id);
        if self.graph.nodes.len() == before {
            return false;
        }
        let edges_before = self.graph.edges.len();
        self.graph.edges.retain(|e| !e.touches(id));
        debug!("removed node {} and {} incident edge(s)", id, edges_before - self.graph.edges.len());
        true
    }

    pub fn update_node_label(&mut self, id: &str, new_label: &str) -> Result<()> {
        let trimmed = new_label.trim();
        if trimmed.is_empty() {
            return Err(EditorError::EmptyLabel);
        }
        let node = self.node_mut(id)?;
        node.label = trimmed.to_string();
        Ok(())
    }

    /// Replace a node's kind in place. Id, position and attributes survive;
    /// the label resets to the new kind's display name.
    pub fn swap_node_kind(&mut self, id: &str, new_kind: NodeKind, tier: PlanTier) -> Result<()> {
        let spec = self.kind_spec(&new_kind)?;
        self.check_pro(&new_kind, spec, self.plans.limits(tier))?;
        let label = spec.display_label.clone();
        let node = self.node_mut(id)?;
        debug!("swap node {} kind {} -> {}", id, node.kind, new_kind);
        node.kind = new_kind;
        node.label = label;
        Ok(())
    }

    pub fn move_node(&mut self, id: &str, position: Point) -> Result<()> {
        self.node_mut(id)?.position = position;
        Ok(())
    }

    pub fn upsert_node_attribute(&mut self, id: &str, key: String, value: Value) -> Result<()> {
        self.node_mut(id)?.attributes.insert(key, value);
        Ok(())
    }

    pub fn remove_node_attribute(&mut self, id: &str, key: &str) -> Result<bool> {
        Ok(self.node_mut(id)?.attributes.remove(key).is_some())
    }

    // Add an edge if both ends exist and differ; returns the edge ID
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        source_handle: Option<Handle>,
        target_handle: Option<Handle>,
    ) -> Result<EdgeId> {
        if source == target {
            return Err(EditorError::SelfLoop { node: source.to_string() });
        }
        for end in [source, target] {
            if self.node(end).is_none() {
                return Err(EditorError::NodeNotFound(end.to_string()));
            }
        }
        let id = self.ids.next_edge_id();
        debug!("add edge {}: {} -> {}", id, source, target);
        self.graph.edges.push(Edge {
            id: id.clone(),
            source: source.to_string(),
            source_handle,
            target: target.to_string(),
            target_handle,
            animated: false,
        });
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: &str) -> bool {
        let before = self.graph.edges.len();
        self.graph.edges.retain(|e| e.id != id);
        self.graph.edges.len() != before
    }

    pub fn set_edge_animated(&mut self, id: &str, animated: bool) -> bool {
        match self.graph.edges.iter_mut().find(|e| e.id == id) {
            Some(edge) => {
                edge.animated = animated;
                true
            }
            None => false,
        }
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.graph
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| EditorError::NodeNotFound(id.to_string()))
    }

    pub fn node(&self, id: &str) -> Option<&Node> { self.graph.nodes.iter().find(|n| n.id == id) }
    pub fn edge(&self, id: &str) -> Option<&Edge> { self.graph.edges.iter().find(|e| e.id == id) }
    pub fn nodes(&self) -> &[Node] { &self.graph.nodes }
    pub fn edges(&self) -> &[Edge] { &self.graph.edges }
    pub fn node_count(&self) -> usize { self.graph.nodes.len() }
    pub fn edge_count(&self) -> usize { self.graph.edges.len() }
    pub fn graph(&self) -> &GraphSnapshot { &self.graph }

    pub fn incident_edges(&self, id: &str) -> Vec<&Edge> {
        self.graph.edges.iter().filter(|e| e.touches(id)).collect()
    }

    /// Deep copy of the live graph.
    pub fn snapshot(&self) -> GraphSnapshot { self.graph.clone() }

    /// Replace the live graph wholesale (undo/redo, project load).
    pub fn restore(&mut self, graph: GraphSnapshot) {
        for n in &graph.nodes {
            self.ids.observe(&n.id);
        }
        for e in &graph.edges {
            self.ids.observe(&e.id);
        }
        self.graph = graph;
    }
}
