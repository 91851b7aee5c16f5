//! The in-memory graph owned by one editor view.

use std::fmt;

use tracing::debug;

use crate::error::{FlowError, FlowResult};
use crate::geometry::{Point, Viewport};
use crate::model::{ActivityData, Edge, FlowData, Link, Node, NodeData, NodeKind, NodePatch};

pub type ListenerId = u64;

/// Emitted to subscribers after every mutation of a [`GraphStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    NodeAdded(String),
    NodeUpdated(String),
    NodeRemoved(String),
    EdgeAdded(String),
    EdgeUpdated(String),
    EdgeRemoved(String),
    ViewportChanged(Viewport),
    /// The whole graph was replaced, e.g. after a fetch. Carries the ids now
    /// present so listeners never have to read the store back.
    Reset {
        nodes: Vec<String>,
        edges: Vec<String>,
        viewport: Viewport,
    },
}

type Listener = Box<dyn FnMut(&GraphChange)>;

pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    viewport: Viewport,
    next_node: u64,
    revision: u64,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: ListenerId,
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStore")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("viewport", &self.viewport)
            .field("revision", &self.revision)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: Viewport::default(),
            next_node: 1,
            revision: 0,
            listeners: Vec::new(),
            next_listener: 1,
        }
    }

    pub fn from_flow_data(data: FlowData) -> Self {
        let mut store = Self::new();
        store.nodes = data.nodes;
        store.edges = data.edges;
        store.viewport = data.viewport;
        store
    }

    pub fn to_flow_data(&self) -> FlowData {
        FlowData {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            viewport: self.viewport,
        }
    }

    /// Replaces the graph wholesale. Subscribers stay attached.
    pub fn load(&mut self, data: FlowData) {
        self.nodes = data.nodes;
        self.edges = data.edges;
        self.viewport = data.viewport;
        let change = GraphChange::Reset {
            nodes: self.nodes.iter().map(|node| node.id.clone()).collect(),
            edges: self.edges.iter().map(|edge| edge.id.clone()).collect(),
            viewport: self.viewport,
        };
        self.touch(change);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Bumped by every node/edge mutation. Viewport moves do not count.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&GraphChange) + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn add_node(&mut self, kind: NodeKind, position: Point) -> String {
        let id = self.fresh_node_id(kind);
        let data = match kind {
            NodeKind::Activity => {
                // Numbers are stable labels: deleting a node never renumbers the rest.
                let count = self
                    .nodes
                    .iter()
                    .filter(|node| node.kind() == NodeKind::Activity)
                    .count();
                NodeData::Activity(ActivityData::numbered(count as u32 + 1))
            }
            other => NodeData::default_for(other),
        };
        self.nodes.push(Node::new(id.clone(), position, data));
        self.touch(GraphChange::NodeAdded(id.clone()));
        id
    }

    pub fn add_sticky_note(&mut self, position: Point) -> String {
        self.add_node(NodeKind::StickyNote, position)
    }

    /// Shallow-merges `patch` into the node's data. An unknown id is a silent
    /// no-op and yields `Ok(false)`.
    pub fn update_node_data(&mut self, id: &str, patch: NodePatch) -> FlowResult<bool> {
        patch.validate()?;
        let Some(node) = self.nodes.iter_mut().find(|node| node.id == id) else {
            debug!(node = id, "ignoring update for unknown node");
            return Ok(false);
        };
        if patch.apply(&mut node.data) {
            self.touch(GraphChange::NodeUpdated(id.to_string()));
        }
        Ok(true)
    }

    /// Runs `edit` against an activity node's data. Returns `Ok(None)` when the
    /// node is absent or not an activity. `edit` must leave the data untouched
    /// when it fails.
    pub fn edit_activity<T>(
        &mut self,
        id: &str,
        edit: impl FnOnce(&mut ActivityData) -> FlowResult<T>,
    ) -> FlowResult<Option<T>> {
        let Some(activity) = self
            .nodes
            .iter_mut()
            .find(|node| node.id == id)
            .and_then(Node::activity_mut)
        else {
            return Ok(None);
        };
        let before = activity.clone();
        let result = edit(activity)?;
        if *activity != before {
            self.touch(GraphChange::NodeUpdated(id.to_string()));
        }
        Ok(Some(result))
    }

    pub fn set_node_number(&mut self, id: &str, node_number: Option<u32>) -> FlowResult<bool> {
        self.update_node_data(
            id,
            NodePatch {
                node_number: Some(node_number),
                ..NodePatch::default()
            },
        )
    }

    /// Replaces an activity's links. Every link is validated first.
    pub fn set_links(&mut self, id: &str, links: Vec<Link>) -> FlowResult<bool> {
        self.update_node_data(
            id,
            NodePatch {
                links: Some(links),
                ..NodePatch::default()
            },
        )
    }

    pub fn set_node_position(&mut self, id: &str, position: Point) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|node| node.id == id) else {
            return false;
        };
        if node.position != position {
            node.position = position;
            self.touch(GraphChange::NodeUpdated(id.to_string()));
        }
        true
    }

    /// Removes the node and every edge that starts or ends at it.
    pub fn delete_node(&mut self, id: &str) -> bool {
        let Some(index) = self.nodes.iter().position(|node| node.id == id) else {
            return false;
        };
        let mut dropped = Vec::new();
        self.edges.retain(|edge| {
            if edge.touches(id) {
                dropped.push(edge.id.clone());
                false
            } else {
                true
            }
        });
        self.nodes.remove(index);
        for edge_id in dropped {
            self.touch(GraphChange::EdgeRemoved(edge_id));
        }
        self.touch(GraphChange::NodeRemoved(id.to_string()));
        true
    }

    /// Deletes a sticky note. Other node kinds are left alone.
    pub fn delete_sticky_note(&mut self, id: &str) -> bool {
        let is_note = self
            .node(id)
            .is_some_and(|node| node.kind() == NodeKind::StickyNote);
        is_note && self.delete_node(id)
    }

    /// Inserts the edge, replacing any edge with the same id. Returns whether
    /// an existing edge was replaced.
    pub fn upsert_edge(&mut self, edge: Edge) -> bool {
        let id = edge.id.clone();
        match self.edges.iter().position(|existing| existing.id == id) {
            Some(index) => {
                if self.edges[index] != edge {
                    self.edges[index] = edge;
                    self.touch(GraphChange::EdgeUpdated(id));
                }
                true
            }
            None => {
                self.edges.push(edge);
                self.touch(GraphChange::EdgeAdded(id));
                false
            }
        }
    }

    pub fn update_edge(&mut self, id: &str, update: impl FnOnce(&mut Edge)) -> FlowResult<()> {
        let edge = self
            .edges
            .iter_mut()
            .find(|edge| edge.id == id)
            .ok_or_else(|| FlowError::EdgeNotFound(id.to_string()))?;
        let before = edge.clone();
        update(edge);
        if *edge != before {
            self.touch(GraphChange::EdgeUpdated(id.to_string()));
        }
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> FlowResult<Edge> {
        let index = self
            .edges
            .iter()
            .position(|edge| edge.id == id)
            .ok_or_else(|| FlowError::EdgeNotFound(id.to_string()))?;
        let edge = self.edges.remove(index);
        self.touch(GraphChange::EdgeRemoved(edge.id.clone()));
        Ok(edge)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.viewport != viewport {
            self.viewport = viewport;
            self.notify(&GraphChange::ViewportChanged(viewport));
        }
    }

    fn fresh_node_id(&mut self, kind: NodeKind) -> String {
        loop {
            let candidate = format!("{}-{}", kind.id_prefix(), self.next_node);
            self.next_node += 1;
            if self.node(&candidate).is_none() {
                return candidate;
            }
        }
    }

    fn touch(&mut self, change: GraphChange) {
        self.revision += 1;
        self.notify(&change);
    }

    fn notify(&mut self, change: &GraphChange) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(change);
        }
    }
}
