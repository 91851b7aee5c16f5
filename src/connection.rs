//! Turning handle drags into edges.
//!
//! Connections are "loose": any of a node's eight handles can act as either end.
//! The handle the drag started from is the source unless it was grabbed in its
//! target role. Drops that miss a handle, land on the starting node or name an
//! unknown handle are abandoned without error. Dragging one end of an existing
//! edge re-attaches that end under the same rules.

use tracing::debug;

use crate::error::{FlowError, FlowResult};
use crate::model::{Edge, Handle};
use crate::store::GraphStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRole {
    Source,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleRef {
    pub node_id: String,
    pub handle_id: String,
}

impl HandleRef {
    pub fn new(node_id: impl Into<String>, handle_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            handle_id: handle_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnection {
    pub node_id: String,
    pub handle: Handle,
    pub role: HandleRole,
}

/// Which end of an existing edge is being moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEnd {
    Source,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReconnect {
    pub edge_id: String,
    pub end: EdgeEnd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting(PendingConnection),
    Reconnecting(PendingReconnect),
}

#[derive(Debug, Default)]
pub struct ConnectionProtocol {
    state: ConnectionState,
}

impl ConnectionProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connecting(&self) -> bool {
        !matches!(self.state, ConnectionState::Idle)
    }

    /// Starts a drag. Returns `false` and stays idle for a handle id that is
    /// not one of the eight node handles.
    pub fn begin(&mut self, node_id: &str, handle_id: &str, role: HandleRole) -> bool {
        let Some(handle) = Handle::parse(handle_id) else {
            debug!(node = node_id, handle = handle_id, "drag started on unknown handle");
            self.state = ConnectionState::Idle;
            return false;
        };
        self.state = ConnectionState::Connecting(PendingConnection {
            node_id: node_id.to_string(),
            handle,
            role,
        });
        true
    }

    /// Picks up one end of an existing edge.
    pub fn begin_reconnect(&mut self, graph: &GraphStore, edge_id: &str, end: EdgeEnd) -> FlowResult<()> {
        if graph.edge(edge_id).is_none() {
            self.state = ConnectionState::Idle;
            return Err(FlowError::EdgeNotFound(edge_id.to_string()));
        }
        self.state = ConnectionState::Reconnecting(PendingReconnect {
            edge_id: edge_id.to_string(),
            end,
        });
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.state = ConnectionState::Idle;
    }

    /// Ends the drag over `drop`. Returns the id of the created (or replaced)
    /// edge, or `None` when the gesture was abandoned. Always returns to idle.
    pub fn finish(&mut self, graph: &mut GraphStore, drop: Option<&HandleRef>) -> Option<String> {
        let pending = match std::mem::take(&mut self.state) {
            ConnectionState::Idle => return None,
            ConnectionState::Connecting(pending) => pending,
            ConnectionState::Reconnecting(PendingReconnect { edge_id, end }) => {
                let drop = drop?;
                return match reconnect_edge(graph, &edge_id, end, drop) {
                    Ok(id) => id,
                    Err(err) => {
                        debug!(edge = %edge_id, error = %err, "reconnect abandoned");
                        None
                    }
                };
            }
        };
        let Some(drop) = drop else {
            debug!(node = %pending.node_id, "connection dropped outside any handle");
            return None;
        };
        let Some(drop_handle) = Handle::parse(&drop.handle_id) else {
            debug!(handle = %drop.handle_id, "connection dropped on unknown handle");
            return None;
        };
        match pending.role {
            HandleRole::Source => connect(
                graph,
                &pending.node_id,
                pending.handle,
                &drop.node_id,
                drop_handle,
            ),
            HandleRole::Target => connect(
                graph,
                &drop.node_id,
                drop_handle,
                &pending.node_id,
                pending.handle,
            ),
        }
    }
}

/// Creates the edge `source:source_handle -> target:target_handle` with the
/// default label, replacing an identical connection if present.
pub fn connect(
    graph: &mut GraphStore,
    source: &str,
    source_handle: Handle,
    target: &str,
    target_handle: Handle,
) -> Option<String> {
    if source == target {
        debug!(node = source, "ignoring connection from a node to itself");
        return None;
    }
    for id in [source, target] {
        match graph.node(id) {
            Some(node) if node.kind().has_handles() => {}
            _ => {
                debug!(node = id, "connection endpoint has no handles");
                return None;
            }
        }
    }
    let edge = Edge::connect(source, source_handle, target, target_handle);
    let id = edge.id.clone();
    graph.upsert_edge(edge);
    Some(id)
}

/// Moves one end of `edge_id` onto `drop`, keeping its label and flags. The
/// edge id is re-derived from the new endpoints. Returns `Ok(None)` when the
/// drop is abandoned: an unknown handle, a node without handles, both ends on
/// one node, or a tuple another edge already uses.
pub fn reconnect_edge(
    graph: &mut GraphStore,
    edge_id: &str,
    end: EdgeEnd,
    drop: &HandleRef,
) -> FlowResult<Option<String>> {
    let edge = graph
        .edge(edge_id)
        .cloned()
        .ok_or_else(|| FlowError::EdgeNotFound(edge_id.to_string()))?;
    let Some(handle) = Handle::parse(&drop.handle_id) else {
        debug!(edge = edge_id, handle = %drop.handle_id, "reconnect dropped on unknown handle");
        return Ok(None);
    };
    if !graph.node(&drop.node_id).is_some_and(|node| node.kind().has_handles()) {
        debug!(edge = edge_id, node = %drop.node_id, "reconnect target has no handles");
        return Ok(None);
    }

    let mut moved = edge.clone();
    match end {
        EdgeEnd::Source => {
            moved.source = drop.node_id.clone();
            moved.source_handle = handle.to_string();
        }
        EdgeEnd::Target => {
            moved.target = drop.node_id.clone();
            moved.target_handle = handle.to_string();
        }
    }
    if moved.source == moved.target {
        debug!(edge = edge_id, "ignoring reconnect onto the edge's other node");
        return Ok(None);
    }
    moved.id = Edge::derive_id(
        &moved.source,
        &moved.target,
        &moved.source_handle,
        &moved.target_handle,
    );
    if moved.id == edge.id {
        return Ok(Some(moved.id));
    }
    if graph.edge(&moved.id).is_some() {
        debug!(edge = edge_id, existing = %moved.id, "reconnect would duplicate an edge");
        return Ok(None);
    }

    let id = moved.id.clone();
    graph.remove_edge(edge_id)?;
    graph.upsert_edge(moved);
    Ok(Some(id))
}
