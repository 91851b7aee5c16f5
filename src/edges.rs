//! Label editing, reversal and deletion of existing edges.
//!
//! Every operation addresses the edge by its exact id. An id that does not
//! resolve is an error; nothing falls back to some other edge.

use crate::error::{FlowError, FlowResult};
use crate::model::Edge;
use crate::store::GraphStore;

pub fn on_label_change(graph: &mut GraphStore, edge_id: &str, label: &str) -> FlowResult<()> {
    graph.update_edge(edge_id, |edge| edge.label = label.to_string())
}

/// Swaps source and target together with their handles. Applying it twice
/// restores the original edge.
pub fn reverse_edge(graph: &mut GraphStore, edge_id: &str) -> FlowResult<()> {
    graph.update_edge(edge_id, Edge::reverse)
}

pub fn delete_edge(graph: &mut GraphStore, edge_id: &str) -> FlowResult<Edge> {
    graph.remove_edge(edge_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKey {
    Enter { shift: bool },
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStep {
    Continue,
    Commit,
    Cancel,
}

/// Local text buffer for an edge label being edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEdit {
    edge_id: String,
    original: String,
    buffer: String,
}

impl LabelEdit {
    pub fn begin(graph: &GraphStore, edge_id: &str) -> FlowResult<Self> {
        let edge = graph
            .edge(edge_id)
            .ok_or_else(|| FlowError::EdgeNotFound(edge_id.to_string()))?;
        Ok(Self {
            edge_id: edge.id.clone(),
            original: edge.label.clone(),
            buffer: edge.label.clone(),
        })
    }

    pub fn edge_id(&self) -> &str {
        &self.edge_id
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.buffer = text.into();
    }

    pub fn key(&self, key: LabelKey) -> LabelStep {
        match key {
            LabelKey::Enter { shift: false } => LabelStep::Commit,
            LabelKey::Escape => LabelStep::Cancel,
            LabelKey::Enter { shift: true } | LabelKey::Other => LabelStep::Continue,
        }
    }

    /// Writes the buffer back. Used for both Enter and blur.
    pub fn commit(self, graph: &mut GraphStore) -> FlowResult<()> {
        if self.buffer == self.original {
            return Ok(());
        }
        on_label_change(graph, &self.edge_id, &self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::model::{Handle, NodeKind};

    fn graph_with_edge() -> (GraphStore, String) {
        let mut graph = GraphStore::new();
        let a = graph.add_node(NodeKind::Activity, Point::default());
        let b = graph.add_node(NodeKind::Activity, Point::default());
        let edge = Edge::connect(&a, Handle::parse("r1").unwrap(), &b, Handle::parse("l2").unwrap());
        let id = edge.id.clone();
        graph.upsert_edge(edge);
        (graph, id)
    }

    #[test]
    fn reversing_twice_is_identity() {
        let (mut graph, id) = graph_with_edge();
        let original = graph.edge(&id).unwrap().clone();

        reverse_edge(&mut graph, &id).unwrap();
        let reversed = graph.edge(&id).unwrap();
        assert_eq!(reversed.source, original.target);
        assert_eq!(reversed.target_handle, original.source_handle);

        reverse_edge(&mut graph, &id).unwrap();
        assert_eq!(graph.edge(&id).unwrap(), &original);
    }

    #[test]
    fn unresolvable_ids_fail_without_touching_other_edges() {
        let (mut graph, id) = graph_with_edge();
        let before = graph.edges().to_vec();

        assert!(matches!(
            reverse_edge(&mut graph, "custom"),
            Err(FlowError::EdgeNotFound(_))
        ));
        assert!(matches!(
            delete_edge(&mut graph, "custom"),
            Err(FlowError::EdgeNotFound(_))
        ));
        assert_eq!(graph.edges(), before.as_slice());

        assert_eq!(delete_edge(&mut graph, &id).unwrap().id, id);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn label_edit_commits_on_enter_and_ignores_shift_enter() {
        let (mut graph, id) = graph_with_edge();
        let mut edit = LabelEdit::begin(&graph, &id).unwrap();
        assert_eq!(edit.buffer(), "New Edge");

        edit.set_text("approved");
        assert_eq!(edit.key(LabelKey::Enter { shift: true }), LabelStep::Continue);
        assert_eq!(edit.key(LabelKey::Escape), LabelStep::Cancel);
        assert_eq!(edit.key(LabelKey::Enter { shift: false }), LabelStep::Commit);
        edit.commit(&mut graph).unwrap();

        assert_eq!(graph.edge(&id).unwrap().label, "approved");
    }

    #[test]
    fn unchanged_label_commit_is_not_a_mutation() {
        let (mut graph, id) = graph_with_edge();
        let revision = graph.revision();
        LabelEdit::begin(&graph, &id).unwrap().commit(&mut graph).unwrap();
        assert_eq!(graph.revision(), revision);
    }
}
