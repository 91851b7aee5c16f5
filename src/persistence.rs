//! Fetch/save orchestration and dirty tracking for one editor view.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::error::{FlowError, FlowResult};
use crate::model::{DEFAULT_FLOW_NAME, Edge, FlowData, FlowRecord, Node};
use crate::repository::{FlowStore, FlowUpdate, NewFlow};
use crate::store::GraphStore;

/// The last state known to match the store.
#[derive(Debug, Clone, PartialEq)]
struct Baseline {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    name: String,
    note: String,
    revision: u64,
}

impl Baseline {
    fn capture(graph: &GraphStore, name: &str, note: &str) -> Self {
        Self {
            nodes: graph.nodes().to_vec(),
            edges: graph.edges().to_vec(),
            name: name.to_string(),
            note: note.to_string(),
            revision: graph.revision(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowPersistence {
    flow_id: Option<String>,
    parent_flow_id: Option<String>,
    name: String,
    note: String,
    baseline: Baseline,
}

impl FlowPersistence {
    /// A flow that has never been saved. The current graph is its baseline.
    pub fn unsaved(graph: &GraphStore, name: &str, parent_flow_id: Option<String>) -> Self {
        let name = if name.trim().is_empty() {
            DEFAULT_FLOW_NAME.to_string()
        } else {
            name.to_string()
        };
        Self {
            baseline: Baseline::capture(graph, &name, ""),
            flow_id: None,
            parent_flow_id,
            name,
            note: String::new(),
        }
    }

    /// Loads a fetched record into `graph` and makes it the new baseline.
    pub fn from_record(graph: &mut GraphStore, record: FlowRecord) -> Self {
        graph.load(record.flow_data);
        Self {
            baseline: Baseline::capture(graph, &record.name, &record.note),
            flow_id: Some(record.id),
            parent_flow_id: record.parent_flow_id,
            name: record.name,
            note: record.note,
        }
    }

    pub fn flow_id(&self) -> Option<&str> {
        self.flow_id.as_deref()
    }

    pub fn parent_flow_id(&self) -> Option<&str> {
        self.parent_flow_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn rename(&mut self, name: &str) -> FlowResult<()> {
        if name.trim().is_empty() {
            return Err(FlowError::validation("flow name must not be empty"));
        }
        self.name = name.to_string();
        Ok(())
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    /// Whether nodes, edges, name or note differ from the last save or fetch.
    /// The viewport is not part of the comparison.
    pub fn is_data_changed(&self, graph: &GraphStore) -> bool {
        if self.name != self.baseline.name || self.note != self.baseline.note {
            return true;
        }
        if graph.revision() == self.baseline.revision {
            return false;
        }
        graph.nodes() != self.baseline.nodes.as_slice()
            || graph.edges() != self.baseline.edges.as_slice()
    }

    pub fn snapshot(&self, graph: &GraphStore) -> FlowData {
        graph.to_flow_data()
    }

    /// Creates the record on first save, updates it afterwards. The baseline
    /// only moves when the store accepted the write.
    pub async fn try_save<S: FlowStore>(
        &mut self,
        store: &S,
        graph: &GraphStore,
        saves: &SaveRegistry,
    ) -> FlowResult<FlowRecord> {
        let flow_data = self.snapshot(graph);
        let record = match &self.flow_id {
            Some(id) => {
                let _guard = saves.begin(id)?;
                let update = FlowUpdate {
                    name: Some(self.name.clone()),
                    flow_data: Some(flow_data),
                    note: Some(self.note.clone()),
                    parent_flow_id: None,
                };
                store.update(id, update).await?
            }
            None => {
                let new_flow = NewFlow {
                    name: self.name.clone(),
                    flow_data,
                    parent_flow_id: self.parent_flow_id.clone(),
                    note: self.note.clone(),
                };
                store.create(new_flow).await?
            }
        };
        info!(flow = %record.id, name = %record.name, "saved flow");
        self.flow_id = Some(record.id.clone());
        self.baseline = Baseline::capture(graph, &self.name, &self.note);
        Ok(record)
    }

    /// [`FlowPersistence::try_save`] reduced to success or failure. Local
    /// state is kept either way.
    pub async fn save_flow<S: FlowStore>(
        &mut self,
        store: &S,
        graph: &GraphStore,
        saves: &SaveRegistry,
    ) -> bool {
        match self.try_save(store, graph, saves).await {
            Ok(_) => true,
            Err(err) => {
                warn!(flow = ?self.flow_id, error = %err, "failed to save flow");
                false
            }
        }
    }
}

/// Flow ids with a save in flight. Shared by every view of one editor.
#[derive(Debug, Clone, Default)]
pub struct SaveRegistry {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `flow_id` busy until the guard drops.
    pub fn begin(&self, flow_id: &str) -> FlowResult<SaveGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(flow_id.to_string()) {
            return Err(FlowError::SaveInProgress(flow_id.to_string()));
        }
        Ok(SaveGuard {
            registry: self.clone(),
            flow_id: flow_id.to_string(),
        })
    }

    pub fn is_in_flight(&self, flow_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(flow_id)
    }
}

#[derive(Debug)]
pub struct SaveGuard {
    registry: SaveRegistry,
    flow_id: String,
}

impl Drop for SaveGuard {
    fn drop(&mut self) {
        self.registry
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.flow_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Viewport};
    use crate::connection::{EdgeEnd, HandleRef, reconnect_edge};
    use crate::edges::{LabelEdit, delete_edge, on_label_change, reverse_edge};
    use crate::model::{Handle, NodeKind, NodePatch};
    use crate::repository::{MemoryFlowStore, StoreOp};

    async fn saved_flow(store: &MemoryFlowStore) -> (GraphStore, FlowPersistence, SaveRegistry) {
        let mut graph = GraphStore::new();
        graph.add_node(NodeKind::Activity, Point::default());
        let mut persistence = FlowPersistence::unsaved(&graph, "A", None);
        let saves = SaveRegistry::new();
        assert!(persistence.save_flow(store, &graph, &saves).await);
        (graph, persistence, saves)
    }

    #[tokio::test]
    async fn first_save_mints_an_id_and_clears_dirty() {
        let store = MemoryFlowStore::new();
        let mut graph = GraphStore::new();
        let mut persistence = FlowPersistence::unsaved(&graph, "", None);
        assert_eq!(persistence.name(), DEFAULT_FLOW_NAME);
        graph.add_node(NodeKind::Start, Point::default());
        assert!(persistence.is_data_changed(&graph));

        let record = persistence
            .try_save(&store, &graph, &SaveRegistry::new())
            .await
            .unwrap();
        assert_eq!(persistence.flow_id(), Some(record.id.as_str()));
        assert!(!persistence.is_data_changed(&graph));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn every_mutation_kind_marks_the_view_dirty() {
        let store = MemoryFlowStore::new();
        let (mut graph, mut persistence, saves) = saved_flow(&store).await;
        let first = graph.nodes()[0].id.clone();

        let mutations: Vec<Box<dyn Fn(&mut GraphStore, &mut FlowPersistence)>> = vec![
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                g.add_node(NodeKind::End, Point::default());
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                g.add_sticky_note(Point::default());
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let id = g.nodes()[0].id.clone();
                g.update_node_data(&id, NodePatch::verb_phrase("Review")).unwrap();
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let id = g.nodes()[0].id.clone();
                g.set_node_position(&id, Point::new(99.0, 1.0));
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let a = g.nodes()[0].id.clone();
                let b = g.add_node(NodeKind::End, Point::default());
                crate::connection::connect(g, &a, Handle::ALL[2], &b, Handle::ALL[6]);
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let id = g.edges()[0].id.clone();
                on_label_change(g, &id, "Approved").unwrap();
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let id = g.edges()[0].id.clone();
                let mut edit = LabelEdit::begin(g, &id).unwrap();
                edit.set_text("Rejected");
                edit.commit(g).unwrap();
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let id = g.edges()[0].id.clone();
                reverse_edge(g, &id).unwrap();
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let edge = g.edges()[0].clone();
                let drop = HandleRef::new(&edge.target, "l2");
                reconnect_edge(g, &edge.id, EdgeEnd::Target, &drop).unwrap().unwrap();
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let id = g.edges()[0].id.clone();
                delete_edge(g, &id).unwrap();
            }),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let id = g
                    .nodes()
                    .iter()
                    .find(|node| node.kind() == NodeKind::StickyNote)
                    .map(|node| node.id.clone())
                    .unwrap();
                assert!(g.delete_sticky_note(&id));
            }),
            Box::new(|_: &mut GraphStore, p: &mut FlowPersistence| p.rename("B").unwrap()),
            Box::new(|_: &mut GraphStore, p: &mut FlowPersistence| p.set_note("remember the reviewers")),
            Box::new(|g: &mut GraphStore, _: &mut FlowPersistence| {
                let id = g.nodes().last().unwrap().id.clone();
                g.delete_node(&id);
            }),
        ];

        for (step, mutate) in mutations.iter().enumerate() {
            assert!(!persistence.is_data_changed(&graph), "clean before step {step}");
            mutate(&mut graph, &mut persistence);
            assert!(persistence.is_data_changed(&graph), "dirty after step {step}");
            assert!(persistence.save_flow(&store, &graph, &saves).await);
        }

        let stored = store.fetch(persistence.flow_id().unwrap()).await.unwrap();
        assert_eq!(stored.name, "B");
        assert_eq!(stored.note, "remember the reviewers");
        assert!(stored.flow_data.nodes.iter().any(|n| n.id == first));
    }

    #[tokio::test]
    async fn reverting_a_change_is_clean_again() {
        let store = MemoryFlowStore::new();
        let (mut graph, persistence, _) = saved_flow(&store).await;
        let id = graph.nodes()[0].id.clone();
        graph.set_node_position(&id, Point::new(5.0, 5.0));
        assert!(persistence.is_data_changed(&graph));
        graph.set_node_position(&id, Point::default());
        assert!(!persistence.is_data_changed(&graph));
    }

    #[tokio::test]
    async fn viewport_moves_are_not_unsaved_changes() {
        let store = MemoryFlowStore::new();
        let (mut graph, persistence, _) = saved_flow(&store).await;
        graph.set_viewport(Viewport {
            x: 40.0,
            y: -10.0,
            zoom: 0.75,
        });
        assert!(!persistence.is_data_changed(&graph));
    }

    #[tokio::test]
    async fn failed_save_keeps_local_state_dirty() {
        let store = MemoryFlowStore::new();
        let (mut graph, mut persistence, saves) = saved_flow(&store).await;
        let id = persistence.flow_id().unwrap().to_string();
        graph.add_node(NodeKind::End, Point::default());

        store.fail_on(StoreOp::Update, Some(&id)).await;
        assert!(!persistence.save_flow(&store, &graph, &saves).await);
        assert!(persistence.is_data_changed(&graph));
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(store.fetch(&id).await.unwrap().flow_data.nodes.len(), 1);
        assert!(!saves.is_in_flight(&id));
    }

    #[tokio::test]
    async fn overlapping_saves_of_one_flow_are_refused() {
        let store = MemoryFlowStore::new();
        let (graph, mut persistence, saves) = saved_flow(&store).await;
        let id = persistence.flow_id().unwrap().to_string();

        let guard = saves.begin(&id).unwrap();
        assert!(matches!(
            persistence.try_save(&store, &graph, &saves).await,
            Err(FlowError::SaveInProgress(_))
        ));
        drop(guard);
        assert!(persistence.try_save(&store, &graph, &saves).await.is_ok());
    }

    #[tokio::test]
    async fn fetched_record_becomes_the_baseline() {
        let store = MemoryFlowStore::new();
        let (_, persistence, _) = saved_flow(&store).await;
        let record = store.fetch(persistence.flow_id().unwrap()).await.unwrap();

        let mut graph = GraphStore::new();
        let fetched = FlowPersistence::from_record(&mut graph, record);
        assert_eq!(fetched.name(), "A");
        assert_eq!(graph.nodes().len(), 1);
        assert!(!fetched.is_data_changed(&graph));
    }
}
