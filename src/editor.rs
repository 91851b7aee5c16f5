//! One open flow: its graph, its persistence state and in-progress gestures.

use tracing::debug;

use crate::connection::{ConnectionProtocol, EdgeEnd, HandleRef, HandleRole};
use crate::edges::{LabelEdit, LabelKey, LabelStep};
use crate::error::FlowResult;
use crate::model::{FlowData, FlowRecord};
use crate::persistence::{FlowPersistence, SaveRegistry};
use crate::repository::FlowStore;
use crate::store::GraphStore;

pub type ViewId = u64;

/// Identifies the view and binding a fetch was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub view: ViewId,
    pub generation: u64,
    pub flow_id: String,
}

#[derive(Debug)]
pub struct EditorView {
    id: ViewId,
    generation: u64,
    loading: Option<String>,
    graph: GraphStore,
    persistence: FlowPersistence,
    connection: ConnectionProtocol,
    label_edit: Option<LabelEdit>,
}

impl EditorView {
    pub fn unsaved(id: ViewId, name: &str, parent_flow_id: Option<String>, data: FlowData) -> Self {
        let graph = GraphStore::from_flow_data(data);
        let persistence = FlowPersistence::unsaved(&graph, name, parent_flow_id);
        Self::with_state(id, graph, persistence)
    }

    pub fn from_record(id: ViewId, record: FlowRecord) -> Self {
        let mut graph = GraphStore::new();
        let persistence = FlowPersistence::from_record(&mut graph, record);
        Self::with_state(id, graph, persistence)
    }

    /// A placeholder bound to `flow_id` until its fetch completes.
    pub fn loading(id: ViewId, flow_id: &str) -> Self {
        let mut view = Self::unsaved(id, flow_id, None, FlowData::default());
        view.loading = Some(flow_id.to_string());
        view
    }

    fn with_state(id: ViewId, graph: GraphStore, persistence: FlowPersistence) -> Self {
        Self {
            id,
            generation: 0,
            loading: None,
            graph,
            persistence,
            connection: ConnectionProtocol::new(),
            label_edit: None,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    /// The flow this view shows, including one still being fetched.
    pub fn flow_id(&self) -> Option<&str> {
        self.loading.as_deref().or(self.persistence.flow_id())
    }

    pub fn name(&self) -> &str {
        self.persistence.name()
    }

    pub fn note(&self) -> &str {
        self.persistence.note()
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut GraphStore {
        &mut self.graph
    }

    pub fn persistence(&self) -> &FlowPersistence {
        &self.persistence
    }

    pub fn rename(&mut self, name: &str) -> FlowResult<()> {
        self.persistence.rename(name)
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.persistence.set_note(note);
    }

    pub fn is_dirty(&self) -> bool {
        !self.is_loading() && self.persistence.is_data_changed(&self.graph)
    }

    pub async fn save<S: FlowStore>(&mut self, store: &S, saves: &SaveRegistry) -> FlowResult<FlowRecord> {
        self.persistence.try_save(store, &self.graph, saves).await
    }

    /// Rebinds the view to `flow_id`. Tickets issued earlier go stale.
    pub fn begin_fetch(&mut self, flow_id: &str) -> FetchTicket {
        self.generation += 1;
        self.loading = Some(flow_id.to_string());
        FetchTicket {
            view: self.id,
            generation: self.generation,
            flow_id: flow_id.to_string(),
        }
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.view == self.id
            && ticket.generation == self.generation
            && self.loading.as_deref() == Some(ticket.flow_id.as_str())
    }

    /// Applies a fetched record. Returns `false` and leaves the view alone when
    /// the ticket no longer matches its binding.
    pub fn apply_fetch(&mut self, ticket: &FetchTicket, record: FlowRecord) -> bool {
        if !self.is_current(ticket) {
            debug!(view = self.id, flow = %ticket.flow_id, "discarding stale fetch");
            return false;
        }
        self.persistence = FlowPersistence::from_record(&mut self.graph, record);
        self.loading = None;
        self.connection.cancel();
        self.label_edit = None;
        true
    }

    pub fn begin_connection(&mut self, node_id: &str, handle_id: &str, role: HandleRole) -> bool {
        self.connection.begin(node_id, handle_id, role)
    }

    /// Starts dragging one end of an existing edge. Finish it with
    /// [`EditorView::finish_connection`].
    pub fn begin_reconnect(&mut self, edge_id: &str, end: EdgeEnd) -> FlowResult<()> {
        self.connection.begin_reconnect(&self.graph, edge_id, end)
    }

    pub fn finish_connection(&mut self, drop: Option<&HandleRef>) -> Option<String> {
        self.connection.finish(&mut self.graph, drop)
    }

    pub fn connection(&self) -> &ConnectionProtocol {
        &self.connection
    }

    pub fn begin_label_edit(&mut self, edge_id: &str) -> FlowResult<()> {
        self.label_edit = Some(LabelEdit::begin(&self.graph, edge_id)?);
        Ok(())
    }

    pub fn label_edit(&self) -> Option<&LabelEdit> {
        self.label_edit.as_ref()
    }

    pub fn set_label_text(&mut self, text: impl Into<String>) {
        if let Some(edit) = self.label_edit.as_mut() {
            edit.set_text(text);
        }
    }

    /// Feeds a key press to the open label editor, committing or cancelling it
    /// as the key demands.
    pub fn label_key(&mut self, key: LabelKey) -> FlowResult<LabelStep> {
        let Some(edit) = self.label_edit.as_ref() else {
            return Ok(LabelStep::Continue);
        };
        let step = edit.key(key);
        match step {
            LabelStep::Commit => self.blur_label()?,
            LabelStep::Cancel => self.label_edit = None,
            LabelStep::Continue => {}
        }
        Ok(step)
    }

    /// Leaving the label field commits it.
    pub fn blur_label(&mut self) -> FlowResult<()> {
        match self.label_edit.take() {
            Some(edit) => edit.commit(&mut self.graph),
            None => Ok(()),
        }
    }
}
