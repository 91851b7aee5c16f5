//! An editing session: the stack of open views over one flow store.

use std::sync::Arc;

use tracing::{debug, info};

use crate::commands::{self, Command, CommandOutcome, MenuContext};
use crate::drilldown::{MAX_DRILLDOWN_DEPTH, NavigationStack};
use crate::editor::{EditorView, FetchTicket, ViewId};
use crate::error::{FlowError, FlowResult};
use crate::flows::{FlowTemplate, template_flow_data};
use crate::model::{DEFAULT_FLOW_NAME, FlowRecord, NodeKind, NodePatch};
use crate::persistence::SaveRegistry;
use crate::repository::{FlowStore, NewFlow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Save,
    Discard,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// The view has unsaved changes; call [`FlowEditor::close_with`].
    NeedsDecision,
    Kept,
}

pub struct FlowEditor<S> {
    store: Arc<S>,
    saves: SaveRegistry,
    stack: NavigationStack,
}

impl<S: FlowStore> FlowEditor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_saves(store, SaveRegistry::new())
    }

    /// An editor that shares its in-flight save registry with other editors
    /// over the same store, so two of them never write one record at once.
    pub fn with_saves(store: Arc<S>, saves: SaveRegistry) -> Self {
        Self {
            store,
            saves,
            stack: NavigationStack::new(),
        }
    }

    pub fn saves(&self) -> &SaveRegistry {
        &self.saves
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stack(&self) -> &NavigationStack {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn active(&self) -> Option<&EditorView> {
        self.stack.top()
    }

    pub fn active_mut(&mut self) -> Option<&mut EditorView> {
        self.stack.top_mut()
    }

    fn require_active(&mut self) -> FlowResult<&mut EditorView> {
        self.stack.top_mut().ok_or(FlowError::NoActiveView)
    }

    fn require_empty(&self) -> FlowResult<()> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(FlowError::validation("close the open flow before switching to another root"))
        }
    }

    /// Opens an unsaved root flow. Nothing is stored until the first save.
    pub fn new_root(&mut self, name: &str, template: FlowTemplate) -> FlowResult<ViewId> {
        self.require_empty()?;
        let id = self.stack.next_view_id();
        self.stack
            .push(EditorView::unsaved(id, name, None, template_flow_data(template)));
        Ok(id)
    }

    pub async fn open_root(&mut self, flow_id: &str) -> FlowResult<ViewId> {
        self.require_empty()?;
        self.open(flow_id).await
    }

    /// Pushes a view bound to an existing child flow.
    pub async fn open_drilldown(&mut self, flow_id: &str) -> FlowResult<ViewId> {
        if self.stack.is_empty() {
            return Err(FlowError::NoActiveView);
        }
        self.open(flow_id).await
    }

    async fn open(&mut self, flow_id: &str) -> FlowResult<ViewId> {
        let ticket = self.begin_open(flow_id)?;
        let result = self.store.fetch(flow_id).await;
        self.complete_fetch(&ticket, result)?;
        Ok(ticket.view)
    }

    /// Pushes a loading view for `flow_id`. Pair with
    /// [`FlowEditor::complete_fetch`] once the record arrives.
    pub fn begin_open(&mut self, flow_id: &str) -> FlowResult<FetchTicket> {
        if self.stack.contains_flow(flow_id) {
            return Err(FlowError::DrilldownCycle(flow_id.to_string()));
        }
        if self.stack.depth() >= MAX_DRILLDOWN_DEPTH {
            return Err(FlowError::validation(format!(
                "drill-down nesting exceeds {MAX_DRILLDOWN_DEPTH} levels"
            )));
        }
        let id = self.stack.next_view_id();
        let mut view = EditorView::loading(id, flow_id);
        let ticket = view.begin_fetch(flow_id);
        self.stack.push(view);
        Ok(ticket)
    }

    /// Applies a fetch result to the view it was started for. Returns
    /// `Ok(false)` when that view was closed or rebound in the meantime. A
    /// failed fetch closes the loading view and reports the error.
    pub fn complete_fetch(
        &mut self,
        ticket: &FetchTicket,
        result: FlowResult<FlowRecord>,
    ) -> FlowResult<bool> {
        let Some(view) = self.stack.get_mut(ticket.view) else {
            debug!(view = ticket.view, flow = %ticket.flow_id, "fetch completed for a closed view");
            return Ok(false);
        };
        if !view.is_current(ticket) {
            debug!(view = ticket.view, flow = %ticket.flow_id, "fetch completed for a rebound view");
            return Ok(false);
        }
        match result {
            Ok(record) => Ok(view.apply_fetch(ticket, record)),
            Err(err) => {
                self.stack.truncate_to(ticket.view);
                Err(err)
            }
        }
    }

    /// Creates a child flow for an activity node and opens it. The active flow
    /// must already be saved. The node link leaves the parent dirty.
    pub async fn create_drilldown(&mut self, node_id: &str) -> FlowResult<String> {
        if self.stack.depth() >= MAX_DRILLDOWN_DEPTH {
            return Err(FlowError::validation(format!(
                "drill-down nesting exceeds {MAX_DRILLDOWN_DEPTH} levels"
            )));
        }
        let store = Arc::clone(&self.store);
        let parent = self.require_active()?;
        let parent_id = parent
            .persistence()
            .flow_id()
            .ok_or_else(|| FlowError::validation("save the flow before adding a drill-down"))?
            .to_string();
        let node = parent
            .graph()
            .node(node_id)
            .ok_or_else(|| FlowError::NodeNotFound(node_id.to_string()))?;
        if node.kind() != NodeKind::Activity {
            return Err(FlowError::validation("only activities can drill down"));
        }
        if let Some(existing) = node.drilldown_flow_id() {
            return Err(FlowError::validation(format!(
                "node '{node_id}' already drills down into '{existing}'"
            )));
        }
        let name = node
            .activity()
            .map(|activity| activity.verb_phrase.trim())
            .filter(|verb| !verb.is_empty())
            .unwrap_or(DEFAULT_FLOW_NAME)
            .to_string();

        let child = store
            .create(NewFlow {
                parent_flow_id: Some(parent_id.clone()),
                ..NewFlow::named(name)
            })
            .await?;
        let parent = self.require_active()?;
        parent
            .graph_mut()
            .update_node_data(node_id, NodePatch::drilldown(Some(child.id.clone())))?;
        info!(parent = %parent_id, child = %child.id, node = node_id, "created drill-down");

        let child_id = child.id.clone();
        let view = self.stack.next_view_id();
        self.stack.push(EditorView::from_record(view, child));
        Ok(child_id)
    }

    pub async fn save_active(&mut self) -> FlowResult<FlowRecord> {
        let view = self.stack.top_mut().ok_or(FlowError::NoActiveView)?;
        view.save(self.store.as_ref(), &self.saves).await
    }

    /// Closes the active view when it has nothing to lose.
    pub fn request_close(&mut self) -> FlowResult<CloseOutcome> {
        let view = self.require_active()?;
        if view.is_dirty() {
            return Ok(CloseOutcome::NeedsDecision);
        }
        self.stack.pop();
        Ok(CloseOutcome::Closed)
    }

    /// Resolves a pending close. `Save` only closes after the save succeeded;
    /// a failed save keeps the view open and returns the error.
    pub async fn close_with(&mut self, decision: CloseDecision) -> FlowResult<CloseOutcome> {
        self.require_active()?;
        match decision {
            CloseDecision::Cancel => return Ok(CloseOutcome::Kept),
            CloseDecision::Save => {
                self.save_active().await?;
            }
            CloseDecision::Discard => {
                debug!(depth = self.stack.depth(), "discarding unsaved changes");
            }
        }
        self.stack.pop();
        Ok(CloseOutcome::Closed)
    }

    /// Runs a menu command on the active view, following drill-down requests
    /// through to the store.
    pub async fn run_command(
        &mut self,
        context: &MenuContext,
        command: Command,
    ) -> FlowResult<CommandOutcome> {
        let view = self.require_active()?;
        let outcome = commands::dispatch(view.graph_mut(), context, command)?;
        match &outcome {
            CommandOutcome::CreateDrilldown { node_id } => {
                self.create_drilldown(node_id).await?;
            }
            CommandOutcome::OpenDrilldown { flow_id } => {
                self.open_drilldown(flow_id).await?;
            }
            _ => {}
        }
        Ok(outcome)
    }
}
