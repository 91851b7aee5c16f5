//! Nested flows: the navigation stack of open views and the recursive
//! duplicate/delete walks over `drilldownFlowId` links.
//!
//! Both walks run one store call at a time and stop at the first failure.
//! Nothing already written is rolled back; the error lists what completed.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, warn};

use crate::editor::{EditorView, ViewId};
use crate::error::{FlowError, FlowResult};
use crate::model::{FlowData, FlowRecord};
use crate::repository::{FlowStore, FlowUpdate, NewFlow};

/// Deepest drill-down chain the recursive walks will follow.
pub const MAX_DRILLDOWN_DEPTH: usize = 64;

/// Open views from the root flow (bottom) to the innermost drill-down (top).
#[derive(Debug, Default)]
pub struct NavigationStack {
    views: Vec<EditorView>,
    next_view: ViewId,
}

impl NavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_view_id(&mut self) -> ViewId {
        self.next_view += 1;
        self.next_view
    }

    pub fn push(&mut self, view: EditorView) {
        self.views.push(view);
    }

    pub fn pop(&mut self) -> Option<EditorView> {
        self.views.pop()
    }

    pub fn top(&self) -> Option<&EditorView> {
        self.views.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut EditorView> {
        self.views.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut EditorView> {
        self.views.iter_mut().find(|view| view.id() == id)
    }

    /// Drops the view and everything stacked above it.
    pub fn truncate_to(&mut self, id: ViewId) -> usize {
        match self.views.iter().position(|view| view.id() == id) {
            Some(index) => {
                let removed = self.views.len() - index;
                self.views.truncate(index);
                removed
            }
            None => 0,
        }
    }

    pub fn contains_flow(&self, flow_id: &str) -> bool {
        self.views.iter().any(|view| view.flow_id() == Some(flow_id))
    }

    /// Flow ids from root to top. Unsaved views are skipped.
    pub fn path(&self) -> Vec<&str> {
        self.views.iter().filter_map(EditorView::flow_id).collect()
    }
}

struct Walk {
    operation: &'static str,
    completed: Vec<String>,
    failed_at: Option<String>,
}

impl Walk {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            completed: Vec::new(),
            failed_at: None,
        }
    }

    fn fail(&mut self, flow_id: &str, err: FlowError) -> FlowError {
        self.failed_at.get_or_insert_with(|| flow_id.to_string());
        err
    }

    fn finish(self, root: &str, err: FlowError) -> FlowError {
        if self.completed.is_empty() {
            return err;
        }
        warn!(
            operation = self.operation,
            completed = self.completed.len(),
            error = %err,
            "recursive operation aborted part way"
        );
        FlowError::PartialRecursion {
            operation: self.operation,
            flow_id: self.failed_at.unwrap_or_else(|| root.to_string()),
            completed: self.completed,
            source: Box::new(err),
        }
    }
}

/// Deep-copies `flow_id` and every flow below it. The copy is a root flow
/// named `new_name`; copied children keep their names and point at their new
/// parents.
pub async fn duplicate_flow<S: FlowStore>(
    store: &S,
    flow_id: &str,
    new_name: &str,
) -> FlowResult<FlowRecord> {
    if flow_id.trim().is_empty() {
        return Err(FlowError::validation("flow id is required to duplicate"));
    }
    if new_name.trim().is_empty() {
        return Err(FlowError::validation("a name is required for the duplicate"));
    }
    let mut walk = Walk::new("duplicate");
    let mut path = Vec::new();
    match duplicate_subtree(store, flow_id, Some(new_name), None, &mut path, &mut walk).await {
        Ok(record) => {
            info!(source = flow_id, copy = %record.id, flows = walk.completed.len(), "duplicated flow tree");
            Ok(record)
        }
        Err(err) => Err(walk.finish(flow_id, err)),
    }
}

fn duplicate_subtree<'a, S: FlowStore>(
    store: &'a S,
    flow_id: &'a str,
    name: Option<&'a str>,
    parent_flow_id: Option<String>,
    path: &'a mut Vec<String>,
    walk: &'a mut Walk,
) -> Pin<Box<dyn Future<Output = FlowResult<FlowRecord>> + Send + 'a>> {
    Box::pin(async move {
        if path.iter().any(|ancestor| ancestor == flow_id) {
            return Err(walk.fail(flow_id, FlowError::DrilldownCycle(flow_id.to_string())));
        }
        if path.len() >= MAX_DRILLDOWN_DEPTH {
            return Err(walk.fail(
                flow_id,
                FlowError::validation(format!(
                    "drill-down nesting exceeds {MAX_DRILLDOWN_DEPTH} levels"
                )),
            ));
        }

        let original = match store.fetch(flow_id).await {
            Ok(record) => record,
            Err(err) => return Err(walk.fail(flow_id, err)),
        };
        let copy = NewFlow {
            name: name.map_or_else(|| original.name.clone(), str::to_string),
            flow_data: original.flow_data.clone(),
            parent_flow_id,
            note: original.note.clone(),
        };
        let created = match store.create(copy).await {
            Ok(record) => record,
            Err(err) => return Err(walk.fail(flow_id, err)),
        };
        walk.completed.push(created.id.clone());
        debug!(source = flow_id, copy = %created.id, "copied flow");

        path.push(flow_id.to_string());
        let mut flow_data: FlowData = original.flow_data;
        for node in flow_data.nodes.iter_mut() {
            let Some(activity) = node.activity_mut() else {
                continue;
            };
            let Some(child_id) = activity.drilldown_flow_id.clone() else {
                continue;
            };
            let child = duplicate_subtree(
                store,
                &child_id,
                None,
                Some(created.id.clone()),
                &mut *path,
                &mut *walk,
            )
            .await?;
            activity.drilldown_flow_id = Some(child.id);
        }
        path.pop();

        match store.update(&created.id, FlowUpdate::flow_data(flow_data)).await {
            Ok(record) => Ok(record),
            Err(err) => Err(walk.fail(&created.id, err)),
        }
    })
}

/// Deletes `flow_id` after every flow below it, children first. Returns the
/// deleted ids in deletion order. Links to flows that no longer exist are
/// skipped.
pub async fn delete_flow<S: FlowStore>(store: &S, flow_id: &str) -> FlowResult<Vec<String>> {
    if flow_id.trim().is_empty() {
        return Err(FlowError::validation("flow id is required to delete"));
    }
    let mut walk = Walk::new("delete");
    match delete_subtree(store, flow_id, &mut walk).await {
        Ok(()) => {
            info!(flow = flow_id, deleted = walk.completed.len(), "deleted flow tree");
            Ok(walk.completed)
        }
        Err(err) => Err(walk.finish(flow_id, err)),
    }
}

struct Frame {
    flow_id: String,
    children: Vec<String>,
    next: usize,
}

async fn delete_subtree<S: FlowStore>(store: &S, root: &str, walk: &mut Walk) -> FlowResult<()> {
    let record = store.fetch(root).await.map_err(|err| walk.fail(root, err))?;
    let mut stack = vec![frame_for(&record)];
    let mut seen: HashSet<String> = HashSet::from([root.to_string()]);

    while let Some(top) = stack.last_mut() {
        if top.next < top.children.len() {
            let child_id = top.children[top.next].clone();
            top.next += 1;

            if stack.iter().any(|frame| frame.flow_id == child_id) {
                return Err(walk.fail(&child_id, FlowError::DrilldownCycle(child_id.clone())));
            }
            if !seen.insert(child_id.clone()) {
                continue;
            }
            if stack.len() >= MAX_DRILLDOWN_DEPTH {
                return Err(walk.fail(
                    &child_id,
                    FlowError::validation(format!(
                        "drill-down nesting exceeds {MAX_DRILLDOWN_DEPTH} levels"
                    )),
                ));
            }
            match store.get_by_id(&child_id).await {
                Ok(Some(child)) => stack.push(frame_for(&child)),
                Ok(None) => warn!(flow = %child_id, "skipping drill-down link to a missing flow"),
                Err(err) => return Err(walk.fail(&child_id, err)),
            }
            continue;
        }

        let Some(done) = stack.pop() else {
            break;
        };
        match store.delete(&done.flow_id).await {
            Ok(_) => {
                debug!(flow = %done.flow_id, "deleted flow");
                walk.completed.push(done.flow_id);
            }
            Err(err) => return Err(walk.fail(&done.flow_id, err)),
        }
    }
    Ok(())
}

fn frame_for(record: &FlowRecord) -> Frame {
    Frame {
        flow_id: record.id.clone(),
        children: record.flow_data.drilldown_ids().map(str::to_string).collect(),
        next: 0,
    }
}
