use thiserror::Error;

/// Errors surfaced by the editing core, the flow stores and the hierarchy walks.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The requested flow record does not exist.
    #[error("flow '{0}' not found")]
    NotFound(String),

    /// Input was rejected before any storage round trip.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The backing store failed.
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("edge '{0}' not found")]
    EdgeNotFound(String),

    #[error("node '{0}' not found")]
    NodeNotFound(String),

    /// A drill-down link points back at a flow that is already on the current path.
    #[error("drill-down cycle through flow '{0}'")]
    DrilldownCycle(String),

    #[error("a save for flow '{0}' is already in flight")]
    SaveInProgress(String),

    #[error("the active view has unsaved changes")]
    UnsavedChanges,

    #[error("no editor view is open")]
    NoActiveView,

    /// One step of a recursive duplicate or delete failed. Steps listed in
    /// `completed` already reached the store and are not rolled back.
    #[error(
        "{operation} aborted at flow '{flow_id}' after {} completed step(s): {source}",
        .completed.len()
    )]
    PartialRecursion {
        operation: &'static str,
        flow_id: String,
        completed: Vec<String>,
        #[source]
        source: Box<FlowError>,
    },
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        FlowError::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FlowError::NotFound(_))
    }
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;
