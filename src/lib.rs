//! Editing core for hierarchical process flows.
//!
//! A flow is a graph of activity, terminal and sticky-note nodes joined by
//! labelled edges. An activity may drill down into a child flow, so flows
//! form a tree that can be duplicated or deleted as a unit.

pub mod canvas;
pub mod commands;
pub mod connection;
pub mod database;
pub mod drilldown;
pub mod edges;
pub mod editor;
pub mod error;
pub mod flows;
pub mod geometry;
pub mod model;
pub mod persistence;
pub mod repository;
#[cfg(feature = "server")]
pub mod serve;
pub mod session;
pub mod store;

pub use commands::{Command, CommandKind, CommandOutcome, MenuContext, MenuTarget};
pub use connection::{ConnectionProtocol, EdgeEnd, HandleRef, HandleRole, connect, reconnect_edge};
pub use database::{Database, DatabaseConfig};
pub use drilldown::{MAX_DRILLDOWN_DEPTH, NavigationStack, delete_flow, duplicate_flow};
pub use edges::{LabelEdit, LabelKey, LabelStep};
pub use editor::{EditorView, FetchTicket, ViewId};
pub use error::{FlowError, FlowResult};
pub use flows::{FlowTemplate, SqliteFlowStore, template_flow_data};
pub use geometry::{Point, Viewport};
pub use model::{
    ActivityData, DEFAULT_EDGE_LABEL, DEFAULT_FLOW_NAME, Edge, FlowData, FlowRecord, FlowSummary,
    Handle, Node, NodeData, NodeKind, NodePatch, Side,
};
pub use persistence::{FlowPersistence, SaveRegistry};
pub use repository::{FlowStore, FlowUpdate, MemoryFlowStore, NewFlow, StoreOp};
pub use session::{CloseDecision, CloseOutcome, FlowEditor};
pub use store::{GraphChange, GraphStore};
