//! Right-click menus: classify what was clicked, list what applies, run it.

use crate::edges::{delete_edge, reverse_edge};
use crate::error::{FlowError, FlowResult};
use crate::geometry::Point;
use crate::model::{Link, NodeKind};
use crate::store::GraphStore;

/// What the pointer was over when the menu opened.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuTarget {
    Canvas,
    Node(String),
    Edge(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MenuContext {
    /// `position` is in model coordinates.
    Canvas { position: Point },
    Activity { node_id: String, has_drilldown: bool },
    Terminal { node_id: String },
    StickyNote { node_id: String },
    Edge { edge_id: String },
}

/// Resolves a click at `screen` into a menu context. Ids that no longer
/// resolve yield `None` and no menu.
pub fn classify(graph: &GraphStore, target: MenuTarget, screen: Point) -> Option<MenuContext> {
    match target {
        MenuTarget::Canvas => Some(MenuContext::Canvas {
            position: graph.viewport().screen_to_flow(screen),
        }),
        MenuTarget::Node(node_id) => {
            let node = graph.node(&node_id)?;
            Some(match node.kind() {
                NodeKind::Activity => MenuContext::Activity {
                    has_drilldown: node.drilldown_flow_id().is_some(),
                    node_id,
                },
                NodeKind::Start | NodeKind::End => MenuContext::Terminal { node_id },
                NodeKind::StickyNote => MenuContext::StickyNote { node_id },
            })
        }
        MenuTarget::Edge(edge_id) => {
            graph.edge(&edge_id)?;
            Some(MenuContext::Edge { edge_id })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    AddActivity,
    AddStart,
    AddEnd,
    AddStickyNote,
    EditNodeNumber,
    EditLinks,
    AddDrilldown,
    OpenDrilldown,
    DeleteNode,
    DeleteStickyNote,
    ReverseEdge,
    DeleteEdge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddActivity,
    AddStart,
    AddEnd,
    AddStickyNote,
    EditNodeNumber(Option<u32>),
    EditLinks(Vec<Link>),
    AddDrilldown,
    OpenDrilldown,
    DeleteNode,
    DeleteStickyNote,
    ReverseEdge,
    DeleteEdge,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::AddActivity => CommandKind::AddActivity,
            Command::AddStart => CommandKind::AddStart,
            Command::AddEnd => CommandKind::AddEnd,
            Command::AddStickyNote => CommandKind::AddStickyNote,
            Command::EditNodeNumber(_) => CommandKind::EditNodeNumber,
            Command::EditLinks(_) => CommandKind::EditLinks,
            Command::AddDrilldown => CommandKind::AddDrilldown,
            Command::OpenDrilldown => CommandKind::OpenDrilldown,
            Command::DeleteNode => CommandKind::DeleteNode,
            Command::DeleteStickyNote => CommandKind::DeleteStickyNote,
            Command::ReverseEdge => CommandKind::ReverseEdge,
            Command::DeleteEdge => CommandKind::DeleteEdge,
        }
    }
}

pub fn commands_for(context: &MenuContext) -> Vec<CommandKind> {
    match context {
        MenuContext::Canvas { .. } => vec![
            CommandKind::AddActivity,
            CommandKind::AddStart,
            CommandKind::AddEnd,
            CommandKind::AddStickyNote,
        ],
        MenuContext::Activity { has_drilldown, .. } => vec![
            CommandKind::EditNodeNumber,
            CommandKind::EditLinks,
            if *has_drilldown {
                CommandKind::OpenDrilldown
            } else {
                CommandKind::AddDrilldown
            },
            CommandKind::DeleteNode,
        ],
        MenuContext::Terminal { .. } => vec![CommandKind::DeleteNode],
        MenuContext::StickyNote { .. } => vec![CommandKind::DeleteStickyNote],
        MenuContext::Edge { .. } => vec![CommandKind::ReverseEdge, CommandKind::DeleteEdge],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    NodeAdded(String),
    NodeUpdated(String),
    NodeRemoved(String),
    EdgeUpdated(String),
    EdgeRemoved(String),
    /// Needs the store round trip only the editor can make.
    CreateDrilldown { node_id: String },
    OpenDrilldown { flow_id: String },
}

/// Runs `command` against the graph. Commands the menu would not offer for
/// `context` are rejected.
pub fn dispatch(graph: &mut GraphStore, context: &MenuContext, command: Command) -> FlowResult<CommandOutcome> {
    if !commands_for(context).contains(&command.kind()) {
        return Err(FlowError::validation(format!(
            "{:?} does not apply here",
            command.kind()
        )));
    }

    match (context, command) {
        (MenuContext::Canvas { position }, command) => {
            let kind = match command {
                Command::AddStart => NodeKind::Start,
                Command::AddEnd => NodeKind::End,
                Command::AddStickyNote => NodeKind::StickyNote,
                _ => NodeKind::Activity,
            };
            Ok(CommandOutcome::NodeAdded(graph.add_node(kind, *position)))
        }
        (MenuContext::Activity { node_id, .. }, Command::EditNodeNumber(number)) => {
            updated(graph.set_node_number(node_id, number)?, node_id)
        }
        (MenuContext::Activity { node_id, .. }, Command::EditLinks(links)) => {
            updated(graph.set_links(node_id, links)?, node_id)
        }
        (MenuContext::Activity { node_id, .. }, Command::AddDrilldown) => {
            Ok(CommandOutcome::CreateDrilldown {
                node_id: node_id.clone(),
            })
        }
        (MenuContext::Activity { node_id, .. }, Command::OpenDrilldown) => graph
            .node(node_id)
            .and_then(|node| node.drilldown_flow_id())
            .map(|flow_id| CommandOutcome::OpenDrilldown {
                flow_id: flow_id.to_string(),
            })
            .ok_or_else(|| FlowError::NodeNotFound(node_id.clone())),
        (MenuContext::Activity { node_id, .. } | MenuContext::Terminal { node_id }, Command::DeleteNode) => {
            if graph.delete_node(node_id) {
                Ok(CommandOutcome::NodeRemoved(node_id.clone()))
            } else {
                Err(FlowError::NodeNotFound(node_id.clone()))
            }
        }
        (MenuContext::StickyNote { node_id }, Command::DeleteStickyNote) => {
            if graph.delete_sticky_note(node_id) {
                Ok(CommandOutcome::NodeRemoved(node_id.clone()))
            } else {
                Err(FlowError::NodeNotFound(node_id.clone()))
            }
        }
        (MenuContext::Edge { edge_id }, Command::ReverseEdge) => {
            reverse_edge(graph, edge_id)?;
            Ok(CommandOutcome::EdgeUpdated(edge_id.clone()))
        }
        (MenuContext::Edge { edge_id }, Command::DeleteEdge) => {
            delete_edge(graph, edge_id)?;
            Ok(CommandOutcome::EdgeRemoved(edge_id.clone()))
        }
        (_, command) => Err(FlowError::validation(format!(
            "{:?} does not apply here",
            command.kind()
        ))),
    }
}

fn updated(found: bool, node_id: &str) -> FlowResult<CommandOutcome> {
    if found {
        Ok(CommandOutcome::NodeUpdated(node_id.to_string()))
    } else {
        Err(FlowError::NodeNotFound(node_id.to_string()))
    }
}
