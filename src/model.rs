//! Node, edge and flow records as they are edited in memory and persisted as JSON.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, FlowResult};
use crate::geometry::{Point, Viewport};

pub const MAX_ADDITIONAL_INFO: usize = 4;
pub const DEFAULT_EDGE_LABEL: &str = "New Edge";
pub const DEFAULT_FLOW_NAME: &str = "Untitled Flow";
pub const CUSTOM_EDGE_TYPE: &str = "custom";

static LINK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/?#]+[^\s]*$").expect("link url pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Activity,
    Start,
    End,
    StickyNote,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Activity => "activity",
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::StickyNote => "stickyNote",
        }
    }

    pub(crate) fn id_prefix(self) -> &'static str {
        match self {
            NodeKind::Activity => "activity",
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::StickyNote => "memo",
        }
    }

    /// Sticky notes render without connection handles.
    pub fn has_handles(self) -> bool {
        !matches!(self, NodeKind::StickyNote)
    }
}

/// Responsible / Accountable / Consulted / Informed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RaciTag {
    R,
    A,
    C,
    I,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdditionalInfo {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tags: BTreeSet<RaciTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub url: String,
}

impl Link {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn validate(&self) -> FlowResult<()> {
        if self.name.trim().is_empty() {
            return Err(FlowError::validation("link name must not be empty"));
        }
        if !LINK_URL.is_match(self.url.trim()) {
            return Err(FlowError::validation(format!(
                "link '{}' has an invalid url '{}'",
                self.name, self.url
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityData {
    pub verb_phrase: String,
    pub node_number: Option<u32>,
    pub additional_info: Vec<AdditionalInfo>,
    pub links: Vec<Link>,
    pub drilldown_flow_id: Option<String>,
}

impl ActivityData {
    pub fn numbered(node_number: u32) -> Self {
        Self {
            node_number: Some(node_number),
            ..Self::default()
        }
    }

    /// Appends an empty entry and returns its index.
    pub fn add_info(&mut self) -> FlowResult<usize> {
        if self.additional_info.len() >= MAX_ADDITIONAL_INFO {
            return Err(FlowError::validation(format!(
                "an activity holds at most {MAX_ADDITIONAL_INFO} additional entries"
            )));
        }
        self.additional_info.push(AdditionalInfo::default());
        Ok(self.additional_info.len() - 1)
    }

    pub fn remove_info(&mut self, index: usize) -> FlowResult<AdditionalInfo> {
        self.check_index(index)?;
        Ok(self.additional_info.remove(index))
    }

    pub fn set_info_text(&mut self, index: usize, text: impl Into<String>) -> FlowResult<()> {
        self.check_index(index)?;
        self.additional_info[index].text = text.into();
        Ok(())
    }

    /// Returns whether the tag is set after toggling.
    pub fn toggle_tag(&mut self, index: usize, tag: RaciTag) -> FlowResult<bool> {
        self.check_index(index)?;
        let tags = &mut self.additional_info[index].tags;
        if tags.remove(&tag) {
            Ok(false)
        } else {
            tags.insert(tag);
            Ok(true)
        }
    }

    pub fn set_links(&mut self, links: Vec<Link>) -> FlowResult<()> {
        for link in &links {
            link.validate()?;
        }
        self.links = links;
        Ok(())
    }

    fn check_index(&self, index: usize) -> FlowResult<()> {
        if index >= self.additional_info.len() {
            return Err(FlowError::validation(format!(
                "additional entry {index} does not exist"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StickyNoteData {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalData {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Activity(ActivityData),
    Start(TerminalData),
    End(TerminalData),
    StickyNote(StickyNoteData),
}

impl NodeData {
    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Activity => NodeData::Activity(ActivityData::default()),
            NodeKind::Start => NodeData::Start(TerminalData {
                label: "Start".to_string(),
            }),
            NodeKind::End => NodeData::End(TerminalData {
                label: "End".to_string(),
            }),
            NodeKind::StickyNote => NodeData::StickyNote(StickyNoteData::default()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Activity(_) => NodeKind::Activity,
            NodeData::Start(_) => NodeKind::Start,
            NodeData::End(_) => NodeKind::End,
            NodeData::StickyNote(_) => NodeKind::StickyNote,
        }
    }

    fn to_value(&self) -> Value {
        let value = match self {
            NodeData::Activity(data) => serde_json::to_value(data),
            NodeData::Start(data) | NodeData::End(data) => serde_json::to_value(data),
            NodeData::StickyNote(data) => serde_json::to_value(data),
        };
        value.unwrap_or(Value::Null)
    }

    fn from_value(kind: NodeKind, value: Value) -> serde_json::Result<Self> {
        let value = match value {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Ok(match kind {
            NodeKind::Activity => NodeData::Activity(serde_json::from_value(value)?),
            NodeKind::Start => NodeData::Start(serde_json::from_value(value)?),
            NodeKind::End => NodeData::End(serde_json::from_value(value)?),
            NodeKind::StickyNote => NodeData::StickyNote(serde_json::from_value(value)?),
        })
    }
}

/// A canvas node. Serialized as `{ id, type, position, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: String,
    pub position: Point,
    pub data: NodeData,
}

#[derive(Serialize, Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    position: Point,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawNode> for Node {
    type Error = serde_json::Error;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        Ok(Self {
            id: raw.id,
            position: raw.position,
            data: NodeData::from_value(raw.kind, raw.data)?,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        RawNode {
            kind: node.kind(),
            data: node.data.to_value(),
            id: node.id,
            position: node.position,
        }
    }
}

impl Node {
    pub fn new(id: impl Into<String>, position: Point, data: NodeData) -> Self {
        Self {
            id: id.into(),
            position,
            data,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn activity(&self) -> Option<&ActivityData> {
        match &self.data {
            NodeData::Activity(data) => Some(data),
            _ => None,
        }
    }

    pub fn activity_mut(&mut self) -> Option<&mut ActivityData> {
        match &mut self.data {
            NodeData::Activity(data) => Some(data),
            _ => None,
        }
    }

    pub fn drilldown_flow_id(&self) -> Option<&str> {
        self.activity()
            .and_then(|data| data.drilldown_flow_id.as_deref())
    }
}

/// Partial node data merged field-by-field into a node. Fields that do not
/// apply to the node's kind are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePatch {
    pub verb_phrase: Option<String>,
    pub node_number: Option<Option<u32>>,
    pub additional_info: Option<Vec<AdditionalInfo>>,
    pub links: Option<Vec<Link>>,
    pub drilldown_flow_id: Option<Option<String>>,
    pub content: Option<String>,
    pub label: Option<String>,
}

impl NodePatch {
    pub fn verb_phrase(text: impl Into<String>) -> Self {
        Self {
            verb_phrase: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn drilldown(flow_id: Option<String>) -> Self {
        Self {
            drilldown_flow_id: Some(flow_id),
            ..Self::default()
        }
    }

    /// Checks the patch against the data invariants without touching anything.
    pub fn validate(&self) -> FlowResult<()> {
        if let Some(info) = &self.additional_info {
            if info.len() > MAX_ADDITIONAL_INFO {
                return Err(FlowError::validation(format!(
                    "an activity holds at most {MAX_ADDITIONAL_INFO} additional entries, got {}",
                    info.len()
                )));
            }
        }
        if let Some(links) = &self.links {
            for link in links {
                link.validate()?;
            }
        }
        Ok(())
    }

    /// Returns whether anything changed.
    pub(crate) fn apply(self, data: &mut NodeData) -> bool {
        let before = data.clone();
        match data {
            NodeData::Activity(activity) => {
                if let Some(text) = self.verb_phrase {
                    activity.verb_phrase = text;
                }
                if let Some(number) = self.node_number {
                    activity.node_number = number;
                }
                if let Some(info) = self.additional_info {
                    activity.additional_info = info;
                }
                if let Some(links) = self.links {
                    activity.links = links;
                }
                if let Some(flow_id) = self.drilldown_flow_id {
                    activity.drilldown_flow_id = flow_id;
                }
            }
            NodeData::Start(terminal) | NodeData::End(terminal) => {
                if let Some(label) = self.label {
                    terminal.label = label;
                }
            }
            NodeData::StickyNote(note) => {
                if let Some(content) = self.content {
                    note.content = content;
                }
            }
        }
        *data != before
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

/// One of the eight connection points on a node: two per side, each usable as
/// either end of an edge. Rendered ids are `t1 t2 r1 r2 b1 b2 l1 l2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub side: Side,
    pub slot: u8,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::new(Side::Top, 1),
        Handle::new(Side::Top, 2),
        Handle::new(Side::Right, 1),
        Handle::new(Side::Right, 2),
        Handle::new(Side::Bottom, 1),
        Handle::new(Side::Bottom, 2),
        Handle::new(Side::Left, 1),
        Handle::new(Side::Left, 2),
    ];

    pub const fn new(side: Side, slot: u8) -> Self {
        Self { side, slot }
    }

    pub fn parse(id: &str) -> Option<Self> {
        let mut chars = id.chars();
        let side = match chars.next()? {
            't' => Side::Top,
            'r' => Side::Right,
            'b' => Side::Bottom,
            'l' => Side::Left,
            _ => return None,
        };
        let slot = match chars.as_str() {
            "1" => 1,
            "2" => 2,
            _ => return None,
        };
        Some(Self::new(side, slot))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            Side::Top => 't',
            Side::Right => 'r',
            Side::Bottom => 'b',
            Side::Left => 'l',
        };
        write!(f, "{side}{}", self.slot)
    }
}

fn default_true() -> bool {
    true
}

fn default_edge_type() -> String {
    CUSTOM_EDGE_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_handle: String,
    pub target_handle: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_true")]
    pub animated: bool,
    #[serde(rename = "type", default = "default_edge_type")]
    pub edge_type: String,
}

impl Edge {
    pub fn derive_id(source: &str, target: &str, source_handle: &str, target_handle: &str) -> String {
        format!("e{source}-{target}-{source_handle}-{target_handle}")
    }

    pub fn connect(source: &str, source_handle: Handle, target: &str, target_handle: Handle) -> Self {
        let source_handle = source_handle.to_string();
        let target_handle = target_handle.to_string();
        Self {
            id: Self::derive_id(source, target, &source_handle, &target_handle),
            source: source.to_string(),
            target: target.to_string(),
            source_handle,
            target_handle,
            label: DEFAULT_EDGE_LABEL.to_string(),
            animated: true,
            edge_type: default_edge_type(),
        }
    }

    /// Swaps the endpoints and their handles. The id is kept.
    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.source, &mut self.target);
        std::mem::swap(&mut self.source_handle, &mut self.target_handle);
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// The graph portion of a persisted flow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowData {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub viewport: Viewport,
}

impl FlowData {
    pub fn drilldown_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(Node::drilldown_flow_id)
    }

    /// Checks the graph invariants a persisted flow must hold: unique node and
    /// edge ids, bounded additional info, valid links, and edges that join two
    /// existing nodes through known handles.
    pub fn validate(&self) -> FlowResult<()> {
        let mut node_ids = BTreeSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(FlowError::validation(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            if let Some(activity) = node.activity() {
                if activity.additional_info.len() > MAX_ADDITIONAL_INFO {
                    return Err(FlowError::validation(format!(
                        "node '{}' holds {} additional entries, at most {MAX_ADDITIONAL_INFO} allowed",
                        node.id,
                        activity.additional_info.len()
                    )));
                }
                for link in &activity.links {
                    link.validate()?;
                }
            }
        }

        let mut edge_ids = BTreeSet::new();
        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(FlowError::validation(format!(
                    "duplicate edge id '{}'",
                    edge.id
                )));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !node_ids.contains(endpoint.as_str()) {
                    return Err(FlowError::validation(format!(
                        "edge '{}' references missing node '{endpoint}'",
                        edge.id
                    )));
                }
            }
            for handle in [&edge.source_handle, &edge.target_handle] {
                if Handle::parse(handle).is_none() {
                    return Err(FlowError::validation(format!(
                        "edge '{}' uses unknown handle '{handle}'",
                        edge.id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: String,
    pub name: String,
    pub flow_data: FlowData,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub parent_flow_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&FlowRecord> for FlowSummary {
    fn from(record: &FlowRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
