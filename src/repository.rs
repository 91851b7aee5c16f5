//! The flow record store seen by the editor, the hierarchy walks and the HTTP API.
//!
//! Every store operation is flat. Cascading through drill-down links is the
//! job of [`crate::drilldown`].

use std::collections::HashMap;
use std::future::Future;

use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{FlowError, FlowResult};
use crate::model::{FlowData, FlowRecord, FlowSummary};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewFlow {
    pub name: String,
    #[serde(default)]
    pub flow_data: FlowData,
    #[serde(default)]
    pub parent_flow_id: Option<String>,
    #[serde(default)]
    pub note: String,
}

impl NewFlow {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> FlowResult<()> {
        if self.name.trim().is_empty() {
            return Err(FlowError::validation("flow name must not be empty"));
        }
        self.flow_data.validate()
    }
}

/// Fields to overwrite on an existing record. `None` leaves a field as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub flow_data: Option<FlowData>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_flow_id: Option<Option<String>>,
}

impl FlowUpdate {
    pub fn flow_data(flow_data: FlowData) -> Self {
        Self {
            flow_data: Some(flow_data),
            ..Self::default()
        }
    }

    pub fn validate(&self, id: &str) -> FlowResult<()> {
        if id.trim().is_empty() {
            return Err(FlowError::validation("flow id is required for an update"));
        }
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(FlowError::validation("flow name must not be empty"));
        }
        match &self.flow_data {
            Some(flow_data) => flow_data.validate(),
            None => Ok(()),
        }
    }

    pub(crate) fn apply(self, record: &mut FlowRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(flow_data) = self.flow_data {
            record.flow_data = flow_data;
        }
        if let Some(note) = self.note {
            record.note = note;
        }
        if let Some(parent) = self.parent_flow_id {
            record.parent_flow_id = parent;
        }
    }
}

/// Persistence for flow records. Implementations validate input before any
/// I/O and report backend failures as [`FlowError::Storage`].
pub trait FlowStore: Send + Sync {
    fn create(&self, flow: NewFlow) -> impl Future<Output = FlowResult<FlowRecord>> + Send;

    fn get_by_id(&self, id: &str) -> impl Future<Output = FlowResult<Option<FlowRecord>>> + Send;

    /// Flows without a parent, most recently updated first.
    fn list_roots(&self) -> impl Future<Output = FlowResult<Vec<FlowSummary>>> + Send;

    /// Every flow including drill-down children, most recently updated first.
    fn list_all(&self) -> impl Future<Output = FlowResult<Vec<FlowSummary>>> + Send;

    /// Fails with [`FlowError::NotFound`] when `id` is absent.
    fn update(
        &self,
        id: &str,
        update: FlowUpdate,
    ) -> impl Future<Output = FlowResult<FlowRecord>> + Send;

    /// Returns whether a record was removed.
    fn delete(&self, id: &str) -> impl Future<Output = FlowResult<bool>> + Send;

    /// Like [`FlowStore::get_by_id`] with absence turned into `NotFound`.
    fn fetch(&self, id: &str) -> impl Future<Output = FlowResult<FlowRecord>> + Send {
        async move {
            self.get_by_id(id)
                .await?
                .ok_or_else(|| FlowError::NotFound(id.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Get,
    List,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    op: StoreOp,
    target: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, (u64, FlowRecord)>,
    seq: u64,
    failures: Vec<InjectedFailure>,
}

impl MemoryState {
    fn check(&self, op: StoreOp, target: &str) -> FlowResult<()> {
        let hit = self.failures.iter().any(|failure| {
            failure.op == op && failure.target.as_deref().is_none_or(|t| t == target)
        });
        if hit {
            return Err(FlowError::Storage(anyhow!(
                "injected {op:?} failure for '{target}'"
            )));
        }
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn summaries(&self, roots_only: bool) -> Vec<FlowSummary> {
        let mut rows: Vec<&(u64, FlowRecord)> = self
            .records
            .values()
            .filter(|(_, record)| !roots_only || record.parent_flow_id.is_none())
            .collect();
        rows.sort_by(|(a_seq, a), (b_seq, b)| {
            b.updated_at.cmp(&a.updated_at).then(b_seq.cmp(a_seq))
        });
        rows.into_iter().map(|(_, record)| record.into()).collect()
    }
}

/// Process-local store. Used by tests and by embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryFlowStore {
    state: Mutex<MemoryState>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `op` fail with a storage error. `target` narrows the
    /// failure to one flow id, or to one flow name for [`StoreOp::Create`].
    pub async fn fail_on(&self, op: StoreOp, target: Option<&str>) {
        self.state.lock().await.failures.push(InjectedFailure {
            op,
            target: target.map(str::to_string),
        });
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl FlowStore for MemoryFlowStore {
    async fn create(&self, flow: NewFlow) -> FlowResult<FlowRecord> {
        flow.validate()?;
        let mut state = self.state.lock().await;
        state.check(StoreOp::Create, &flow.name)?;
        let now = Utc::now();
        let record = FlowRecord {
            id: Uuid::new_v4().to_string(),
            name: flow.name,
            flow_data: flow.flow_data,
            note: flow.note,
            parent_flow_id: flow.parent_flow_id,
            created_at: now,
            updated_at: now,
        };
        let seq = state.next_seq();
        state
            .records
            .insert(record.id.clone(), (seq, record.clone()));
        Ok(record)
    }

    async fn get_by_id(&self, id: &str) -> FlowResult<Option<FlowRecord>> {
        let state = self.state.lock().await;
        state.check(StoreOp::Get, id)?;
        Ok(state.records.get(id).map(|(_, record)| record.clone()))
    }

    async fn list_roots(&self) -> FlowResult<Vec<FlowSummary>> {
        let state = self.state.lock().await;
        state.check(StoreOp::List, "")?;
        Ok(state.summaries(true))
    }

    async fn list_all(&self) -> FlowResult<Vec<FlowSummary>> {
        let state = self.state.lock().await;
        state.check(StoreOp::List, "")?;
        Ok(state.summaries(false))
    }

    async fn update(&self, id: &str, update: FlowUpdate) -> FlowResult<FlowRecord> {
        update.validate(id)?;
        let mut state = self.state.lock().await;
        state.check(StoreOp::Update, id)?;
        let seq = state.next_seq();
        let (row_seq, record) = state
            .records
            .get_mut(id)
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        update.apply(record);
        record.updated_at = Utc::now().max(record.updated_at);
        *row_seq = seq;
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> FlowResult<bool> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::Delete, id)?;
        Ok(state.records.remove(id).is_some())
    }
}
