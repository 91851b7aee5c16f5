use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::connection::connect;
use crate::database::Database;
use crate::error::{FlowError, FlowResult};
use crate::geometry::Point;
use crate::model::{FlowData, FlowRecord, FlowSummary, Handle, NodeKind, Side};
use crate::repository::{FlowStore, FlowUpdate, NewFlow};
use crate::store::GraphStore;

/// Starting graphs offered when a root flow is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowTemplate {
    #[default]
    Empty,
    /// Start, one activity and End, wired left to right.
    Basic,
}

impl FlowTemplate {
    pub fn label(self) -> &'static str {
        match self {
            FlowTemplate::Empty => "empty",
            FlowTemplate::Basic => "basic",
        }
    }
}

pub fn template_flow_data(template: FlowTemplate) -> FlowData {
    let mut graph = GraphStore::new();
    if template == FlowTemplate::Basic {
        let start = graph.add_node(NodeKind::Start, Point::new(100.0, 200.0));
        let activity = graph.add_node(NodeKind::Activity, Point::new(350.0, 200.0));
        let end = graph.add_node(NodeKind::End, Point::new(650.0, 200.0));
        let right = Handle::new(Side::Right, 1);
        let left = Handle::new(Side::Left, 1);
        connect(&mut graph, &start, right, &activity, left);
        connect(&mut graph, &activity, right, &end, left);
    }
    graph.to_flow_data()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(flow_id: &str, column: &str, value: &str) -> anyhow::Result<DateTime<Utc>> {
    value
        .parse()
        .with_context(|| format!("flow '{flow_id}' holds malformed {column} '{value}'"))
}

#[derive(sqlx::FromRow)]
struct FlowRow {
    id: String,
    name: String,
    flow_data: String,
    note: String,
    parent_flow_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl FlowRow {
    fn into_record(self) -> FlowResult<FlowRecord> {
        let flow_data = serde_json::from_str(&self.flow_data)
            .with_context(|| format!("flow '{}' holds malformed flow_data", self.id))?;
        Ok(FlowRecord {
            flow_data,
            created_at: parse_timestamp(&self.id, "created_at", &self.created_at)?,
            updated_at: parse_timestamp(&self.id, "updated_at", &self.updated_at)?,
            id: self.id,
            name: self.name,
            note: self.note,
            parent_flow_id: self.parent_flow_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    name: String,
    created_at: String,
    updated_at: String,
}

impl SummaryRow {
    fn into_summary(self) -> FlowResult<FlowSummary> {
        Ok(FlowSummary {
            created_at: parse_timestamp(&self.id, "created_at", &self.created_at)?,
            updated_at: parse_timestamp(&self.id, "updated_at", &self.updated_at)?,
            id: self.id,
            name: self.name,
        })
    }
}

/// [`FlowStore`] over the `flows` table. `flow_data` is stored as JSON text.
#[derive(Debug, Clone)]
pub struct SqliteFlowStore {
    db: Database,
}

impl SqliteFlowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    async fn list(&self, roots_only: bool) -> FlowResult<Vec<FlowSummary>> {
        let sql = if roots_only {
            "SELECT id, name, created_at, updated_at FROM flows
             WHERE parent_flow_id IS NULL
             ORDER BY updated_at DESC, rowid DESC"
        } else {
            "SELECT id, name, created_at, updated_at FROM flows
             ORDER BY updated_at DESC, rowid DESC"
        };
        let rows: Vec<SummaryRow> = sqlx::query_as(sql)
            .fetch_all(self.pool())
            .await
            .context("Failed to list flows")?;
        rows.into_iter().map(SummaryRow::into_summary).collect()
    }
}

impl FlowStore for SqliteFlowStore {
    async fn create(&self, flow: NewFlow) -> FlowResult<FlowRecord> {
        flow.validate()?;
        let payload =
            serde_json::to_string(&flow.flow_data).context("Failed to encode flow_data")?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"INSERT INTO flows (id, name, flow_data, note, parent_flow_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&flow.name)
        .bind(&payload)
        .bind(&flow.note)
        .bind(&flow.parent_flow_id)
        .bind(timestamp(now))
        .bind(timestamp(now))
        .execute(self.pool())
        .await
        .context("Failed to create flow")?;
        debug!(flow = %id, name = %flow.name, "created flow");

        Ok(FlowRecord {
            id,
            name: flow.name,
            flow_data: flow.flow_data,
            note: flow.note,
            parent_flow_id: flow.parent_flow_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: &str) -> FlowResult<Option<FlowRecord>> {
        let row: Option<FlowRow> = sqlx::query_as(
            "SELECT id, name, flow_data, note, parent_flow_id, created_at, updated_at
             FROM flows WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .context("Failed to get flow")?;

        row.map(FlowRow::into_record).transpose()
    }

    async fn list_roots(&self) -> FlowResult<Vec<FlowSummary>> {
        self.list(true).await
    }

    async fn list_all(&self) -> FlowResult<Vec<FlowSummary>> {
        self.list(false).await
    }

    async fn update(&self, id: &str, update: FlowUpdate) -> FlowResult<FlowRecord> {
        update.validate(id)?;
        let mut record = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        update.apply(&mut record);
        record.updated_at = Utc::now();
        let payload =
            serde_json::to_string(&record.flow_data).context("Failed to encode flow_data")?;

        let affected = sqlx::query(
            "UPDATE flows SET name = ?, flow_data = ?, note = ?, parent_flow_id = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&record.name)
        .bind(&payload)
        .bind(&record.note)
        .bind(&record.parent_flow_id)
        .bind(timestamp(record.updated_at))
        .bind(id)
        .execute(self.pool())
        .await
        .context("Failed to update flow")?
        .rows_affected();

        if affected == 0 {
            return Err(FlowError::NotFound(id.to_string()));
        }
        Ok(record)
    }

    async fn delete(&self, id: &str) -> FlowResult<bool> {
        let affected = sqlx::query("DELETE FROM flows WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .context("Failed to delete flow")?
            .rows_affected();
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseConfig;
    use crate::model::NodePatch;
    use tempfile::TempDir;

    async fn setup_test_store() -> (TempDir, SqliteFlowStore) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(DatabaseConfig::at(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        (temp_dir, SqliteFlowStore::new(db))
    }

    #[test]
    fn basic_template_wires_start_activity_end() {
        let data = template_flow_data(FlowTemplate::Basic);
        assert_eq!(data.nodes.len(), 3);
        assert_eq!(data.edges.len(), 2);
        assert_eq!(data.nodes[1].activity().unwrap().node_number, Some(1));
        assert!(template_flow_data(FlowTemplate::Empty).nodes.is_empty());
    }

    #[tokio::test]
    async fn test_flow_crud() {
        let (_dir, store) = setup_test_store().await;

        let mut graph = GraphStore::new();
        let node = graph.add_node(NodeKind::Activity, Point::new(20.0, 40.0));
        graph
            .update_node_data(&node, NodePatch::verb_phrase("Review"))
            .unwrap();

        let created = store
            .create(NewFlow {
                flow_data: graph.to_flow_data(),
                note: "first draft".to_string(),
                ..NewFlow::named("A")
            })
            .await
            .unwrap();

        let fetched = store.fetch(&created.id).await.unwrap();
        assert_eq!(fetched.name, "A");
        assert_eq!(fetched.note, "first draft");
        assert_eq!(fetched.flow_data, created.flow_data);

        let renamed = store
            .update(
                &created.id,
                FlowUpdate {
                    name: Some("A2".to_string()),
                    ..FlowUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "A2");
        assert_eq!(renamed.flow_data, created.flow_data);
        assert!(renamed.updated_at >= created.updated_at);

        assert!(store.delete(&created.id).await.unwrap());
        assert!(store.get_by_id(&created.id).await.unwrap().is_none());
        assert!(!store.delete(&created.id).await.unwrap());
    }

    #[tokio::test]
    async fn roots_listing_excludes_children() {
        let (_dir, store) = setup_test_store().await;
        let root = store.create(NewFlow::named("root")).await.unwrap();
        store
            .create(NewFlow {
                parent_flow_id: Some(root.id.clone()),
                ..NewFlow::named("child")
            })
            .await
            .unwrap();

        let roots = store.list_roots().await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn updating_a_missing_flow_is_not_found() {
        let (_dir, store) = setup_test_store().await;
        let err = store
            .update("nope", FlowUpdate::flow_data(FlowData::default()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn corrupt_timestamps_surface_as_storage_errors() {
        let (_dir, store) = setup_test_store().await;
        let record = store.create(NewFlow::named("Corrupt")).await.unwrap();
        sqlx::query("UPDATE flows SET updated_at = 'yesterday' WHERE id = ?")
            .bind(&record.id)
            .execute(store.pool())
            .await
            .unwrap();

        assert!(matches!(
            store.get_by_id(&record.id).await,
            Err(FlowError::Storage(_))
        ));
        assert!(matches!(store.list_roots().await, Err(FlowError::Storage(_))));
    }
}
