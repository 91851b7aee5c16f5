use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{Pool, Sqlite};
use tracing::debug;

const DB_FILE_NAME: &str = "upnflow.db";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = std::env::var("UPNFLOW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());
        Self { path }
    }
}

impl DatabaseConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn default_db_path() -> PathBuf {
    ProjectDirs::from("dev", "upnflow", "upnflow")
        .map(|dirs| dirs.data_dir().join(DB_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DB_FILE_NAME))
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| {
                format!("Failed to open SQLite database at '{}'", config.path.display())
            })?;
        debug!(path = %config.path.display(), "opened flow database");

        let db = Self { pool, config };
        db.run_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS flows (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                flow_data TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                parent_flow_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#)
        .execute(&self.pool)
        .await
        .context("Failed to create flows table")?;

        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_flows_parent ON flows(parent_flow_id, updated_at DESC)"#)
        .execute(&self.pool)
        .await
        .context("Failed to create flows_parent index")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let db = Database::new(DatabaseConfig::at(&db_path)).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flows")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig::at(temp_dir.path().join("test.db"));
        Database::new(config.clone()).await.unwrap();
        let db = Database::new(config).await.unwrap();
        db.run_migrations().await.unwrap();
    }
}
