//! SQLite-backed flow store

use super::{Flow, FlowStep, FlowStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS flows (
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    spec TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, name)
);
";

/// Thread-safe flow store handle
#[derive(Clone)]
pub struct SqliteFlowStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFlowStore {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn parse_row(namespace: String, name: String, spec: &str) -> StoreResult<Flow> {
        let steps: Vec<FlowStep> = serde_json::from_str(spec)?;
        Ok(Flow {
            name,
            namespace,
            steps,
        })
    }
}

#[async_trait]
impl FlowStore for SqliteFlowStore {
    async fn get(&self, namespace: &str, name: &str) -> StoreResult<Flow> {
        let conn = self.conn()?;
        let spec: String = conn
            .query_row(
                "SELECT spec FROM flows WHERE namespace = ?1 AND name = ?2",
                params![namespace, name],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                },
                other => StoreError::Sqlite(other),
            })?;
        Self::parse_row(namespace.to_string(), name.to_string(), &spec)
    }

    async fn list(&self, namespace: &str) -> StoreResult<Vec<Flow>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT name, spec FROM flows WHERE namespace = ?1 ORDER BY name")?;
        let rows = stmt
            .query_map(params![namespace], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, spec)| Self::parse_row(namespace.to_string(), name, &spec))
            .collect()
    }

    async fn create(&self, flow: &Flow) -> StoreResult<()> {
        flow.validate()?;
        let spec = serde_json::to_string(&flow.steps)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO flows (namespace, name, spec, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![flow.namespace, flow.name, spec, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::AlreadyExists {
                    namespace: flow.namespace.clone(),
                    name: flow.name.clone(),
                }
            }
            other => StoreError::Sqlite(other),
        })?;

        tracing::info!(namespace = %flow.namespace, name = %flow.name, steps = flow.steps.len(), "Flow created");
        Ok(())
    }

    async fn update(&self, flow: &Flow) -> StoreResult<()> {
        flow.validate()?;
        let spec = serde_json::to_string(&flow.steps)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE flows SET spec = ?3, updated_at = ?4 WHERE namespace = ?1 AND name = ?2",
            params![flow.namespace, flow.name, spec, now],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                namespace: flow.namespace.clone(),
                name: flow.name.clone(),
            });
        }

        tracing::info!(namespace = %flow.namespace, name = %flow.name, steps = flow.steps.len(), "Flow updated");
        Ok(())
    }
}
