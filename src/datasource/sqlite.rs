// src/datasource/sqlite.rs
// sqlx::SqlitePool-backed Session/DataSource. Raw BEGIN / COMMIT /
// ROLLBACK / SAVEPOINT statements are issued directly against a held
// `PoolConnection` rather than via `sqlx::Transaction`, because the
// aspect — not the driver — owns the savepoint stack (spec.md's data
// model puts `savepoints` on the context, not on the session type).

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{TxError, TxResult};
use crate::options::IsolationLevel;
use crate::session::{DataSource, PoolStatus, Session};

pub struct SqliteSession {
    pool: SqlitePool,
    conn: Option<PoolConnection<Sqlite>>,
    active: bool,
    released: bool,
}

impl SqliteSession {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            conn: None,
            active: false,
            released: false,
        }
    }

    fn conn_mut(&mut self, phase: &'static str) -> TxResult<&mut PoolConnection<Sqlite>> {
        self.conn
            .as_mut()
            .ok_or_else(|| TxError::session_lifecycle(phase, anyhow::anyhow!("session not connected")))
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn connect(&mut self) -> TxResult<()> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| TxError::session_lifecycle("connect", e))?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> TxResult<()> {
        if let Some(level) = isolation {
            // SQLite has no `SET TRANSACTION ISOLATION LEVEL`; its file
            // locking already gives serializable semantics. We log the
            // request rather than silently dropping it so callers on a
            // driver that does honor isolation levels aren't misled by
            // this adapter's behaviour.
            debug!(isolation = level.as_sql(), "sqlite ignores explicit isolation level, already serializable");
        }
        let conn = self.conn_mut("begin")?;
        conn.execute("BEGIN")
            .await
            .map_err(|e| TxError::session_lifecycle("begin", e))?;
        self.active = true;
        Ok(())
    }

    async fn commit(&mut self) -> TxResult<()> {
        let conn = self.conn_mut("commit")?;
        conn.execute("COMMIT")
            .await
            .map_err(|e| TxError::session_lifecycle("commit", e))?;
        self.active = false;
        Ok(())
    }

    async fn rollback(&mut self) -> TxResult<()> {
        let conn = self.conn_mut("rollback")?;
        conn.execute("ROLLBACK")
            .await
            .map_err(|e| TxError::session_lifecycle("rollback", e))?;
        self.active = false;
        Ok(())
    }

    async fn release(&mut self) -> TxResult<()> {
        // Dropping the `PoolConnection` returns it to the pool; sqlx
        // has no separate async "release" call, so this is where the
        // handle is actually dropped.
        self.conn = None;
        self.released = true;
        Ok(())
    }

    async fn execute_raw(&mut self, statement: &str) -> TxResult<()> {
        let conn = self.conn_mut("execute_raw")?;
        conn.execute(statement)
            .await
            .map_err(|e| TxError::session_lifecycle("execute_raw", e))?;
        Ok(())
    }

    fn is_transaction_active(&self) -> bool {
        self.active
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn entity_manager(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        Some(Arc::new(self.pool.clone()))
    }
}

/// A single SQLite backing pool, installed into the [`crate::metadata::MetadataRegistry`]
/// under a configurable name by [`crate::bootstrap::bootstrap`].
pub struct SqliteDataSource {
    pool: SqlitePool,
}

impl SqliteDataSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn acquire_session(&self) -> TxResult<Box<dyn Session>> {
        Ok(Box::new(SqliteSession::new(self.pool.clone())))
    }

    fn is_initialized(&self) -> bool {
        !self.pool.is_closed()
    }

    fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            initialized: self.is_initialized(),
            has_metadata: true,
        }
    }
}
