// src/session.rs
// The driver-facing contract spec.md treats as an external collaborator
// ("Datasource... capable of creating sessions"). The core depends only
// on these traits; `datasource::sqlite` is the one concrete adapter this
// crate ships.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TxResult;
use crate::options::IsolationLevel;

/// A single stateful channel to the database. One [`TransactionContext`]
/// owns exactly one session for its entire lifetime.
///
/// [`TransactionContext`]: crate::context::TransactionContext
#[async_trait]
pub trait Session: Send + Sync {
    async fn connect(&mut self) -> TxResult<()>;
    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> TxResult<()>;
    async fn commit(&mut self) -> TxResult<()>;
    async fn rollback(&mut self) -> TxResult<()>;
    async fn release(&mut self) -> TxResult<()>;

    /// Execute a raw, driver-dialect statement (used for read-only mode
    /// and for savepoint push/pop, neither of which sqlx exposes as a
    /// typed API).
    async fn execute_raw(&mut self, statement: &str) -> TxResult<()>;

    fn is_transaction_active(&self) -> bool;
    fn is_released(&self) -> bool;

    /// The higher-level ORM handle riding on top of this session, if the
    /// adapter exposes one. Returned as an owned, cloneable handle (not
    /// borrowed from `&self`) so callers can hold it past the session
    /// lock's guard; downcast via `entity_manager()?.downcast_ref`.
    fn entity_manager(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

/// Current status of a datasource's underlying connection pool, as
/// returned by `TransactionManager::get_connection_pool_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub initialized: bool,
    pub has_metadata: bool,
}

/// A reference to a pool of sessions for a single backing database.
/// Datasources are shared, read-only references: many contexts may
/// acquire sessions from the same datasource concurrently, but each
/// acquired session is exclusively owned by the context that acquired it.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Acquire a fresh, unconnected session.
    async fn acquire_session(&self) -> TxResult<Box<dyn Session>>;

    fn is_initialized(&self) -> bool;

    fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            initialized: self.is_initialized(),
            has_metadata: true,
        }
    }
}
