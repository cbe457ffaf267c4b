// src/testing.rs
// In-memory Session/DataSource fakes that record the exact call
// sequence spec.md §8's scenarios assert against, following the
// teacher's `testing::mock_llm` convention of a recording fake driven
// through the same trait boundary the real adapter satisfies.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{TxError, TxResult};
use crate::options::IsolationLevel;
use crate::session::{DataSource, PoolStatus, Session};

/// Shared, ordered log of every call made against one or more
/// [`MockSession`]s created from the same [`MockDataSource`].
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Default, Clone, Copy)]
pub struct FailurePoints {
    pub begin: bool,
    pub commit: bool,
    pub rollback: bool,
    pub release: bool,
}

pub struct MockSession {
    log: CallLog,
    active: bool,
    released: bool,
    fail: FailurePoints,
}

impl MockSession {
    pub fn new() -> Self {
        Self::with_log(new_call_log())
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            active: false,
            released: false,
            fail: FailurePoints::default(),
        }
    }

    pub fn with_failures(log: CallLog, fail: FailurePoints) -> Self {
        Self {
            log,
            active: false,
            released: false,
            fail,
        }
    }

    fn record(&self, event: impl Into<String>) {
        self.log.lock().push(event.into());
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn connect(&mut self) -> TxResult<()> {
        self.record("connect");
        Ok(())
    }

    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> TxResult<()> {
        match isolation {
            Some(level) => self.record(format!("begin({})", level.as_sql())),
            None => self.record("begin"),
        }
        if self.fail.begin {
            return Err(TxError::session_lifecycle("begin", anyhow::anyhow!("mock begin failure")));
        }
        self.active = true;
        Ok(())
    }

    async fn commit(&mut self) -> TxResult<()> {
        self.record("commit");
        if self.fail.commit {
            return Err(TxError::session_lifecycle("commit", anyhow::anyhow!("mock commit failure")));
        }
        self.active = false;
        Ok(())
    }

    async fn rollback(&mut self) -> TxResult<()> {
        self.record("rollback");
        if self.fail.rollback {
            return Err(TxError::session_lifecycle("rollback", anyhow::anyhow!("mock rollback failure")));
        }
        self.active = false;
        Ok(())
    }

    async fn release(&mut self) -> TxResult<()> {
        self.record("release");
        if self.fail.release {
            return Err(TxError::session_lifecycle("release", anyhow::anyhow!("mock release failure")));
        }
        self.released = true;
        Ok(())
    }

    async fn execute_raw(&mut self, statement: &str) -> TxResult<()> {
        self.record(statement.to_string());
        Ok(())
    }

    fn is_transaction_active(&self) -> bool {
        self.active
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn entity_manager(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

/// A datasource that hands out [`MockSession`]s sharing one [`CallLog`],
/// so a test can assert the full cross-session sequence for scenarios
/// that acquire more than one session (e.g. `REQUIRES_NEW`).
pub struct MockDataSource {
    log: CallLog,
    initialized: bool,
    fail: FailurePoints,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self {
            log: new_call_log(),
            initialized: true,
            fail: FailurePoints::default(),
        }
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            initialized: true,
            fail: FailurePoints::default(),
        }
    }

    pub fn with_failures(fail: FailurePoints) -> Self {
        Self {
            log: new_call_log(),
            initialized: true,
            fail,
        }
    }

    pub fn uninitialized() -> Self {
        Self {
            log: new_call_log(),
            initialized: false,
            fail: FailurePoints::default(),
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn acquire_session(&self) -> TxResult<Box<dyn Session>> {
        Ok(Box::new(MockSession::with_failures(self.log.clone(), self.fail)))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            initialized: self.initialized,
            has_metadata: true,
        }
    }
}
