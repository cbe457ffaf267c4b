// src/context/mod.rs
// The transaction context: one session, one owning task, a savepoint
// stack, and the bookkeeping the aspect and registry both need.

pub mod store;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

pub use crate::id::ContextId;
use crate::options::EffectiveOptions;
use crate::session::Session;

pub use store::ContextStore;

/// Lifecycle state, tracked only for diagnostics/tracing — the aspect
/// is the sole writer and drives every transition in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    New,
    Connected,
    Begun,
    ReadOnlySet,
    Running,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    Released,
}

/// One logical transaction: a session, the options it was opened with,
/// and the savepoint stack for any `NESTED` scopes run within it.
///
/// A context exclusively owns its session for its entire lifetime: no
/// other context ever touches it. NESTED scopes reuse the *same*
/// context object (per the propagation dispatch table) rather than
/// spawning a child, so `parent` is populated only for contexts built
/// directly through [`TransactionContext::with_parent`] — the aspect
/// itself never sets it. See `DESIGN.md` for why.
pub struct TransactionContext {
    pub context_id: ContextId,
    pub datasource_name: String,
    pub options: EffectiveOptions,
    session: AsyncMutex<Box<dyn Session>>,
    start_time: Instant,
    start_time_ms: u64,
    parent: Option<Weak<TransactionContext>>,
    base_depth: u32,
    savepoints: Mutex<Vec<String>>,
    savepoint_counter: AtomicU32,
    active: AtomicBool,
    state: Mutex<ContextState>,
}

impl TransactionContext {
    pub fn new(datasource_name: String, options: EffectiveOptions, session: Box<dyn Session>) -> Arc<Self> {
        Self::build(datasource_name, options, session, None)
    }

    /// Construct a context with an explicit parent relationship. Not
    /// used by the aspect's propagation dispatch (see struct docs) but
    /// kept public for callers building contexts directly.
    pub fn with_parent(
        datasource_name: String,
        options: EffectiveOptions,
        session: Box<dyn Session>,
        parent: &Arc<TransactionContext>,
    ) -> Arc<Self> {
        Self::build(datasource_name, options, session, Some(Arc::downgrade(parent)))
    }

    fn build(
        datasource_name: String,
        options: EffectiveOptions,
        session: Box<dyn Session>,
        parent: Option<Weak<TransactionContext>>,
    ) -> Arc<Self> {
        let base_depth = parent
            .as_ref()
            .and_then(|p| p.upgrade())
            .map(|p| p.depth() + 1)
            .unwrap_or(0);

        Arc::new(Self {
            context_id: ContextId::generate(),
            datasource_name,
            options,
            session: AsyncMutex::new(session),
            start_time: Instant::now(),
            start_time_ms: now_ms(),
            parent,
            base_depth,
            savepoints: Mutex::new(Vec::new()),
            savepoint_counter: AtomicU32::new(0),
            active: AtomicBool::new(false),
            state: Mutex::new(ContextState::New),
        })
    }

    pub fn session(&self) -> &AsyncMutex<Box<dyn Session>> {
        &self.session
    }

    pub fn parent(&self) -> Option<Arc<TransactionContext>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Current nesting depth: the fixed depth inherited at creation
    /// plus however many savepoints are presently outstanding. This is
    /// what the invariant `depth == savepoints.length` in spec.md means
    /// in practice when `NESTED` reuses a single context object.
    pub fn depth(&self) -> u32 {
        self.base_depth + self.savepoints.lock().len() as u32
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn state(&self) -> ContextState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ContextState) {
        *self.state.lock() = state;
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms
    }

    /// `start_time_ms` rendered as RFC 3339, for diagnostics/log lines
    /// where a wall-clock timestamp reads better than an epoch integer.
    /// Falls back to the epoch itself if it somehow predates it.
    pub fn start_time_iso(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.start_time_ms as i64)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| self.start_time_ms.to_string())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Allocate and push the next savepoint name for a `NESTED` scope
    /// opened within this context, deterministically named
    /// `sp_<context_id>_<n>` where `n` is an ever-increasing counter
    /// (not the live stack length, which shrinks on release/rollback —
    /// reusing a freed index would re-issue a name already seen in logs).
    pub fn push_savepoint(&self) -> String {
        let n = self.savepoint_counter.fetch_add(1, Ordering::SeqCst);
        let name = format!("sp_{}_{}", self.context_id, n);
        self.savepoints.lock().push(name.clone());
        name
    }

    /// Remove exactly `name` from the outstanding stack (a successful
    /// `RELEASE SAVEPOINT`). Later savepoints, if any, remain.
    pub fn release_savepoint(&self, name: &str) {
        let mut stack = self.savepoints.lock();
        if let Some(pos) = stack.iter().rposition(|s| s == name) {
            stack.remove(pos);
        }
    }

    /// Truncate the outstanding stack to end just before `name` (a
    /// `ROLLBACK TO SAVEPOINT`): `name` itself and every savepoint
    /// created after it are invalidated and dropped.
    pub fn rollback_to_savepoint(&self, name: &str) {
        let mut stack = self.savepoints.lock();
        if let Some(pos) = stack.iter().position(|s| s == name) {
            stack.truncate(pos);
        }
    }

    pub fn outstanding_savepoints(&self) -> Vec<String> {
        self.savepoints.lock().clone()
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
