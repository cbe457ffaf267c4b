// src/registry.rs
// Process-wide context registry: leak detection and forced reclamation
// of contexts that outlive `max_context_age`.
//
// The reclaimer follows the teacher's background-task convention (a
// `tokio::spawn`ed loop that sleeps between cycles, logs and continues
// past cycle failures rather than aborting the loop) but is owned by a
// `JoinHandle` the caller can abort, matching spec.md's requirement
// that the timer never block process shutdown.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::context::TransactionContext;
use crate::id::ContextId;

/// `contextId -> TransactionContext`, used for leak detection and
/// diagnostics. Never consulted on the hot path of a transactional
/// call beyond the insert/remove at its boundaries.
#[derive(Default)]
pub struct Registry {
    contexts: DashMap<ContextId, Arc<TransactionContext>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, ctx: Arc<TransactionContext>) {
        self.contexts.insert(ctx.context_id, ctx);
    }

    pub fn remove(&self, id: ContextId) {
        self.contexts.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Snapshot of currently-registered contexts, used by the reclaimer
    /// so it never holds a `DashMap` shard lock across an `.await`.
    fn snapshot(&self) -> Vec<Arc<TransactionContext>> {
        self.contexts.iter().map(|e| e.value().clone()).collect()
    }

    /// Scan once for contexts older than `max_age`, rolling each back
    /// and releasing its session. Errors during reclamation are logged,
    /// never surfaced — this is a leak-prevention backstop, not a path
    /// a well-behaved caller ever exercises.
    pub async fn reclaim_stale(&self, max_age: Duration) {
        for ctx in self.snapshot() {
            if ctx.elapsed_ms() as u128 <= max_age.as_millis() {
                continue;
            }
            warn!(
                context_id = %ctx.context_id,
                age_ms = ctx.elapsed_ms(),
                "reclaiming leaked transaction context"
            );
            let mut session = ctx.session().lock().await;
            if session.is_transaction_active() {
                if let Err(err) = session.rollback().await {
                    warn!(context_id = %ctx.context_id, error = %err, "rollback failed during reclamation");
                }
            }
            if !session.is_released() {
                if let Err(err) = session.release().await {
                    warn!(context_id = %ctx.context_id, error = %err, "release failed during reclamation");
                }
            }
            drop(session);
            self.remove(ctx.context_id);
        }
    }
}

/// Handle to the spawned cleanup loop; dropping or calling [`CleanupHandle::stop`]
/// aborts it. Never prevents process shutdown on its own.
pub struct CleanupHandle {
    handle: JoinHandle<()>,
}

impl CleanupHandle {
    pub fn spawn(registry: Arc<Registry>, interval: Duration, max_age: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so we wait a
            // full interval before the first scan.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!(live_contexts = registry.len(), "running registry reclamation scan");
                registry.reclaim_stale(max_age).await;
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
