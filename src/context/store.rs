// src/context/store.rs
// Ambient, asynchronously-propagated context storage.
//
// Grounded on the `tokio::task_local!` + `.scope(...)` pattern used
// elsewhere in the corpus for per-task execution context that must
// survive `.await` points on a multi-threaded runtime (and, separately,
// for a task-local transaction-bypass guard around a raw `sqlx`
// connection). A plain `static`/thread-local keyed by "current thread"
// is explicitly rejected by the design: it would coalesce concurrent
// transactions under a multi-threaded executor.

use std::sync::Arc;

use super::TransactionContext;

tokio::task_local! {
    static CURRENT: Option<Arc<TransactionContext>>;
}

/// The only acceptable cross-`.await` correlation mechanism for "am I
/// in a transaction?". Business code never reads a global directly.
pub struct ContextStore;

impl ContextStore {
    /// Cheap, side-effect-free lookup of the context bound to the
    /// calling task, if any.
    pub fn current() -> Option<Arc<TransactionContext>> {
        CURRENT.try_with(|c| c.clone()).unwrap_or(None)
    }

    /// Run `fut` such that `current()` returns `Some(ctx)` for the
    /// entire asynchronous extent of `fut` — including every
    /// continuation scheduled from within it — regardless of what was
    /// bound in the surrounding scope. A nested `run_in` inside `fut`
    /// overrides only within its own dynamic extent.
    pub async fn run_in<F, T>(ctx: Arc<TransactionContext>, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        CURRENT.scope(Some(ctx), fut).await
    }

    /// Run `fut` such that `current()` returns `None` throughout its
    /// asynchronous extent, regardless of the outer binding. This is a
    /// true suspension (a fresh task-local scope around the future),
    /// not a synchronous gap, so driver calls issued inside `fut`
    /// cannot implicitly enrol in any ambient transaction.
    pub async fn run_outside<F, T>(fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        CURRENT.scope(None, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSession;

    fn ctx() -> Arc<TransactionContext> {
        TransactionContext::new(
            "DB".into(),
            crate::options::TransactionOptions::default()
                .resolve(&crate::config::GlobalConfig::default()),
            Box::new(MockSession::new()),
        )
    }

    #[tokio::test]
    async fn current_is_none_outside_any_scope() {
        assert!(ContextStore::current().is_none());
    }

    #[tokio::test]
    async fn run_in_binds_current_across_awaits() {
        let c = ctx();
        let id = c.context_id;
        ContextStore::run_in(c, async {
            tokio::task::yield_now().await;
            let current = ContextStore::current().expect("bound");
            assert_eq!(current.context_id, id);
        })
        .await;
        assert!(ContextStore::current().is_none());
    }

    #[tokio::test]
    async fn run_outside_hides_the_outer_binding() {
        let c = ctx();
        ContextStore::run_in(c, async {
            assert!(ContextStore::current().is_some());
            ContextStore::run_outside(async {
                assert!(ContextStore::current().is_none());
            })
            .await;
            assert!(ContextStore::current().is_some());
        })
        .await;
    }

    #[tokio::test]
    async fn nested_run_in_overrides_only_its_own_extent() {
        let outer = ctx();
        let inner = ctx();
        let outer_id = outer.context_id;
        let inner_id = inner.context_id;
        ContextStore::run_in(outer, async {
            ContextStore::run_in(inner, async {
                assert_eq!(ContextStore::current().unwrap().context_id, inner_id);
            })
            .await;
            assert_eq!(ContextStore::current().unwrap().context_id, outer_id);
        })
        .await;
    }
}
