// src/aspect/mod.rs
// The transaction aspect: the coordinator invoked around every
// decorated method. Consults the context store, applies the
// propagation dispatch table of spec.md §4.4, acquires/starts/commits/
// rolls back a session, drives the savepoint stack for `NESTED` scopes,
// enforces timeouts, fires hooks, and updates statistics exactly once
// per call.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::GlobalConfig;
use crate::context::{ContextState, ContextStore, TransactionContext};
use crate::error::{TxError, TxResult};
use crate::metadata::MetadataRegistry;
use crate::options::{EffectiveOptions, Hook, Propagation, TransactionOptions};
use crate::registry::Registry;
use crate::stats::Statistics;

const READ_ONLY_STATEMENT: &str = "SET TRANSACTION READ ONLY";

/// The coordinator described by spec.md §4.4. Holds only references to
/// the collaborators it needs (metadata registry, context registry,
/// statistics) so it can be unit-tested against the fakes in
/// `crate::testing` without a real database.
pub struct Aspect {
    metadata: Arc<MetadataRegistry>,
    registry: Arc<Registry>,
    stats: Arc<Statistics>,
}

impl Aspect {
    pub fn new(metadata: Arc<MetadataRegistry>, registry: Arc<Registry>, stats: Arc<Statistics>) -> Self {
        Self {
            metadata,
            registry,
            stats,
        }
    }

    /// The statistics collector this aspect updates — exposed so
    /// callers wiring up their own `Aspect` (tests, or an alternate
    /// `TransactionManager`) can read back `getStats()` without going
    /// through the global singleton.
    pub fn stats(&self) -> &Arc<Statistics> {
        &self.stats
    }

    /// Entry point: `(options, continuation)`, per spec.md §4.4. `body`
    /// is called at most once. Statistics are updated exactly once,
    /// regardless of which branch of the dispatch table is taken.
    pub async fn invoke<F, Fut, T>(&self, options: TransactionOptions, config: &GlobalConfig, body: F) -> TxResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let effective = options.resolve(config);
        let current = ContextStore::current();
        let started = Instant::now();

        let result = self.dispatch(effective, config, current, body).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        self.stats.update(duration_ms, result.is_ok(), config.enable_stats);
        result
    }

    /// The `(propagation, current_context)` decision matrix of spec.md
    /// §4.4's table, one arm per cell.
    async fn dispatch<F, Fut, T>(
        &self,
        effective: EffectiveOptions,
        config: &GlobalConfig,
        current: Option<Arc<TransactionContext>>,
        body: F,
    ) -> TxResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        use Propagation::*;

        match (effective.propagation, current) {
            (Required, None) => self.run_new_root(effective, None, body).await,
            (Required, Some(ctx)) => Self::run_existing(ctx, body).await,

            (RequiresNew, _) => self.run_new_root(effective, None, body).await,

            (Supports, None) => Self::run_without_context(body).await,
            (Supports, Some(ctx)) => Self::run_existing(ctx, body).await,

            (NotSupported, None) => Self::run_without_context(body).await,
            (NotSupported, Some(_)) => Self::run_suspended(body).await,

            (Never, None) => Self::run_without_context(body).await,
            (Never, Some(_)) => Err(TxError::propagation_violation(
                "NEVER invoked inside an active transaction",
            )),

            (Mandatory, None) => Err(TxError::propagation_violation(
                "MANDATORY invoked outside an active transaction",
            )),
            (Mandatory, Some(ctx)) => Self::run_existing(ctx, body).await,

            (Nested, None) => self.run_new_root(effective, None, body).await,
            (Nested, Some(ctx)) => self.run_nested(ctx, config, body).await,
        }
    }

    /// "Run under existing context": no begin, no commit — the
    /// continuation observes the enclosing transaction unchanged.
    async fn run_existing<F, Fut, T>(ctx: Arc<TransactionContext>, body: F) -> TxResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        ContextStore::run_in(ctx, body()).await.map_err(TxError::BodyFailure)
    }

    /// "Run without context": there was no ambient transaction and none
    /// is created; business code calling `is_in_transaction()` sees `false`.
    async fn run_without_context<F, Fut, T>(body: F) -> TxResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        body().await.map_err(TxError::BodyFailure)
    }

    /// `NOT_SUPPORTED` with an ambient transaction: the outer context
    /// stays open (we never touch it), but the inner body runs under a
    /// true suspension so it cannot implicitly enrol in it.
    async fn run_suspended<F, Fut, T>(body: F) -> TxResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        ContextStore::run_outside(body()).await.map_err(TxError::BodyFailure)
    }

    /// New-context creation lifecycle, spec.md §4.4.1's nine steps.
    /// `parent` is accepted for callers constructing an explicit parent
    /// chain but the aspect's own dispatch never supplies one — see the
    /// note on `TransactionContext::with_parent`.
    async fn run_new_root<F, Fut, T>(
        &self,
        effective: EffectiveOptions,
        parent: Option<Arc<TransactionContext>>,
        body: F,
    ) -> TxResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // Step 1: resolve datasource.
        let datasource_name = effective.datasource_name.clone();
        let datasource = self
            .metadata
            .get(&datasource_name)
            .filter(|ds| ds.is_initialized())
            .ok_or_else(|| TxError::DataSourceUnavailable(datasource_name.clone()))?;

        // Step 2: acquire session, compose the context.
        let session = datasource.acquire_session().await?;
        let ctx = match &parent {
            Some(p) => TransactionContext::with_parent(datasource_name, effective, session, p),
            None => TransactionContext::new(datasource_name, effective, session),
        };

        // Steps 3-4: connect, begin (with isolation if set), read-only
        // mode. A failure here aborts the call outright — no commit, no
        // rollback (the transaction never began), just an attempted
        // release per §7's "begin failures ... attempt release".
        if let Err(err) = self.connect_and_begin(&ctx).await {
            self.release_only(&ctx).await;
            return Err(err);
        }

        // Step 5: `before_commit` fires after begin, before the body —
        // see the surprising-ordering note on `Hooks::before_commit`.
        if let Some(hook) = ctx.options.hooks.before_commit.clone() {
            if let Err(err) = Self::run_hook(&hook, &ctx).await {
                return self.fail_new_root(&ctx, TxError::BodyFailure(err)).await;
            }
        }

        // Step 6: run the body under the context, racing a timeout if set.
        ctx.set_active(true);
        self.registry.insert(ctx.clone());
        ctx.set_state(ContextState::Running);

        let body_outcome = match ctx.options.timeout {
            Some(timeout) => {
                let fut = ContextStore::run_in(ctx.clone(), body());
                tokio::pin!(fut);
                tokio::select! {
                    res = &mut fut => res.map_err(TxError::BodyFailure),
                    _ = tokio::time::sleep(timeout) => Err(TxError::TransactionTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                        context_id: ctx.context_id,
                    }),
                }
            }
            None => ContextStore::run_in(ctx.clone(), body()).await.map_err(TxError::BodyFailure),
        };

        match body_outcome {
            Ok(value) => self.succeed_new_root(&ctx, value).await,
            Err(err) => self.fail_new_root(&ctx, err).await,
        }
    }

    async fn connect_and_begin(&self, ctx: &Arc<TransactionContext>) -> TxResult<()> {
        let mut session = ctx.session().lock().await;
        session.connect().await?;
        ctx.set_state(ContextState::Connected);

        session.begin(ctx.options.isolation).await?;
        ctx.set_state(ContextState::Begun);

        if ctx.options.read_only {
            session.execute_raw(READ_ONLY_STATEMENT).await?;
            ctx.set_state(ContextState::ReadOnlySet);
        }
        Ok(())
    }

    /// Used only on the begin-failure path: the context was never
    /// marked active or inserted into the registry, so cleanup is just
    /// an attempted release (logged, never surfaced) and a state mark.
    async fn release_only(&self, ctx: &Arc<TransactionContext>) {
        let mut session = ctx.session().lock().await;
        if !session.is_released() {
            if let Err(err) = session.release().await {
                warn!(context_id = %ctx.context_id, error = %err, "session release failed after begin failure");
            }
        }
        ctx.set_state(ContextState::Released);
    }

    /// Step 7 + 9: commit, fire `after_commit` (swallowed), update state,
    /// release, deregister.
    async fn succeed_new_root<T>(&self, ctx: &Arc<TransactionContext>, value: T) -> TxResult<T> {
        ctx.set_state(ContextState::Committing);
        let commit_result = {
            let mut session = ctx.session().lock().await;
            session.commit().await
        };

        let outcome = match commit_result {
            Ok(()) => {
                ctx.set_state(ContextState::Committed);
                if let Some(hook) = ctx.options.hooks.after_commit.clone() {
                    if let Err(err) = Self::run_hook(&hook, ctx).await {
                        warn!(context_id = %ctx.context_id, error = %err, "afterCommit hook failed, swallowed");
                    }
                }
                Ok(value)
            }
            Err(err) => {
                warn!(context_id = %ctx.context_id, error = %err, "commit failed, attempting rollback");
                self.attempt_rollback_after_failure(ctx).await;
                Err(err)
            }
        };

        self.cleanup(ctx).await;
        outcome
    }

    /// Step 8 + 9: `before_rollback` (swallowed), rollback if still
    /// active (log failures, keep the original error), `after_rollback`
    /// (swallowed), release, deregister. The original error — never a
    /// rollback/hook error — is what is returned.
    async fn fail_new_root<T>(&self, ctx: &Arc<TransactionContext>, err: TxError) -> TxResult<T> {
        if let Some(hook) = ctx.options.hooks.before_rollback.clone() {
            if let Err(hook_err) = Self::run_hook(&hook, ctx).await {
                warn!(context_id = %ctx.context_id, error = %hook_err, "beforeRollback hook failed, swallowed");
            }
        }

        self.attempt_rollback_after_failure(ctx).await;

        if let Some(hook) = ctx.options.hooks.after_rollback.clone() {
            if let Err(hook_err) = Self::run_hook(&hook, ctx).await {
                warn!(context_id = %ctx.context_id, error = %hook_err, "afterRollback hook failed, swallowed");
            }
        }

        self.cleanup(ctx).await;
        Err(err)
    }

    async fn attempt_rollback_after_failure(&self, ctx: &Arc<TransactionContext>) {
        ctx.set_state(ContextState::RollingBack);
        let mut session = ctx.session().lock().await;
        if session.is_transaction_active() {
            if let Err(err) = session.rollback().await {
                warn!(context_id = %ctx.context_id, error = %err, "rollback failed, original error still surfaces");
            }
        }
        ctx.set_state(ContextState::RolledBack);
    }

    /// Step 9's release + deregister, common to both the success and
    /// failure tails. Release failures are always logged, never surfaced.
    async fn cleanup(&self, ctx: &Arc<TransactionContext>) {
        {
            let mut session = ctx.session().lock().await;
            if !session.is_released() {
                if let Err(err) = session.release().await {
                    warn!(context_id = %ctx.context_id, error = %err, "session release failed");
                }
            }
        }
        ctx.set_state(ContextState::Released);
        ctx.set_active(false);
        self.registry.remove(ctx.context_id);
    }

    /// `NESTED` with an ambient context: push a savepoint, run the body
    /// under the same context, then release or roll back to the
    /// savepoint. The enclosing root's session stays open throughout —
    /// this never touches the registry or the root's `active` flag.
    async fn run_nested<F, Fut, T>(&self, ctx: Arc<TransactionContext>, config: &GlobalConfig, body: F) -> TxResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if ctx.depth() >= config.max_nested_depth {
            return Err(TxError::NestingLimitExceeded {
                depth: ctx.depth(),
                max: config.max_nested_depth,
            });
        }

        let savepoint = ctx.push_savepoint();
        {
            let mut session = ctx.session().lock().await;
            if let Err(err) = session.execute_raw(&format!("SAVEPOINT {savepoint}")).await {
                ctx.release_savepoint(&savepoint);
                return Err(err);
            }
        }
        debug!(context_id = %ctx.context_id, savepoint = %savepoint, "savepoint pushed");

        let body_result = ContextStore::run_in(ctx.clone(), body()).await;

        let mut session = ctx.session().lock().await;
        match body_result {
            Ok(value) => {
                let release = session.execute_raw(&format!("RELEASE SAVEPOINT {savepoint}")).await;
                ctx.release_savepoint(&savepoint);
                release?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.execute_raw(&format!("ROLLBACK TO SAVEPOINT {savepoint}")).await {
                    warn!(context_id = %ctx.context_id, savepoint = %savepoint, error = %rollback_err, "rollback to savepoint failed");
                }
                ctx.rollback_to_savepoint(&savepoint);
                Err(TxError::BodyFailure(err))
            }
        }
    }

    async fn run_hook(hook: &Hook, ctx: &TransactionContext) -> anyhow::Result<()> {
        hook(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::options::{Hooks, IsolationLevel};
    use crate::testing::{FailurePoints, MockDataSource};
    use parking_lot::Mutex as SyncMutex;
    use std::sync::Arc as StdArc;

    fn aspect_with(datasource: MockDataSource) -> (Aspect, Arc<MetadataRegistry>) {
        let metadata = MetadataRegistry::new();
        metadata.install("DB", StdArc::new(datasource));
        let aspect = Aspect::new(metadata.clone(), Registry::new(), StdArc::new(Statistics::new()));
        (aspect, metadata)
    }

    #[tokio::test]
    async fn s1_commit_path_records_connect_begin_commit_release() {
        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();

        let result = aspect
            .invoke(TransactionOptions::default(), &config, || async { Ok::<_, anyhow::Error>(42) })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(
            log.lock().clone(),
            vec!["connect", "begin", "commit", "release"]
        );
    }

    #[tokio::test]
    async fn s2_rollback_path_surfaces_the_original_body_error() {
        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();

        let result = aspect
            .invoke(TransactionOptions::default(), &config, || async {
                Err::<(), _>(anyhow::anyhow!("boom"))
            })
            .await;

        assert!(matches!(result, Err(TxError::BodyFailure(_))));
        assert_eq!(result.unwrap_err().to_string(), "transactional body failed: boom");
        assert_eq!(log.lock().clone(), vec!["connect", "begin", "rollback", "release"]);
    }

    #[tokio::test]
    async fn s3_isolation_and_read_only_are_applied_in_order() {
        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();

        let opts = TransactionOptions {
            isolation: Some(IsolationLevel::ReadCommitted),
            read_only: true,
            ..Default::default()
        };

        aspect
            .invoke(opts, &config, || async { Ok::<_, anyhow::Error>("r") })
            .await
            .unwrap();

        assert_eq!(
            log.lock().clone(),
            vec!["connect", "begin(READ COMMITTED)", "SET TRANSACTION READ ONLY", "commit", "release"]
        );
    }

    #[tokio::test]
    async fn s4_nested_success_then_nested_failure_on_one_session() {
        use crate::context::ContextStore;

        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();
        let aspect = StdArc::new(aspect);

        let outer_aspect = aspect.clone();
        let outer_config = config.clone();
        let result = aspect
            .invoke(TransactionOptions::default(), &config, move || {
                let aspect = outer_aspect.clone();
                let config = outer_config.clone();
                async move {
                    let nested_opts = TransactionOptions {
                        propagation: Propagation::Nested,
                        ..Default::default()
                    };
                    let r1 = aspect
                        .invoke(nested_opts.clone(), &config, || async { Ok::<_, anyhow::Error>("ok") })
                        .await;
                    assert_eq!(r1.unwrap(), "ok");

                    let r2: Result<(), TxError> = aspect
                        .invoke(nested_opts, &config, || async { Err::<(), _>(anyhow::anyhow!("inner boom")) })
                        .await;
                    assert!(r2.is_err());

                    let _ = ContextStore::current();
                    Ok::<_, anyhow::Error>(())
                }
            })
            .await;

        assert!(result.is_ok());
        let events = log.lock().clone();
        assert_eq!(events.len(), 8);
        assert_eq!(&events[0..2], &["connect", "begin"]);
        let sp0 = events[2].strip_prefix("SAVEPOINT ").expect("savepoint push");
        assert_eq!(events[3], format!("RELEASE SAVEPOINT {sp0}"));
        let sp1 = events[4].strip_prefix("SAVEPOINT ").expect("second savepoint push");
        assert_ne!(sp0, sp1);
        assert_eq!(events[5], format!("ROLLBACK TO SAVEPOINT {sp1}"));
        assert_eq!(&events[6..8], &["commit", "release"]);
    }

    #[tokio::test]
    async fn s5_never_violation_does_not_touch_a_session() {
        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();
        let aspect = StdArc::new(aspect);

        let outer_aspect = aspect.clone();
        let outer_config = config.clone();
        let result = aspect
            .invoke(TransactionOptions::default(), &config, move || {
                let aspect = outer_aspect.clone();
                let config = outer_config.clone();
                async move {
                    let never_opts = TransactionOptions {
                        propagation: Propagation::Never,
                        ..Default::default()
                    };
                    let inner: Result<(), TxError> = aspect
                        .invoke(never_opts, &config, || async { Ok::<_, anyhow::Error>(()) })
                        .await;
                    assert!(matches!(inner, Err(TxError::PropagationViolation(_))));
                    Ok::<_, anyhow::Error>(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(log.lock().clone(), vec!["connect", "begin", "commit", "release"]);
        assert_eq!(aspect.stats.get_stats().total, 2);
    }

    #[tokio::test]
    async fn s6_timeout_rolls_back_and_releases() {
        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();

        let opts = TransactionOptions {
            timeout: Some(std::time::Duration::from_millis(20)),
            ..Default::default()
        };

        let result = aspect
            .invoke(opts, &config, || async {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                Ok::<_, anyhow::Error>(())
            })
            .await;

        assert!(matches!(result, Err(TxError::TransactionTimeout { .. })));
        assert_eq!(log.lock().clone(), vec!["connect", "begin", "rollback", "release"]);
        assert_eq!(aspect.stats.get_stats().failed, 1);
    }

    #[tokio::test]
    async fn s7_requires_new_issues_a_disjoint_context_id() {
        use crate::context::ContextStore;

        let ds = MockDataSource::new();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();
        let aspect = StdArc::new(aspect);
        let captured: StdArc<SyncMutex<(Option<crate::id::ContextId>, Option<crate::id::ContextId>)>> =
            StdArc::new(SyncMutex::new((None, None)));

        let outer_aspect = aspect.clone();
        let outer_config = config.clone();
        let outer_captured = captured.clone();
        aspect
            .invoke(TransactionOptions::default(), &config, move || {
                let aspect = outer_aspect.clone();
                let config = outer_config.clone();
                let captured = outer_captured.clone();
                async move {
                    captured.lock().0 = ContextStore::current().map(|c| c.context_id);

                    let inner_opts = TransactionOptions {
                        propagation: Propagation::RequiresNew,
                        ..Default::default()
                    };
                    let inner_captured = captured.clone();
                    aspect
                        .invoke(inner_opts, &config, move || {
                            let inner_captured = inner_captured.clone();
                            async move {
                                inner_captured.lock().1 = ContextStore::current().map(|c| c.context_id);
                                Ok::<_, anyhow::Error>(())
                            }
                        })
                        .await
                        .unwrap();
                    Ok::<_, anyhow::Error>(())
                }
            })
            .await
            .unwrap();

        let (outer_id, inner_id) = *captured.lock();
        assert!(outer_id.is_some() && inner_id.is_some());
        assert_ne!(outer_id, inner_id);
    }

    #[tokio::test]
    async fn s8_not_supported_suspends_and_restores() {
        use crate::context::ContextStore;

        let ds = MockDataSource::new();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();
        let aspect = StdArc::new(aspect);

        let outer_aspect = aspect.clone();
        let outer_config = config.clone();
        let observed_inside: StdArc<SyncMutex<bool>> = StdArc::new(SyncMutex::new(true));
        let outer_observed = observed_inside.clone();

        aspect
            .invoke(TransactionOptions::default(), &config, move || {
                let aspect = outer_aspect.clone();
                let config = outer_config.clone();
                let observed_inside = outer_observed.clone();
                async move {
                    assert!(ContextStore::current().is_some());

                    let not_supported = TransactionOptions {
                        propagation: Propagation::NotSupported,
                        ..Default::default()
                    };
                    aspect
                        .invoke(not_supported, &config, move || {
                            let observed_inside = observed_inside.clone();
                            async move {
                                *observed_inside.lock() = ContextStore::current().is_some();
                                Ok::<_, anyhow::Error>(())
                            }
                        })
                        .await
                        .unwrap();

                    assert!(ContextStore::current().is_some());
                    Ok::<_, anyhow::Error>(())
                }
            })
            .await
            .unwrap();

        assert!(!*observed_inside.lock());
    }

    #[tokio::test]
    async fn mandatory_outside_a_transaction_fails_before_any_session_is_touched() {
        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();

        let opts = TransactionOptions {
            propagation: Propagation::Mandatory,
            ..Default::default()
        };
        let result: Result<(), TxError> = aspect.invoke(opts, &config, || async { Ok::<_, anyhow::Error>(()) }).await;

        assert!(matches!(result, Err(TxError::PropagationViolation(_))));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn nesting_limit_exceeded_creates_no_savepoint() {
        use crate::context::ContextStore;

        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let mut config = GlobalConfig::default();
        config.max_nested_depth = 0;
        let aspect = StdArc::new(aspect);

        let outer_aspect = aspect.clone();
        let outer_config = config.clone();
        aspect
            .invoke(TransactionOptions::default(), &config, move || {
                let aspect = outer_aspect.clone();
                let config = outer_config.clone();
                async move {
                    let nested = TransactionOptions {
                        propagation: Propagation::Nested,
                        ..Default::default()
                    };
                    let result: Result<(), TxError> =
                        aspect.invoke(nested, &config, || async { Ok::<_, anyhow::Error>(()) }).await;
                    assert!(matches!(result, Err(TxError::NestingLimitExceeded { .. })));
                    let _ = ContextStore::current();
                    Ok::<_, anyhow::Error>(())
                }
            })
            .await
            .unwrap();

        assert!(!log.lock().iter().any(|e| e.starts_with("SAVEPOINT")));
    }

    #[tokio::test]
    async fn before_commit_hook_failure_rolls_back_instead_of_committing() {
        let ds = MockDataSource::new();
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();

        let opts = TransactionOptions {
            hooks: Hooks {
                before_commit: Some(StdArc::new(|_ctx| {
                    Box::pin(async { Err(anyhow::anyhow!("hook failed")) })
                })),
                ..Default::default()
            },
            ..Default::default()
        };

        let result: Result<(), TxError> = aspect.invoke(opts, &config, || async { Ok::<_, anyhow::Error>(()) }).await;
        assert!(result.is_err());
        assert_eq!(log.lock().clone(), vec!["connect", "begin", "rollback", "release"]);
    }

    #[tokio::test]
    async fn commit_failure_attempts_rollback_and_surfaces_the_commit_error() {
        let ds = MockDataSource::with_failures(FailurePoints {
            commit: true,
            ..Default::default()
        });
        let log = ds.log();
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();

        let result = aspect
            .invoke(TransactionOptions::default(), &config, || async { Ok::<_, anyhow::Error>(()) })
            .await;

        assert!(matches!(result, Err(TxError::SessionLifecycle { phase: "commit", .. })));
        assert_eq!(log.lock().clone(), vec!["connect", "begin", "commit", "rollback", "release"]);
    }

    #[tokio::test]
    async fn release_failure_is_logged_and_never_surfaced() {
        let ds = MockDataSource::with_failures(FailurePoints {
            release: true,
            ..Default::default()
        });
        let (aspect, _meta) = aspect_with(ds);
        let config = GlobalConfig::default();

        let result = aspect
            .invoke(TransactionOptions::default(), &config, || async { Ok::<_, anyhow::Error>(7) })
            .await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn datasource_unavailable_when_not_registered() {
        let metadata = MetadataRegistry::new();
        let aspect = Aspect::new(metadata, Registry::new(), StdArc::new(Statistics::new()));
        let config = GlobalConfig::default();

        let result: Result<(), TxError> = aspect
            .invoke(TransactionOptions::default(), &config, || async { Ok::<_, anyhow::Error>(()) })
            .await;

        assert!(matches!(result, Err(TxError::DataSourceUnavailable(_))));
    }
}
