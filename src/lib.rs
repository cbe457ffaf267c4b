// src/lib.rs
// Declarative transaction management for async sqlx-based data access.
//
// Mirrors the teacher's single-crate layout (`backend/src/config/mod.rs`'s
// `lazy_static! { pub static ref CONFIG: ... }` for a process-wide
// singleton), adapted here to a `TransactionManager` that owns the four
// core collaborators (metadata registry, context registry, statistics,
// runtime-mutable config) behind one lazily-initialized instance.

pub mod aspect;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod datasource;
pub mod error;
pub mod id;
pub mod logging;
pub mod metadata;
pub mod options;
pub mod registry;
pub mod session;
pub mod stats;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use lazy_static::lazy_static;
use parking_lot::Mutex;

use aspect::Aspect;
use config::{ConfigUpdate, GlobalConfig};
use context::{ContextStore, TransactionContext};
use error::TxResult;
use metadata::MetadataRegistry;
use options::EffectiveOptions;
use registry::{CleanupHandle, Registry};
use session::PoolStatus;
use stats::{StatsSnapshot, Statistics};

pub use context::ContextId;
pub use error::TxError;
pub use options::{Hook, Hooks, IsolationLevel, Propagation, TransactionOptions};
pub use session::{DataSource, Session};
pub use txn_aspect_macros::transactional;

lazy_static! {
    static ref MANAGER: TransactionManager = TransactionManager::new();
}

/// Process-wide owner of the four core collaborators (spec.md §2):
/// metadata registry, context registry, statistics, and the
/// runtime-mutable global config. Exposed mostly through the static
/// free functions below (spec.md §6's "global configuration surface"
/// and "ambient helpers") — most callers never touch this type directly.
pub struct TransactionManager {
    metadata: Arc<MetadataRegistry>,
    registry: Arc<Registry>,
    stats: Arc<Statistics>,
    config: ArcSwap<GlobalConfig>,
    aspect: Aspect,
    cleanup: Mutex<Option<CleanupHandle>>,
}

impl TransactionManager {
    fn new() -> Self {
        let metadata = MetadataRegistry::new();
        let registry = Registry::new();
        let stats = Arc::new(Statistics::new());
        let config = GlobalConfig::from_env();
        let cleanup = CleanupHandle::spawn(registry.clone(), config.cleanup_interval, config.max_context_age);
        let aspect = Aspect::new(metadata.clone(), registry.clone(), stats.clone());

        Self {
            metadata,
            registry,
            stats,
            config: ArcSwap::from_pointee(config),
            aspect,
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    pub fn global() -> &'static TransactionManager {
        &MANAGER
    }

    pub fn metadata(&self) -> &Arc<MetadataRegistry> {
        &self.metadata
    }

    pub fn aspect(&self) -> &Aspect {
        &self.aspect
    }

    /// `TransactionManager.configure(partialConfig)` (spec.md §6):
    /// merges into the global config; restarts the cleanup timer if
    /// `cleanup_interval` changed.
    pub fn configure(&self, update: ConfigUpdate) {
        let mut next = (**self.config.load()).clone();
        let interval_changed = next.merge(update);
        let interval = next.cleanup_interval;
        let max_age = next.max_context_age;
        self.config.store(Arc::new(next));

        if interval_changed {
            let mut cleanup = self.cleanup.lock();
            if let Some(old) = cleanup.take() {
                old.stop();
            }
            *cleanup = Some(CleanupHandle::spawn(self.registry.clone(), interval, max_age));
        }
    }

    /// `TransactionManager.getConfig()`: a read-only snapshot.
    pub fn get_config(&self) -> GlobalConfig {
        (**self.config.load()).clone()
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.get_stats()
    }

    pub fn reset_stats(&self) {
        self.stats.reset()
    }

    /// `TransactionManager.stopCleanup()`: test/shutdown hook.
    pub fn stop_cleanup(&self) {
        if let Some(handle) = self.cleanup.lock().take() {
            handle.stop();
        }
    }

    /// `TransactionManager.getConnectionPoolStatus()`: status for the
    /// *current* context's datasource, or `None` outside any context.
    pub fn get_connection_pool_status(&self) -> Option<PoolStatus> {
        let ctx = ContextStore::current()?;
        let datasource = self.metadata.get(&ctx.datasource_name)?;
        Some(datasource.pool_status())
    }

    /// Run `options`' effective propagation/timeout/hooks rules around
    /// `body` via the aspect. This is what `#[transactional(...)]`
    /// expands to; also usable directly for programmatic call sites
    /// that don't want the attribute macro.
    pub async fn run<F, Fut, T>(&self, options: TransactionOptions, body: F) -> TxResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let config = self.get_config();
        self.aspect.invoke(options, &config, body).await
    }
}

/// Run `body` transactionally with `options`, against the global
/// [`TransactionManager`]. The function `#[transactional(...)]` calls
/// under the hood.
pub async fn run_transactional<F, Fut, T>(options: TransactionOptions, body: F) -> TxResult<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    TransactionManager::global().run(options, body).await
}

// ---- Ambient helpers (spec.md §6) ----
// Each reads the context bound by `ContextStore`; all return `None`
// (⊥) when called outside any context.

fn current_context() -> Option<Arc<TransactionContext>> {
    ContextStore::current()
}

/// `isInTransaction()`.
pub fn is_in_transaction() -> bool {
    current_context().is_some()
}

/// `currentSession()`. Exposes the session behind its lock, since the
/// trait object cannot be handed out by shared reference while active
/// async calls may hold the lock.
pub fn current_session() -> Option<Arc<TransactionContext>> {
    current_context()
}

/// `currentEntityManager()`: the downcastable ORM handle riding on the
/// current session, if the adapter exposes one. Returned as an owned
/// `Arc` so it outlives the session lock's guard; downcast via
/// `.downcast_ref::<ConcreteType>()`.
pub async fn current_entity_manager() -> Option<Arc<dyn std::any::Any + Send + Sync>> {
    let ctx = current_context()?;
    let session = ctx.session().lock().await;
    session.entity_manager()
}

/// `currentDatasource()`: the name of the datasource backing the
/// current context.
pub fn current_datasource_name() -> Option<String> {
    current_context().map(|ctx| ctx.datasource_name.clone())
}

/// `currentOptions()`.
pub fn current_options() -> Option<EffectiveOptions> {
    current_context().map(|ctx| ctx.options.clone())
}

/// `currentStartTime()`, in epoch milliseconds.
pub fn current_start_time() -> Option<u64> {
    current_context().map(|ctx| ctx.start_time_ms())
}

/// `currentDuration()`, elapsed milliseconds since the current
/// context's `startTime`.
pub fn current_duration_ms() -> Option<u64> {
    current_context().map(|ctx| ctx.elapsed_ms())
}

/// Global configuration surface, free-function form.
pub fn configure(update: ConfigUpdate) {
    TransactionManager::global().configure(update)
}

pub fn get_config() -> GlobalConfig {
    TransactionManager::global().get_config()
}

pub fn get_stats() -> StatsSnapshot {
    TransactionManager::global().get_stats()
}

pub fn reset_stats() {
    TransactionManager::global().reset_stats()
}

pub fn stop_cleanup() {
    TransactionManager::global().stop_cleanup()
}

pub fn get_connection_pool_status() -> Option<PoolStatus> {
    TransactionManager::global().get_connection_pool_status()
}

/// [`get_stats`] rendered as a `serde_json::Value`, for host applications
/// that want to expose the collector on a diagnostics/metrics endpoint
/// without taking a dependency on this crate's own types.
pub fn get_stats_json() -> serde_json::Value {
    serde_json::to_value(get_stats()).unwrap_or(serde_json::Value::Null)
}

/// Placeholder timeout constant mirroring the teacher's convention of
/// naming well-known durations at the crate root (`backend/src/config`
/// does the same for cache TTLs). Not referenced by the core; kept as
/// a documented default callers can opt into explicitly.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Install a `tracing_subscriber::FmtSubscriber` at `level`, matching
/// the teacher's `mira-server` CLI entry point convention (stderr
/// writer, no ANSI, no timestamps — safe for piping through other
/// tooling). Optional: callers embedding this crate into an
/// application that already configures its own subscriber should skip
/// this and rely on their own `tracing` setup instead.
pub fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
