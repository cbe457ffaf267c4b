// src/options.rs
// Per-call options and the propagation/isolation vocabulary.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::config::GlobalConfig;
use crate::context::TransactionContext;

/// Propagation behaviour, as chosen on each decorated call.
///
/// See the dispatch table in `aspect::dispatch` for the full
/// `(propagation, current_context)` decision matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Required,
    RequiresNew,
    Supports,
    NotSupported,
    Never,
    Nested,
    Mandatory,
}

/// Database isolation level, accepted from callers in this canonical
/// (underscore) spelling and translated to the driver's spaced SQL
/// spelling only at the session-adapter boundary (`IsolationLevel::as_sql`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Render the SQL spelling drivers expect (`"READ COMMITTED"` etc).
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// A fallible, boxed async hook invoked at a fixed lifecycle point.
pub type Hook = Arc<dyn Fn(&TransactionContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// The four lifecycle hooks spec.md defines.
///
/// `before_commit` preserves a deliberately surprising name: per the
/// design notes it fires right after `begin` and before the decorated
/// body runs, not immediately before `commit`. This is kept for
/// behavioural compatibility rather than renamed to `after_begin`.
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_commit: Option<Hook>,
    pub after_commit: Option<Hook>,
    pub before_rollback: Option<Hook>,
    pub after_rollback: Option<Hook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_commit", &self.before_commit.is_some())
            .field("after_commit", &self.after_commit.is_some())
            .field("before_rollback", &self.before_rollback.is_some())
            .field("after_rollback", &self.after_rollback.is_some())
            .finish()
    }
}

/// Options supplied per decorated call. Any of `isolation`/`timeout`
/// left unset are filled from [`GlobalConfig`] defaults during
/// [`TransactionOptions::resolve`].
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub isolation: Option<IsolationLevel>,
    pub timeout: Option<Duration>,
    pub read_only: bool,
    pub propagation: Propagation,
    pub datasource_name: String,
    pub hooks: Hooks,
    pub name: Option<String>,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation: None,
            timeout: None,
            read_only: false,
            propagation: Propagation::Required,
            datasource_name: "DB".to_string(),
            hooks: Hooks::default(),
            name: None,
        }
    }
}

impl TransactionOptions {
    /// Fold in global defaults for any field the caller left unset.
    pub fn resolve(mut self, config: &GlobalConfig) -> EffectiveOptions {
        if self.isolation.is_none() {
            self.isolation = config.default_isolation;
        }
        if self.timeout.is_none() {
            self.timeout = config.default_timeout;
        }
        EffectiveOptions(self)
    }
}

/// [`TransactionOptions`] after global defaults have been folded in.
/// Immutable for the remainder of the call, as required by the data model.
#[derive(Debug, Clone)]
pub struct EffectiveOptions(TransactionOptions);

impl std::ops::Deref for EffectiveOptions {
    type Target = TransactionOptions;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
