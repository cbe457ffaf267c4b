// src/bootstrap.rs
// Plugin bootstrap: merges user-supplied datasource options with
// defaults, validates them, builds the concrete sqlite datasource, and
// installs it into the metadata registry. Spec.md §9 calls this
// "deliberately excluded from the core" but still required of a
// complete reimplementation, so it lives here rather than in
// `aspect`/`context`/`registry`/`stats`.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Notify;
use tracing::info;

use crate::datasource::SqliteDataSource;
use crate::error::{TxError, TxResult};
use crate::metadata::MetadataRegistry;

/// Connection options for one datasource, as accepted by [`bootstrap`].
/// Mirrors the shape of the "required `type`; for non-embedded engines,
/// at least one of `host` or a connection URL plus a database name"
/// validation spec.md §9 specifies.
#[derive(Debug, Clone, Default)]
pub struct DataSourceOptions {
    /// Engine kind, e.g. `"sqlite"` or `"postgres"`. Required.
    pub kind: Option<String>,
    /// `true` for embedded engines (sqlite, in-memory) that need
    /// neither a host nor a URL.
    pub embedded: bool,
    pub host: Option<String>,
    pub url: Option<String>,
    pub database: Option<String>,
    pub max_connections: u32,
    /// Name this datasource is installed under (default `"DB"`).
    pub name: String,
}

impl DataSourceOptions {
    pub fn merged_with_defaults(mut self) -> Self {
        if self.name.is_empty() {
            self.name = "DB".to_string();
        }
        if self.max_connections == 0 {
            self.max_connections = 5;
        }
        self
    }

    fn validate(&self) -> TxResult<()> {
        let kind = self
            .kind
            .as_deref()
            .ok_or_else(|| TxError::InvalidConfig("datasource `kind` is required".to_string()))?;

        if !self.embedded && self.host.is_none() && self.url.is_none() {
            return Err(TxError::InvalidConfig(format!(
                "datasource `{kind}` requires `host` or a connection `url`"
            )));
        }
        if !self.embedded && self.database.is_none() {
            return Err(TxError::InvalidConfig(format!(
                "datasource `{kind}` requires a `database` name"
            )));
        }
        Ok(())
    }
}

/// Handle returned by [`bootstrap`]; holds the shutdown signal that
/// releases the pool on application stop.
pub struct BootstrapHandle {
    shutdown: Arc<Notify>,
}

impl BootstrapHandle {
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

/// Validate `options`, build the sqlite pool, and install it into
/// `registry` under `options.name` (default `"DB"`).
pub async fn bootstrap(
    registry: &MetadataRegistry,
    options: DataSourceOptions,
) -> TxResult<BootstrapHandle> {
    let options = options.merged_with_defaults();
    options.validate()?;

    let url = options
        .url
        .clone()
        .unwrap_or_else(|| options.database.clone().unwrap_or_else(|| ":memory:".to_string()));

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect(&url)
        .await
        .map_err(|e| TxError::session_lifecycle("bootstrap-connect", e))?;

    let datasource = Arc::new(SqliteDataSource::new(pool));
    registry.install(options.name.clone(), datasource.clone());
    info!(datasource = %options.name, "installed datasource into metadata registry");

    let shutdown = Arc::new(Notify::new());
    let shutdown_task = shutdown.clone();
    let name = options.name.clone();
    tokio::spawn(async move {
        shutdown_task.notified().await;
        info!(datasource = %name, "shutdown signalled, releasing datasource pool");
        datasource.pool().close().await;
    });

    Ok(BootstrapHandle { shutdown })
}
