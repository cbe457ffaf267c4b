// src/config.rs
// Global, runtime-mutable transaction manager configuration.
//
// Mirrors the teacher's `MiraConfig::from_env()` convention (domain
// config struct with env-backed defaults) but, unlike that one-shot
// `lazy_static`, this config is explicitly mutable at runtime via
// `TransactionManager::configure`, so it lives behind an `ArcSwap`
// rather than being read once at process start.

use std::time::Duration;

use crate::options::IsolationLevel;

/// Global defaults and guardrails, mutable at runtime via
/// `TransactionManager::configure`.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    /// Filled into a call's `timeout` when unset.
    pub default_timeout: Option<Duration>,
    /// Filled into a call's `isolation` when unset.
    pub default_isolation: Option<IsolationLevel>,
    /// Nested (`NESTED`) scopes deeper than this are rejected.
    pub max_nested_depth: u32,
    /// Toggles `Statistics::update` from a no-op.
    pub enable_stats: bool,
    /// Toggles lifecycle `tracing` events and the query-log adapter.
    pub enable_logging: bool,
    /// How often the registry reclaimer scans for stale contexts.
    pub cleanup_interval: Duration,
    /// Contexts older than this are forcibly rolled back and released.
    pub max_context_age: Duration,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            default_isolation: None,
            max_nested_depth: 10,
            enable_stats: true,
            enable_logging: true,
            cleanup_interval: Duration::from_secs(5 * 60),
            max_context_age: Duration::from_secs(30 * 60),
        }
    }
}

/// A partial update accepted by `TransactionManager::configure`; unset
/// fields leave the current value untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub default_timeout: Option<Duration>,
    pub default_isolation: Option<IsolationLevel>,
    pub max_nested_depth: Option<u32>,
    pub enable_stats: Option<bool>,
    pub enable_logging: Option<bool>,
    pub cleanup_interval: Option<Duration>,
    pub max_context_age: Option<Duration>,
}

impl GlobalConfig {
    /// Apply a partial update, returning whether `cleanup_interval`
    /// changed (the caller restarts the reclaimer timer when it has).
    pub fn merge(&mut self, update: ConfigUpdate) -> bool {
        let mut interval_changed = false;
        if let Some(v) = update.default_timeout {
            self.default_timeout = Some(v);
        }
        if let Some(v) = update.default_isolation {
            self.default_isolation = Some(v);
        }
        if let Some(v) = update.max_nested_depth {
            self.max_nested_depth = v;
        }
        if let Some(v) = update.enable_stats {
            self.enable_stats = v;
        }
        if let Some(v) = update.enable_logging {
            self.enable_logging = v;
        }
        if let Some(v) = update.cleanup_interval {
            if v != self.cleanup_interval {
                interval_changed = true;
            }
            self.cleanup_interval = v;
        }
        if let Some(v) = update.max_context_age {
            self.max_context_age = v;
        }
        interval_changed
    }

    /// Load defaults from the environment (`TX_*` variables), following
    /// the teacher's `dotenvy`-then-env-var loading convention. Missing
    /// or unparsable variables fall back to `Default::default()` values
    /// silently, matching `MiraConfig::from_env`'s "don't panic if `.env`
    /// doesn't exist" posture.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("TX_DEFAULT_TIMEOUT_MS") {
            if let Ok(ms) = raw.parse::<u64>() {
                config.default_timeout = Some(Duration::from_millis(ms));
            }
        }
        if let Ok(raw) = std::env::var("TX_MAX_NESTED_DEPTH") {
            if let Ok(v) = raw.parse::<u32>() {
                config.max_nested_depth = v;
            }
        }
        if let Ok(raw) = std::env::var("TX_ENABLE_STATS") {
            config.enable_stats = parse_bool(&raw, config.enable_stats);
        }
        if let Ok(raw) = std::env::var("TX_ENABLE_LOGGING") {
            config.enable_logging = parse_bool(&raw, config.enable_logging);
        }
        if let Ok(raw) = std::env::var("TX_CLEANUP_INTERVAL_SECS") {
            if let Ok(secs) = raw.parse::<u64>() {
                config.cleanup_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(raw) = std::env::var("TX_MAX_CONTEXT_AGE_SECS") {
            if let Ok(secs) = raw.parse::<u64>() {
                config.max_context_age = Duration::from_secs(secs);
            }
        }

        config
    }
}

fn parse_bool(raw: &str, fallback: bool) -> bool {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => fallback,
    }
}
