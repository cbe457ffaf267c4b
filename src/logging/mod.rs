// src/logging/mod.rs
// Lifecycle tracing plus the query-log adapter.

pub mod query_log;

pub use query_log::QueryLogAdapter;
