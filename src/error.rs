// src/error.rs
// Error taxonomy for the transaction aspect.

use crate::context::ContextId;
use thiserror::Error;

/// Errors raised by the transaction manager.
///
/// Variants map directly onto the error taxonomy of the design: system
/// preconditions that fail before any session is touched
/// (`PropagationViolation`, `NestingLimitExceeded`, `DataSourceUnavailable`),
/// a timed-out body (`TransactionTimeout`), the body's own error surfaced
/// unchanged (`BodyFailure`), and driver-level lifecycle failures
/// (`SessionLifecycle`).
#[derive(Error, Debug)]
pub enum TxError {
    #[error("propagation violation: {0}")]
    PropagationViolation(&'static str),

    #[error("nesting limit exceeded: depth {depth} >= max_nested_depth {max}")]
    NestingLimitExceeded { depth: u32, max: u32 },

    #[error("datasource unavailable: {0:?}")]
    DataSourceUnavailable(String),

    #[error("transaction timed out after {timeout_ms}ms (context {context_id:?})")]
    TransactionTimeout {
        timeout_ms: u64,
        context_id: ContextId,
    },

    #[error("transactional body failed: {0}")]
    BodyFailure(#[from] anyhow::Error),

    #[error("session lifecycle failure during {phase}: {source}")]
    SessionLifecycle {
        phase: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid datasource configuration: {0}")]
    InvalidConfig(String),
}

impl TxError {
    pub fn propagation_violation(msg: &'static str) -> Self {
        Self::PropagationViolation(msg)
    }

    pub fn session_lifecycle(phase: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::SessionLifecycle {
            phase,
            source: source.into(),
        }
    }
}

/// Result type used throughout the transaction manager.
pub type TxResult<T> = Result<T, TxError>;
