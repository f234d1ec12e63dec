//! Worker capability trait

use rivalscope_core::{UnitOutput, WorkUnit};
use std::collections::BTreeMap;

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Outputs of a unit's dependencies, keyed by unit id.
///
/// Keyed by identity rather than arrival order, so a unit with several
/// dependencies sees the same inputs however its siblings were scheduled.
pub type UnitInputs = BTreeMap<String, UnitOutput>;

/// Worker error types
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker failed: {0}")]
    Failed(String),

    #[error("output violates contract {contract}: {reason}")]
    ContractViolation { contract: String, reason: String },

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl WorkerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn contract(contract: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            contract: contract.into(),
            reason: reason.into(),
        }
    }
}

/// The worker capability. Implement this to back work units with something real.
///
/// The orchestrator calls `invoke` at most once per unit per pipeline run and
/// never retries; implementations must not assume a retry will happen.
#[async_trait::async_trait]
pub trait Worker: Send + Sync {
    /// Backend name for logs and reports (e.g. "stub", "anthropic").
    fn name(&self) -> &str;

    /// Execute one unit given its dependencies' outputs.
    ///
    /// When `unit.expected_output` names a contract, the returned content must
    /// conform to it; otherwise return [`WorkerError::ContractViolation`].
    async fn invoke(&self, unit: &WorkUnit, inputs: &UnitInputs) -> WorkerResult<UnitOutput>;
}
