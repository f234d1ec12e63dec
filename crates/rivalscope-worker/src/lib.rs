//! Rivalscope Worker - the capability seam between orchestration and the work itself
//!
//! The orchestrator only ever sees the [`Worker`] trait. Backends:
//! - [`StubWorker`]: deterministic offline output
//! - [`ScriptedWorker`]: test double with scripted failures, delays and an invocation log
//! - [`AnthropicWorker`]: Anthropic Messages API

pub mod anthropic;
pub mod capability;
pub mod prompt;
pub mod scripted;
pub mod stub;

pub use anthropic::AnthropicWorker;
pub use capability::{UnitInputs, Worker, WorkerError, WorkerResult};
pub use scripted::ScriptedWorker;
pub use stub::StubWorker;

use rivalscope_core::config::{WorkerBackend, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;

/// Build the configured worker backend. The Anthropic backend reads its key
/// from `ANTHROPIC_API_KEY`.
pub fn from_config(config: &WorkerConfig) -> WorkerResult<Arc<dyn Worker>> {
    match config.backend {
        WorkerBackend::Stub => Ok(Arc::new(
            StubWorker::new().with_latency(Duration::from_millis(config.stub_latency_ms)),
        )),
        WorkerBackend::Anthropic => {
            let api_key = std::env::var("ANTHROPIC_API_KEY")
                .map_err(|_| WorkerError::AuthFailed("ANTHROPIC_API_KEY is not set".into()))?;
            let mut worker = AnthropicWorker::new(api_key)
                .with_model(&config.model)
                .with_max_tokens(config.max_tokens);
            if let Some(url) = &config.api_url {
                worker = worker.with_base_url(url);
            }
            Ok(Arc::new(worker))
        }
    }
}
