//! Rivalscope - competitor analysis job orchestration
//!
//! The binary wires configuration, logging and the workspace crates together:
//! `rivalscope-core` (types, protocol, config), `rivalscope-worker` (the worker
//! capability), `rivalscope-pipeline` (jobs, pipelines, executor) and
//! `rivalscope-gateway` (HTTP).

pub mod cli;
pub mod logging;

use rivalscope_core::{ServiceConfig, SubmitRequest};
use rivalscope_pipeline::{store, AnalysisService, Job};

/// Run a single job to completion in-process with the configured worker and
/// store. Uses the bulk target limit.
pub async fn run_once(
    config: &ServiceConfig,
    tenant_id: &str,
    request: &SubmitRequest,
) -> anyhow::Result<Job> {
    let worker = rivalscope_worker::from_config(&config.worker)?;
    let results = store::from_config(&config.store);
    let service = AnalysisService::new(worker, results, &config.executor);

    let job = service
        .accept(tenant_id, request, config.limits.max_bulk_targets)
        .await?;
    service.executor().run(&job.id).await?;
    Ok(service.job(&job.id)?)
}
