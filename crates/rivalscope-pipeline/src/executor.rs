//! JobExecutor: drives one job from `pending` to a terminal state
//!
//! Targets are processed strictly in submission order. A unit failure is
//! contained to its target; anything else fails the job. Cancellation marks
//! the in-flight and remaining targets as cancelled and fails the job.

use crate::builder::PipelineBuilder;
use crate::jobs::{Job, JobStore, STEP_REPORTING};
use crate::report::{AggregateReport, TargetOutcome};
use crate::runner::{panic_message, PipelineRunner};
use crate::store::ResultStore;
use crate::topology;
use futures::FutureExt;
use rivalscope_core::{Error, JobId, JobStatus, Result};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use crate::jobs::CANCELLED_MESSAGE;
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

pub struct JobExecutor {
    jobs: Arc<JobStore>,
    runner: PipelineRunner,
    builder: PipelineBuilder,
    results: Arc<dyn ResultStore>,
}

impl JobExecutor {
    pub fn new(jobs: Arc<JobStore>, runner: PipelineRunner, results: Arc<dyn ResultStore>) -> Self {
        Self {
            jobs,
            runner,
            builder: PipelineBuilder::new(),
            results,
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Run the job on its own task. Submission does not wait for it.
    pub fn spawn(self: &Arc<Self>, id: JobId) -> JoinHandle<()> {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            match AssertUnwindSafe(executor.run(&id)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(job_id = %id, error = %e, "job could not be run"),
                Err(payload) => {
                    error!(job_id = %id, panic = panic_message(&*payload), "job task panicked");
                    if let Err(e) = executor.jobs.fail(&id, INTERNAL_ERROR_MESSAGE) {
                        error!(job_id = %id, error = %e, "could not mark job failed");
                    }
                }
            }
        })
    }

    /// Consume a `pending` job. A job can only be run once: a second call
    /// fails with `InvalidTransition` and leaves the record untouched.
    pub async fn run(&self, id: &JobId) -> Result<()> {
        self.jobs.start(id)?;
        let job = self
            .jobs
            .get(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        info!(job_id = %id, targets = job.targets.len(), depth = %job.depth, "job started");

        match self.drive(&job).await {
            Ok(report) => {
                let (succeeded, failed, confidence) = (
                    report.targets_succeeded,
                    report.targets_failed,
                    report.average_confidence,
                );
                match self.jobs.complete(id, report)? {
                    JobStatus::Completed => {
                        info!(job_id = %id, succeeded, failed, confidence, "job completed")
                    }
                    _ => warn!(job_id = %id, "job cancelled while reporting"),
                }
                Ok(())
            }
            Err(e) => {
                let message = match e {
                    Error::JobFailure(message) => message,
                    other => other.to_string(),
                };
                warn!(job_id = %id, error = %message, "job failed");
                self.jobs.fail(id, message)
            }
        }
    }

    async fn drive(&self, job: &Job) -> Result<AggregateReport> {
        let id = &job.id;
        let cancel = job.cancel_token();
        let total = job.targets.len();

        let topology = topology::select(total);
        self.jobs.set_topology(id, topology)?;
        info!(job_id = %id, topology = %topology, "topology selected");

        let mut delegations = 0;
        for (i, target) in job.targets.iter().enumerate() {
            if cancel.is_cancelled() {
                self.jobs.push_result(id, TargetOutcome::cancelled(target))?;
                continue;
            }

            let progress = (i * 100 / total) as u8;
            self.jobs
                .set_progress(id, progress, format!("Analyzing {}", target))?;

            let pipeline = self
                .builder
                .build(target, job.depth, job.wants_visual_pass)?;
            let run = self.runner.run(&pipeline, topology, &cancel).await;
            delegations += run.delegations;

            let outcome = TargetOutcome::from_run(&pipeline, run);
            match &outcome {
                TargetOutcome::Success { confidence, .. } => {
                    info!(job_id = %id, target_name = %target, confidence, "target analyzed")
                }
                TargetOutcome::Failure {
                    failed_unit, kind, ..
                } => {
                    warn!(job_id = %id, target_name = %target, unit = %failed_unit, kind = %kind, "target failed")
                }
            }
            self.jobs.push_result(id, outcome)?;
        }

        if cancel.is_cancelled() {
            return Err(Error::job_failure(CANCELLED_MESSAGE));
        }

        self.jobs.set_step(id, STEP_REPORTING)?;
        let results = self
            .jobs
            .get(id)
            .map(|j| j.per_target_results)
            .unwrap_or_default();
        let report = AggregateReport::compile(
            id.clone(),
            &job.tenant_id,
            job.depth,
            topology,
            delegations,
            results,
        )?;

        if let Err(e) = self.results.persist(&job.tenant_id, &report).await {
            warn!(
                job_id = %id,
                store = self.results.name(),
                "{}",
                Error::Persistence(e.to_string())
            );
        }

        Ok(report)
    }
}
