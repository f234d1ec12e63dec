//! JobStore: process-wide registry of job records
//!
//! Every mutation goes through [`JobStore::update`], which applies a closure
//! while holding the record's shard lock. Readers get cloned snapshots and
//! never observe a half-applied update.

use crate::report::{AggregateReport, TargetOutcome};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rivalscope_core::{Depth, Error, JobId, JobStatus, Result, Submission, Topology};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const STEP_INITIALIZING: &str = "Initializing";
pub const STEP_REPORTING: &str = "Generating final report";
pub const STEP_COMPLETE: &str = "Analysis complete";

pub const CANCELLED_MESSAGE: &str = "job cancelled";

/// Terminal diagnostic: what went wrong and which step was running.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct JobError {
    pub message: String,
    pub step: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: String,
    pub status: JobStatus,
    pub progress_percentage: u8,
    pub current_step: String,
    pub targets: Vec<String>,
    pub depth: Depth,
    pub wants_visual_pass: bool,
    pub use_cache: bool,
    pub topology: Option<Topology>,
    pub cached_results: usize,
    pub estimated_completion_secs: u64,
    pub per_target_results: Vec<TargetOutcome>,
    pub aggregate_report: Option<AggregateReport>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cancel: CancellationToken,
}

impl Job {
    pub fn new(id: JobId, tenant_id: impl Into<String>, submission: Submission) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant_id: tenant_id.into(),
            status: JobStatus::Pending,
            progress_percentage: 0,
            current_step: String::new(),
            estimated_completion_secs: submission.estimated_completion_secs(),
            targets: submission.targets,
            depth: submission.depth,
            wants_visual_pass: submission.wants_visual_pass,
            use_cache: submission.use_cache,
            topology: None,
            cached_results: 0,
            per_target_results: Vec::new(),
            aggregate_report: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn targets_processed(&self) -> usize {
        self.per_target_results.len()
    }

    pub fn targets_failed(&self) -> usize {
        self.per_target_results.iter().filter(|r| !r.is_success()).count()
    }

    /// Status projection for pollers (no per-target payloads).
    pub fn view(&self) -> JobView {
        JobView {
            job_id: self.id.clone(),
            tenant_id: self.tenant_id.clone(),
            status: self.status,
            progress_percentage: self.progress_percentage,
            current_step: self.current_step.clone(),
            depth: self.depth,
            topology: self.topology,
            targets_total: self.targets.len(),
            targets_processed: self.targets_processed(),
            targets_failed: self.targets_failed(),
            cached_results: self.cached_results,
            estimated_completion_secs: self.estimated_completion_secs,
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }

    fn mark_failed(&mut self, message: String) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.progress_percentage = 100;
        self.error = Some(JobError {
            message,
            step: self.current_step.clone(),
        });
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::invalid_transition(self.id.as_str(), self.status, next));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub tenant_id: String,
    pub status: JobStatus,
    pub progress_percentage: u8,
    pub current_step: String,
    pub depth: Depth,
    pub topology: Option<Topology>,
    pub targets_total: usize,
    pub targets_processed: usize,
    pub targets_failed: usize,
    pub cached_results: usize,
    pub estimated_completion_secs: u64,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<JobId, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `pending` job.
    pub fn create(&self, tenant_id: &str, submission: Submission) -> Job {
        let job = Job::new(JobId::generate(), tenant_id, submission);
        info!(job_id = %job.id, tenant = tenant_id, targets = job.targets.len(), "job created");
        self.jobs.insert(job.id.clone(), job.clone());
        job
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|j| j.clone())
    }

    pub fn view(&self, id: &JobId) -> Option<JobView> {
        self.jobs.get(id).map(|j| j.view())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    pub fn list(&self) -> Vec<JobView> {
        let mut views: Vec<JobView> = self.jobs.iter().map(|j| j.view()).collect();
        views.sort_by_key(|v| v.created_at);
        views
    }

    /// Apply `f` to the record atomically. Terminal records are immutable.
    pub fn update<R>(&self, id: &JobId, f: impl FnOnce(&mut Job) -> Result<R>) -> Result<R> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Err(Error::invalid_transition(id.as_str(), job.status, job.status));
        }
        let result = f(&mut *job)?;
        job.updated_at = Utc::now();
        Ok(result)
    }

    /// `pending -> running`.
    pub fn start(&self, id: &JobId) -> Result<()> {
        self.update(id, |job| {
            job.transition(JobStatus::Running)?;
            job.current_step = STEP_INITIALIZING.to_string();
            Ok(())
        })
    }

    /// Progress never moves backwards.
    pub fn set_progress(&self, id: &JobId, percentage: u8, step: impl Into<String>) -> Result<()> {
        let step = step.into();
        self.update(id, |job| {
            job.progress_percentage = job.progress_percentage.max(percentage.min(100));
            job.current_step = step;
            Ok(())
        })
    }

    pub fn set_step(&self, id: &JobId, step: impl Into<String>) -> Result<()> {
        let step = step.into();
        self.update(id, |job| {
            job.current_step = step;
            Ok(())
        })
    }

    pub fn set_topology(&self, id: &JobId, topology: Topology) -> Result<()> {
        self.update(id, |job| {
            job.topology = Some(topology);
            Ok(())
        })
    }

    pub fn set_cached_results(&self, id: &JobId, count: usize) -> Result<()> {
        self.update(id, |job| {
            job.cached_results = count;
            Ok(())
        })
    }

    pub fn push_result(&self, id: &JobId, outcome: TargetOutcome) -> Result<()> {
        self.update(id, |job| {
            if job.per_target_results.len() >= job.targets.len() {
                return Err(Error::Internal(format!(
                    "job {} already has a result for every target",
                    job.id
                )));
            }
            job.per_target_results.push(outcome);
            Ok(())
        })
    }

    /// `running -> completed` with the report attached, or `running -> failed`
    /// when a cancellation was accepted before this point. Returns the final status.
    pub fn complete(&self, id: &JobId, report: AggregateReport) -> Result<JobStatus> {
        self.update(id, |job| {
            if job.cancel.is_cancelled() {
                job.mark_failed(CANCELLED_MESSAGE.to_string())?;
                return Ok(JobStatus::Failed);
            }
            job.transition(JobStatus::Completed)?;
            job.progress_percentage = 100;
            job.current_step = STEP_COMPLETE.to_string();
            job.aggregate_report = Some(report);
            Ok(JobStatus::Completed)
        })
    }

    /// `running -> failed`; records the diagnostic and the step it happened in.
    pub fn fail(&self, id: &JobId, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.update(id, |job| job.mark_failed(message))
    }

    /// Request cancellation. The executor observes it at its next await point;
    /// a job already past its last target is failed when it tries to complete.
    pub fn cancel(&self, id: &JobId) -> Result<()> {
        let job = self
            .jobs
            .get(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Err(Error::invalid_transition(id.as_str(), job.status, JobStatus::Failed));
        }
        job.cancel.cancel();
        info!(job_id = %id, "cancellation requested");
        Ok(())
    }
}
