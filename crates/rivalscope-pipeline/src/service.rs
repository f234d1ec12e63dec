//! AnalysisService: the facade transports talk to

use crate::executor::JobExecutor;
use crate::jobs::{Job, JobStore, JobView};
use crate::report::AggregateReport;
use crate::runner::{PipelineRunner, RunSettings};
use crate::store::ResultStore;
use crate::topology;
use rivalscope_core::config::ExecutorConfig;
use rivalscope_core::{Error, JobId, JobStatus, Result, SubmitRequest, SubmitResponse};
use rivalscope_worker::Worker;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

pub struct AnalysisService {
    jobs: Arc<JobStore>,
    executor: Arc<JobExecutor>,
    results: Arc<dyn ResultStore>,
}

impl AnalysisService {
    pub fn new(
        worker: Arc<dyn Worker>,
        results: Arc<dyn ResultStore>,
        config: &ExecutorConfig,
    ) -> Self {
        let jobs = Arc::new(JobStore::new());
        let runner = PipelineRunner::new(worker, RunSettings::from(config));
        let executor = Arc::new(JobExecutor::new(jobs.clone(), runner, results.clone()));
        Self {
            jobs,
            executor,
            results,
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }

    /// Validate, register a `pending` job and start it in the background.
    pub async fn submit(
        &self,
        tenant_id: &str,
        request: &SubmitRequest,
        max_targets: usize,
    ) -> Result<SubmitResponse> {
        let job = self.accept(tenant_id, request, max_targets).await?;
        self.executor.spawn(job.id.clone());
        Ok(SubmitResponse {
            job_id: job.id,
            status: job.status,
            targets: job.targets.len(),
            estimated_completion_secs: job.estimated_completion_secs,
            topology: topology::select(job.targets.len()),
            cached_results: job.cached_results,
        })
    }

    /// Everything `submit` does except spawning the executor task.
    pub async fn accept(
        &self,
        tenant_id: &str,
        request: &SubmitRequest,
        max_targets: usize,
    ) -> Result<Job> {
        let submission = request.validate(max_targets)?;
        let cached = if submission.use_cache {
            self.cached_targets(tenant_id, &submission.targets).await
        } else {
            0
        };

        let job = self.jobs.create(tenant_id, submission);
        if cached > 0 {
            self.jobs.set_cached_results(&job.id, cached)?;
        }
        self.jobs
            .get(&job.id)
            .ok_or_else(|| Error::JobNotFound(job.id.to_string()))
    }

    /// Submitted targets that already have a successful result on file.
    /// Only a hint: a lookup failure counts as zero.
    async fn cached_targets(&self, tenant_id: &str, targets: &[String]) -> usize {
        let existing = match self.results.fetch_existing(tenant_id).await {
            Ok(reports) => reports,
            Err(e) => {
                warn!(tenant = tenant_id, error = %e, "existing-results lookup failed");
                return 0;
            }
        };
        let known: HashSet<&str> = existing
            .iter()
            .flat_map(|r| r.succeeded_targets())
            .collect();
        targets.iter().filter(|t| known.contains(t.as_str())).count()
    }

    pub fn job(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .get(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    pub fn status(&self, id: &JobId) -> Result<JobView> {
        self.jobs
            .view(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    pub fn cancel(&self, id: &JobId) -> Result<()> {
        self.jobs.cancel(id)
    }

    pub async fn existing_reports(&self, tenant_id: &str) -> Result<Vec<AggregateReport>> {
        self.results
            .fetch_existing(tenant_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    /// Job counts by status, for health output.
    pub fn counts(&self) -> [(JobStatus, usize); 4] {
        [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ]
        .map(|s| (s, self.jobs.count_by_status(s)))
    }
}
