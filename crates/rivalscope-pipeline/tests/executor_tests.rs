//! Tests for the job lifecycle: executor, job store, result stores, service

use rivalscope_core::config::ExecutorConfig;
use rivalscope_core::{
    Depth, Error, JobId, JobStatus, SubmitRequest, Submission, Topology, UnitOutput, WorkUnit,
};
use rivalscope_pipeline::executor::CANCELLED_MESSAGE;
use rivalscope_pipeline::jobs::{STEP_COMPLETE, STEP_REPORTING};
use rivalscope_pipeline::report::FailureKind;
use rivalscope_pipeline::store::{StoreError, StoreResult};
use rivalscope_pipeline::*;
use rivalscope_worker::{ScriptedWorker, StubWorker, UnitInputs, Worker, WorkerResult};
use std::sync::Arc;
use std::time::Duration;

struct BrokenStore;

#[async_trait::async_trait]
impl ResultStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn persist(&self, _tenant_id: &str, _report: &AggregateReport) -> StoreResult<()> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn fetch_existing(&self, _tenant_id: &str) -> StoreResult<Vec<AggregateReport>> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
}

/// Panics whenever it is asked to work on `target`.
struct PanickingWorker {
    target: &'static str,
    inner: StubWorker,
}

#[async_trait::async_trait]
impl Worker for PanickingWorker {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn invoke(&self, unit: &WorkUnit, inputs: &UnitInputs) -> WorkerResult<UnitOutput> {
        if unit.target == self.target {
            panic!("worker exploded on {}", unit.target);
        }
        self.inner.invoke(unit, inputs).await
    }
}

struct Harness {
    jobs: Arc<JobStore>,
    executor: Arc<JobExecutor>,
    worker: Arc<ScriptedWorker>,
}

fn harness_with(worker: ScriptedWorker, results: Arc<dyn ResultStore>, timeout: Option<Duration>) -> Harness {
    let worker = Arc::new(worker);
    let jobs = Arc::new(JobStore::new());
    let runner = PipelineRunner::new(
        worker.clone(),
        RunSettings {
            unit_timeout: timeout,
            max_parallel_units: 4,
        },
    );
    let executor = Arc::new(JobExecutor::new(jobs.clone(), runner, results));
    Harness {
        jobs,
        executor,
        worker,
    }
}

fn harness(worker: ScriptedWorker) -> Harness {
    harness_with(worker, Arc::new(MemoryResultStore::new()), None)
}

fn submission(targets: &[&str], depth: Depth) -> Submission {
    Submission {
        targets: targets.iter().map(|t| t.to_string()).collect(),
        depth,
        wants_visual_pass: false,
        use_cache: false,
    }
}

async fn wait_for(jobs: &JobStore, id: &JobId, done: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..500 {
        if let Some(job) = jobs.get(id) {
            if done(&job) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never reached the expected state", id);
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn completed_job_has_report_and_full_progress() {
    let h = harness(ScriptedWorker::new());
    let id = h.jobs.create("tenant", submission(&["a", "b"], Depth::Standard)).id;

    h.executor.run(&id).await.unwrap();

    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percentage, 100);
    assert_eq!(job.current_step, STEP_COMPLETE);
    assert_eq!(job.topology, Some(Topology::Flat));
    assert!(job.error.is_none());
    let report = job.aggregate_report.unwrap();
    assert_eq!(report.targets_total, 2);
    assert_eq!(report.targets_succeeded, 2);
    assert!(report.coordination.is_none());
}

#[tokio::test]
async fn failing_target_is_contained() {
    let h = harness(ScriptedWorker::new().fail_on("b", "research"));
    let id = h.jobs.create("t", submission(&["a", "b", "c"], Depth::Standard)).id;

    h.executor.run(&id).await.unwrap();

    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let results = &job.per_target_results;
    assert_eq!(
        results.iter().map(|r| r.target()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
    assert!(results[0].is_success());
    assert!(!results[1].is_success());
    assert!(results[2].is_success());

    let report = job.aggregate_report.unwrap();
    assert_eq!(report.targets_failed, 1);
    assert_eq!(report.targets_succeeded, 2);
}

#[tokio::test]
async fn average_confidence_is_mean_of_successes() {
    let h = harness(
        ScriptedWorker::new()
            .confidence("a", 0.9)
            .confidence("c", 0.5)
            .fail_on("b", "synthesis"),
    );
    let id = h.jobs.create("t", submission(&["a", "b", "c"], Depth::Quick)).id;
    h.executor.run(&id).await.unwrap();

    let report = h.jobs.get(&id).unwrap().aggregate_report.unwrap();
    assert!((report.average_confidence - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn zero_successes_fails_the_job() {
    let h = harness(ScriptedWorker::new().fail_on("*", "research"));
    let id = h.jobs.create("t", submission(&["a", "b"], Depth::Quick)).id;
    h.executor.run(&id).await.unwrap();

    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.aggregate_report.is_none());
    assert_eq!(job.per_target_results.len(), 2);
    let error = job.error.unwrap();
    assert!(error.message.contains("no successful targets"));
    assert_eq!(error.step, STEP_REPORTING);
    assert_eq!(job.progress_percentage, 100);
}

#[tokio::test]
async fn blank_target_mid_job_fails_the_job() {
    let h = harness(ScriptedWorker::new());
    let id = h.jobs.create("t", submission(&["a", " ", "c"], Depth::Quick)).id;
    h.executor.run(&id).await.unwrap();

    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress_percentage, 100);
    assert!(job.aggregate_report.is_none());
    assert_eq!(job.per_target_results.len(), 1);
    assert!(job.per_target_results[0].is_success());
    let error = job.error.unwrap();
    assert_eq!(error.step, "Analyzing  ");
    assert!(error.message.contains("malformed pipeline request"));
    assert!(!h
        .worker
        .invocations()
        .await
        .iter()
        .any(|(target, _)| target == "c"));
}

#[tokio::test]
async fn panicking_worker_is_contained_to_its_target() {
    let jobs = Arc::new(JobStore::new());
    let worker = Arc::new(PanickingWorker {
        target: "b",
        inner: StubWorker::new(),
    });
    let executor = Arc::new(JobExecutor::new(
        jobs.clone(),
        PipelineRunner::new(worker, RunSettings::default()),
        Arc::new(MemoryResultStore::new()),
    ));
    let id = jobs.create("t", submission(&["a", "b", "c"], Depth::Quick)).id;

    executor.spawn(id.clone()).await.unwrap();

    let job = jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.per_target_results.len(), 3);
    match &job.per_target_results[1] {
        TargetOutcome::Failure { kind, message, .. } => {
            assert_eq!(*kind, FailureKind::Worker);
            assert!(message.contains("panicked"), "{}", message);
        }
        other => panic!("expected worker failure, got {:?}", other),
    }
    assert!(job.per_target_results[2].is_success());
    assert!(job.error.is_none());
}

#[tokio::test]
async fn run_twice_is_rejected_and_changes_nothing() {
    let h = harness(ScriptedWorker::new());
    let id = h.jobs.create("t", submission(&["a"], Depth::Quick)).id;
    h.executor.run(&id).await.unwrap();
    let before = h.jobs.get(&id).unwrap();
    let calls = h.worker.invocation_count().await;

    let err = h.executor.run(&id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let after = h.jobs.get(&id).unwrap();
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(after.per_target_results, before.per_target_results);
    assert_eq!(h.worker.invocation_count().await, calls);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let h = harness(ScriptedWorker::new());
    let err = h.executor.run(&JobId::new("missing")).await.unwrap_err();
    assert!(matches!(err, Error::JobNotFound(_)));
}

#[tokio::test]
async fn progress_is_monotonic_and_full_only_when_terminal() {
    let h = harness(
        ScriptedWorker::new()
            .delay_on("*", "research", Duration::from_millis(5))
            .delay_on("*", "synthesis", Duration::from_millis(5)),
    );
    let id = h.jobs.create("t", submission(&["a", "b", "c", "d"], Depth::Quick)).id;
    let handle = h.executor.spawn(id.clone());

    let mut samples = Vec::new();
    loop {
        let job = h.jobs.get(&id).unwrap();
        samples.push((job.progress_percentage, job.status));
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    handle.await.unwrap();

    for pair in samples.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "progress went backwards: {:?}", samples);
    }
    for (progress, status) in &samples {
        assert_eq!(*progress == 100, status.is_terminal());
    }
    assert!(samples.iter().any(|(p, _)| *p == 75));
}

// ===========================================================================
// Topology
// ===========================================================================

#[tokio::test]
async fn large_batch_runs_managed_and_counts_delegations() {
    let h = harness(ScriptedWorker::new());
    let id = h
        .jobs
        .create("t", submission(&["a", "b", "c", "d"], Depth::Standard))
        .id;
    h.executor.run(&id).await.unwrap();

    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.topology, Some(Topology::Managed));
    let report = job.aggregate_report.unwrap();
    assert_eq!(report.topology, Topology::Managed);
    assert_eq!(report.coordination.unwrap().delegations, 12);
}

// ===========================================================================
// Timeouts, cancellation, persistence
// ===========================================================================

#[tokio::test]
async fn timeout_records_failure_entry() {
    let h = harness_with(
        ScriptedWorker::new().hang_on("b", "research"),
        Arc::new(MemoryResultStore::new()),
        Some(Duration::from_millis(30)),
    );
    let id = h.jobs.create("t", submission(&["a", "b"], Depth::Quick)).id;
    h.executor.run(&id).await.unwrap();

    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    match &job.per_target_results[1] {
        TargetOutcome::Failure { kind, failed_unit, .. } => {
            assert_eq!(*kind, FailureKind::Timeout);
            assert_eq!(failed_unit, "research");
        }
        other => panic!("expected timeout failure, got {:?}", other),
    }
}

#[tokio::test]
async fn cancellation_fails_job_with_full_result_list() {
    let h = harness(ScriptedWorker::new().hang_on("b", "research"));
    let id = h.jobs.create("t", submission(&["a", "b", "c"], Depth::Quick)).id;
    let handle = h.executor.spawn(id.clone());

    wait_for(&h.jobs, &id, |j| j.current_step == "Analyzing b").await;
    h.jobs.cancel(&id).unwrap();
    handle.await.unwrap();

    let job = h.jobs.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_ref().unwrap().message, CANCELLED_MESSAGE);
    assert_eq!(job.progress_percentage, 100);
    assert!(job.aggregate_report.is_none());
    assert_eq!(job.per_target_results.len(), 3);
    assert!(job.per_target_results[0].is_success());
    for outcome in &job.per_target_results[1..] {
        assert!(matches!(
            outcome,
            TargetOutcome::Failure {
                kind: FailureKind::Cancelled,
                ..
            }
        ));
    }
    // c never reached the worker
    assert!(!h
        .worker
        .invocations()
        .await
        .iter()
        .any(|(target, _)| target == "c"));
    assert!(h.jobs.cancel(&id).is_err());
}

#[tokio::test]
async fn persistence_failure_still_completes() {
    let h = harness_with(ScriptedWorker::new(), Arc::new(BrokenStore), None);
    let id = h.jobs.create("t", submission(&["a"], Depth::Quick)).id;
    h.executor.run(&id).await.unwrap();
    assert_eq!(h.jobs.get(&id).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn completed_report_is_persisted_for_tenant() {
    let store = Arc::new(MemoryResultStore::new());
    let h = harness_with(ScriptedWorker::new(), store.clone(), None);
    let id = h.jobs.create("acme-corp", submission(&["a"], Depth::Quick)).id;
    h.executor.run(&id).await.unwrap();

    let saved = store.fetch_existing("acme-corp").await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].job_id, id);
}

// ===========================================================================
// AnalysisService
// ===========================================================================

fn service(results: Arc<dyn ResultStore>) -> AnalysisService {
    AnalysisService::new(
        Arc::new(ScriptedWorker::new()),
        results,
        &ExecutorConfig::default(),
    )
}

fn request(targets: &[&str], use_cache: bool) -> SubmitRequest {
    let mut req = SubmitRequest::new(targets.iter().map(|t| t.to_string()).collect(), Depth::Standard);
    req.use_cache = use_cache;
    req
}

#[tokio::test]
async fn submit_returns_pending_job_with_estimate() {
    let svc = service(Arc::new(MemoryResultStore::new()));
    let resp = svc
        .submit("t", &request(&["a", "b", "c", "d", "e"], true), 20)
        .await
        .unwrap();
    assert_eq!(resp.status, JobStatus::Pending);
    assert_eq!(resp.estimated_completion_secs, 480);
    assert_eq!(resp.topology, Topology::Managed);
    assert_eq!(resp.targets, 5);

    let job = wait_for(svc.jobs(), &resp.job_id, |j| j.status.is_terminal()).await;
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn submit_rejects_invalid_requests_without_creating_jobs() {
    let svc = service(Arc::new(MemoryResultStore::new()));
    let mut bad_depth = request(&["a"], false);
    bad_depth.depth = "exhaustive".into();

    assert!(svc.submit("t", &bad_depth, 20).await.unwrap_err().is_client_error());
    assert!(svc.submit("t", &request(&[], false), 20).await.is_err());
    assert!(svc.submit("t", &request(&["a", "b"], false), 1).await.is_err());
    assert!(svc.jobs().is_empty());
}

#[tokio::test]
async fn cache_hint_only_when_requested() {
    let svc = service(Arc::new(MemoryResultStore::new()));
    let first = svc.submit("t", &request(&["acme"], true), 20).await.unwrap();
    assert_eq!(first.cached_results, 0);
    wait_for(svc.jobs(), &first.job_id, |j| j.status.is_terminal()).await;

    let cached = svc.accept("t", &request(&["acme", "globex"], true), 20).await.unwrap();
    assert_eq!(cached.cached_results, 1);

    let uncached = svc.accept("t", &request(&["acme", "globex"], false), 20).await.unwrap();
    assert_eq!(uncached.cached_results, 0);

    let other_tenant = svc.accept("u", &request(&["acme"], true), 20).await.unwrap();
    assert_eq!(other_tenant.cached_results, 0);
}

#[tokio::test]
async fn cache_lookup_failure_is_only_a_hint() {
    let svc = service(Arc::new(BrokenStore));
    let job = svc.accept("t", &request(&["acme"], true), 20).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.cached_results, 0);
    assert!(svc.existing_reports("t").await.is_err());
}

#[tokio::test]
async fn status_of_unknown_job_is_not_found() {
    let svc = service(Arc::new(MemoryResultStore::new()));
    assert!(matches!(
        svc.status(&JobId::new("nope")),
        Err(Error::JobNotFound(_))
    ));
    assert!(svc.cancel(&JobId::new("nope")).is_err());
}
