//! Rivalscope Pipeline - job orchestration
//!
//! Submission creates a `pending` [`Job`] in the [`JobStore`]; a spawned
//! [`JobExecutor`] task then walks the job's targets in order, builds each
//! target's [`Pipeline`], runs it under the topology picked by
//! [`topology::select`], and finishes with an [`AggregateReport`].

pub mod builder;
pub mod coordinator;
pub mod executor;
pub mod jobs;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod service;
pub mod store;
pub mod topology;

pub use builder::PipelineBuilder;
pub use coordinator::Coordinator;
pub use executor::JobExecutor;
pub use jobs::{Job, JobError, JobStore, JobView};
pub use pipeline::Pipeline;
pub use report::{AggregateReport, FailureKind, TargetOutcome};
pub use runner::{PipelineRun, PipelineRunner, RunSettings, UnitFailure};
pub use service::AnalysisService;
pub use store::{LocalFsResultStore, MemoryResultStore, ResultStore, StoreError};
