//! Pipeline runner: invokes the worker for each unit in dependency order
//!
//! `flat` runs one unit at a time in pipeline order. `managed` hands the
//! pipeline to a [`Coordinator`], which runs ready siblings concurrently.
//! Either way the run stops at the first failing unit.

use crate::coordinator::Coordinator;
use crate::pipeline::{CompletedOutputs, Pipeline};
use crate::report::FailureKind;
use futures::FutureExt;
use rivalscope_core::config::ExecutorConfig;
use rivalscope_core::{Topology, UnitOutput, WorkUnit};
use rivalscope_worker::{UnitInputs, Worker, WorkerError};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// `None` waits forever.
    pub unit_timeout: Option<Duration>,
    pub max_parallel_units: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for RunSettings {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            unit_timeout: config.unit_timeout(),
            max_parallel_units: config.max_parallel_units.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub unit_id: String,
    pub kind: FailureKind,
    pub message: String,
}

impl UnitFailure {
    fn new(unit: &WorkUnit, err: &WorkerError) -> Self {
        Self {
            unit_id: unit.id.clone(),
            kind: FailureKind::from(err),
            message: err.to_string(),
        }
    }
}

/// What one pipeline run produced.
#[derive(Debug, Default)]
pub struct PipelineRun {
    pub outputs: CompletedOutputs,
    pub failure: Option<UnitFailure>,
    /// Units handed out by a coordinator; zero for flat runs.
    pub delegations: usize,
}

#[derive(Clone)]
pub struct PipelineRunner {
    worker: Arc<dyn Worker>,
    settings: RunSettings,
}

impl PipelineRunner {
    pub fn new(worker: Arc<dyn Worker>, settings: RunSettings) -> Self {
        Self { worker, settings }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn worker_name(&self) -> &str {
        self.worker.name()
    }

    pub async fn run(
        &self,
        pipeline: &Pipeline,
        topology: Topology,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        match topology {
            Topology::Flat => self.run_flat(pipeline, cancel).await,
            Topology::Managed => Coordinator::new(self).run(pipeline, cancel).await,
        }
    }

    async fn run_flat(&self, pipeline: &Pipeline, cancel: &CancellationToken) -> PipelineRun {
        let mut run = PipelineRun::default();
        for unit in pipeline.units() {
            let inputs = pipeline.inputs_for(unit, &run.outputs);
            match self.invoke_unit(unit, inputs, cancel).await {
                Ok(output) => {
                    run.outputs.insert(unit.id.clone(), output);
                }
                Err(failure) => {
                    run.failure = Some(failure);
                    break;
                }
            }
        }
        run
    }

    /// One bounded, cancellable worker call.
    pub(crate) async fn invoke_unit(
        &self,
        unit: &WorkUnit,
        inputs: UnitInputs,
        cancel: &CancellationToken,
    ) -> Result<UnitOutput, UnitFailure> {
        if cancel.is_cancelled() {
            return Err(UnitFailure::new(unit, &WorkerError::Cancelled));
        }
        debug!(target_name = %unit.target, unit = %unit.id, worker = self.worker.name(), "unit started");

        // A panicking worker is an ordinary unit failure.
        let call = AssertUnwindSafe(self.worker.invoke(unit, &inputs))
            .catch_unwind()
            .map(|caught| {
                caught.unwrap_or_else(|payload| {
                    Err(WorkerError::failed(format!(
                        "worker panicked: {}",
                        panic_message(&*payload)
                    )))
                })
            });
        let bounded = async {
            match self.settings.unit_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(WorkerError::Timeout {
                        secs: limit.as_secs(),
                    }),
                },
                None => call.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WorkerError::Cancelled),
            result = bounded => result,
        };

        match result {
            Ok(output) => {
                info!(target_name = %unit.target, unit = %unit.id, "unit complete");
                Ok(output)
            }
            Err(err) => {
                warn!(target_name = %unit.target, unit = %unit.id, error = %err, "unit failed");
                Err(UnitFailure::new(unit, &err))
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
