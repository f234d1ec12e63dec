//! Coordinator for the managed topology
//!
//! Sequences and delegates only: it never does unit work itself and adds no
//! units to the pipeline. Each pass it hands every ready unit to the worker
//! (up to `max_parallel_units` in flight) and waits for the next completion.

use crate::pipeline::Pipeline;
use crate::runner::{PipelineRun, PipelineRunner, UnitFailure};
use futures::stream::{FuturesUnordered, StreamExt};
use rivalscope_core::UnitOutput;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Coordinator<'a> {
    runner: &'a PipelineRunner,
    delegations: usize,
}

impl<'a> Coordinator<'a> {
    pub fn new(runner: &'a PipelineRunner) -> Self {
        Self {
            runner,
            delegations: 0,
        }
    }

    pub async fn run(mut self, pipeline: &Pipeline, cancel: &CancellationToken) -> PipelineRun {
        let limit = self.runner.settings().max_parallel_units.max(1);
        let runner = self.runner;
        let mut run = PipelineRun::default();
        let mut started: HashSet<String> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            for unit in pipeline.ready(&run.outputs, &started) {
                if in_flight.len() >= limit {
                    break;
                }
                started.insert(unit.id.clone());
                self.delegations += 1;
                debug!(target_name = %unit.target, unit = %unit.id, in_flight = in_flight.len() + 1, "delegating");

                let inputs = pipeline.inputs_for(unit, &run.outputs);
                in_flight.push(async move {
                    let result: Result<UnitOutput, UnitFailure> =
                        runner.invoke_unit(unit, inputs, cancel).await;
                    (unit.id.clone(), result)
                });
            }

            let Some((unit_id, result)) = in_flight.next().await else {
                break;
            };
            match result {
                Ok(output) => {
                    run.outputs.insert(unit_id, output);
                }
                Err(failure) => {
                    // Siblings still in flight are dropped with the set.
                    run.failure = Some(failure);
                    break;
                }
            }
        }

        run.delegations = self.delegations;
        run
    }
}
