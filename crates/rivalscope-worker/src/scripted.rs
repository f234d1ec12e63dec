//! ScriptedWorker: deterministic test double
//!
//! Wraps [`StubWorker`] output and lets a test script failures, contract
//! violations, hangs, delays and confidence scores per `(target, unit)` pair.
//! `"*"` as the target matches every target. Every invocation is logged and
//! the peak number of concurrent invocations is tracked.

use crate::capability::{UnitInputs, Worker, WorkerError, WorkerResult};
use crate::stub::StubWorker;
use rivalscope_core::{Capability, UnitOutput, WorkUnit};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub const ANY_TARGET: &str = "*";

type Key = (String, String);

#[derive(Default)]
pub struct ScriptedWorker {
    inner: StubWorker,
    failures: HashSet<Key>,
    violations: HashSet<Key>,
    hangs: HashSet<Key>,
    delays: HashMap<Key, Duration>,
    confidences: HashMap<String, f64>,
    log: Mutex<Vec<Key>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

fn key(target: &str, unit: &str) -> Key {
    (target.to_string(), unit.to_string())
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `unit` fails with a worker error for `target`.
    pub fn fail_on(mut self, target: &str, unit: &str) -> Self {
        self.failures.insert(key(target, unit));
        self
    }

    /// `unit` returns output that breaks its contract for `target`.
    pub fn violate_contract_on(mut self, target: &str, unit: &str) -> Self {
        self.violations.insert(key(target, unit));
        self
    }

    /// `unit` never returns for `target`.
    pub fn hang_on(mut self, target: &str, unit: &str) -> Self {
        self.hangs.insert(key(target, unit));
        self
    }

    pub fn delay_on(mut self, target: &str, unit: &str, delay: Duration) -> Self {
        self.delays.insert(key(target, unit), delay);
        self
    }

    /// Synthesis for `target` reports this confidence.
    pub fn confidence(mut self, target: &str, score: f64) -> Self {
        self.confidences.insert(target.to_string(), score);
        self
    }

    /// `(target, unit)` pairs in invocation order.
    pub async fn invocations(&self) -> Vec<(String, String)> {
        self.log.lock().await.clone()
    }

    pub async fn invocation_count(&self) -> usize {
        self.log.lock().await.len()
    }

    /// Highest number of invocations that were in flight at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn scripted(&self, set: &HashSet<Key>, unit: &WorkUnit) -> bool {
        set.contains(&key(&unit.target, &unit.id)) || set.contains(&key(ANY_TARGET, &unit.id))
    }

    fn delay_for(&self, unit: &WorkUnit) -> Option<Duration> {
        self.delays
            .get(&key(&unit.target, &unit.id))
            .or_else(|| self.delays.get(&key(ANY_TARGET, &unit.id)))
            .copied()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Worker for ScriptedWorker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, unit: &WorkUnit, inputs: &UnitInputs) -> WorkerResult<UnitOutput> {
        self.log
            .lock()
            .await
            .push(key(&unit.target, &unit.id));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay_for(unit) {
            tokio::time::sleep(delay).await;
        }
        if self.scripted(&self.hangs, unit) {
            futures::future::pending::<()>().await;
        }
        if self.scripted(&self.failures, unit) {
            return Err(WorkerError::failed(format!(
                "scripted failure in {} for {}",
                unit.id, unit.target
            )));
        }
        if self.scripted(&self.violations, unit) {
            let contract = unit.expected_output.clone().unwrap_or_default();
            return Err(WorkerError::contract(contract, "scripted violation"));
        }

        let mut output = self.inner.invoke(unit, inputs).await?;
        if unit.capability == Capability::Synthesis {
            if let Some(score) = self.confidences.get(&unit.target) {
                output.content["confidence_score"] = serde_json::json!(score);
            }
        }
        Ok(output)
    }
}
