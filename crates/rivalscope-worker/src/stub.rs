//! StubWorker: deterministic output, no network
//!
//! Produces contract-conforming payloads derived only from the unit and its
//! inputs, so identical jobs yield identical reports.

use crate::capability::{UnitInputs, Worker, WorkerResult};
use crate::prompt::check_contract;
use rivalscope_core::{Capability, UnitOutput, WorkUnit};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct StubWorker {
    latency: Option<Duration>,
}

impl StubWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every invocation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = (!latency.is_zero()).then_some(latency);
        self
    }

    /// Stable confidence in [0.60, 0.90] derived from the target name.
    pub fn confidence_for(target: &str) -> f64 {
        let spread = target.bytes().map(u64::from).sum::<u64>() % 31;
        0.60 + spread as f64 / 100.0
    }

    fn content_for(unit: &WorkUnit, inputs: &UnitInputs) -> Value {
        let based_on: Vec<&str> = inputs.keys().map(String::as_str).collect();
        match unit.capability {
            Capability::Research => json!({
                "summary": format!("Research brief for {}", unit.target),
                "key_facts": [
                    format!("{} product line", unit.target),
                    format!("{} pricing model", unit.target),
                    format!("{} go-to-market", unit.target),
                ],
                "sources": [format!("https://{}.example", slug(&unit.target))],
            }),
            Capability::Analysis => json!({
                "findings": [format!("{} for {}", unit.id.replace('_', " "), unit.target)],
                "based_on": based_on,
            }),
            Capability::Synthesis => json!({
                "summary": format!("Competitive assessment of {}", unit.target),
                "based_on": based_on,
                "confidence_score": Self::confidence_for(&unit.target),
            }),
        }
    }
}

fn slug(target: &str) -> String {
    target
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

#[async_trait::async_trait]
impl Worker for StubWorker {
    fn name(&self) -> &str {
        "stub"
    }

    async fn invoke(&self, unit: &WorkUnit, inputs: &UnitInputs) -> WorkerResult<UnitOutput> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let content = Self::content_for(unit, inputs);
        if let Some(contract) = &unit.expected_output {
            check_contract(contract, &content)?;
        }
        Ok(UnitOutput::new(unit, content))
    }
}
