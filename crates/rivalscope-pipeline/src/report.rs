//! Per-target outcomes and the job's aggregate report

use crate::builder::units;
use crate::pipeline::Pipeline;
use crate::runner::PipelineRun;
use chrono::{DateTime, Utc};
use rivalscope_core::{Depth, Error, JobId, Result, Topology};
use rivalscope_worker::WorkerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Why a unit, and therefore its target, failed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Worker,
    Contract,
    Timeout,
    Cancelled,
}

impl From<&WorkerError> for FailureKind {
    fn from(err: &WorkerError) -> Self {
        match err {
            WorkerError::ContractViolation { .. } => Self::Contract,
            WorkerError::Timeout { .. } => Self::Timeout,
            WorkerError::Cancelled => Self::Cancelled,
            _ => Self::Worker,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Worker => write!(f, "worker"),
            Self::Contract => write!(f, "contract"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one target's pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TargetOutcome {
    Success {
        target: String,
        confidence: f64,
        /// Every unit's output, keyed by unit id.
        sections: BTreeMap<String, Value>,
        summary: String,
    },
    Failure {
        target: String,
        failed_unit: String,
        kind: FailureKind,
        message: String,
        /// Units that finished before the failure.
        completed_units: Vec<String>,
    },
}

impl TargetOutcome {
    /// Turn a finished pipeline run into an outcome. A run that finished
    /// without a usable confidence on its terminal unit counts as a contract
    /// failure of that unit.
    pub fn from_run(pipeline: &Pipeline, run: PipelineRun) -> Self {
        let target = pipeline.target().to_string();
        let completed_units: Vec<String> = pipeline
            .unit_ids()
            .into_iter()
            .filter(|id| run.outputs.contains_key(*id))
            .map(String::from)
            .collect();

        if let Some(failure) = run.failure {
            return Self::Failure {
                target,
                failed_unit: failure.unit_id,
                kind: failure.kind,
                message: failure.message,
                completed_units,
            };
        }

        let terminal_id = pipeline
            .terminal()
            .map(|u| u.id.clone())
            .unwrap_or_else(|| units::SYNTHESIS.to_string());
        let Some(report) = run.outputs.get(&terminal_id) else {
            return Self::Failure {
                target,
                failed_unit: terminal_id,
                kind: FailureKind::Worker,
                message: "pipeline ended without a report".into(),
                completed_units,
            };
        };
        let Some(confidence) = report.confidence() else {
            return Self::Failure {
                target,
                failed_unit: terminal_id,
                kind: FailureKind::Contract,
                message: "report has no confidence_score in [0, 1]".into(),
                completed_units,
            };
        };
        let summary = report
            .content
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self::Success {
            target,
            confidence,
            summary,
            sections: run
                .outputs
                .into_iter()
                .map(|(id, out)| (id, out.content))
                .collect(),
        }
    }

    /// Failure entry for a target that never ran because the job was cancelled.
    pub fn cancelled(target: impl Into<String>) -> Self {
        Self::Failure {
            target: target.into(),
            failed_unit: units::RESEARCH.to_string(),
            kind: FailureKind::Cancelled,
            message: "job cancelled before this target started".into(),
            completed_units: Vec::new(),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Success { target, .. } | Self::Failure { target, .. } => target,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            Self::Success { confidence, .. } => Some(*confidence),
            Self::Failure { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coordination {
    /// Units the coordinator handed out across the whole job.
    pub delegations: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AggregateReport {
    pub job_id: JobId,
    pub tenant_id: String,
    pub depth: Depth,
    pub topology: Topology,
    pub targets_total: usize,
    pub targets_succeeded: usize,
    pub targets_failed: usize,
    pub average_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordination: Option<Coordination>,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<TargetOutcome>,
}

impl AggregateReport {
    /// Roll up per-target outcomes. Average confidence is the mean over
    /// successful targets only; with none, there is no report.
    pub fn compile(
        job_id: JobId,
        tenant_id: &str,
        depth: Depth,
        topology: Topology,
        delegations: usize,
        results: Vec<TargetOutcome>,
    ) -> Result<Self> {
        let confidences: Vec<f64> = results.iter().filter_map(TargetOutcome::confidence).collect();
        if confidences.is_empty() {
            return Err(Error::NoSuccessfulTargets {
                total: results.len(),
            });
        }
        let average_confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;

        Ok(Self {
            job_id,
            tenant_id: tenant_id.to_string(),
            depth,
            topology,
            targets_total: results.len(),
            targets_succeeded: confidences.len(),
            targets_failed: results.len() - confidences.len(),
            average_confidence,
            coordination: (topology == Topology::Managed).then_some(Coordination { delegations }),
            generated_at: Utc::now(),
            results,
        })
    }

    pub fn succeeded_targets(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| r.is_success())
            .map(TargetOutcome::target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(target: &str, confidence: f64) -> TargetOutcome {
        TargetOutcome::Success {
            target: target.into(),
            confidence,
            sections: BTreeMap::new(),
            summary: String::new(),
        }
    }

    #[test]
    fn average_ignores_failures() {
        let results = vec![
            success("a", 0.8),
            TargetOutcome::cancelled("b"),
            success("c", 0.6),
        ];
        let report =
            AggregateReport::compile(JobId::new("j"), "t", Depth::Quick, Topology::Flat, 0, results)
                .unwrap();
        assert!((report.average_confidence - 0.7).abs() < 1e-9);
        assert_eq!(report.targets_succeeded, 2);
        assert_eq!(report.targets_failed, 1);
        assert!(report.coordination.is_none());
        assert_eq!(report.succeeded_targets().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn zero_successes_is_an_error() {
        let err = AggregateReport::compile(
            JobId::new("j"),
            "t",
            Depth::Quick,
            Topology::Managed,
            4,
            vec![TargetOutcome::cancelled("a")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoSuccessfulTargets { total: 1 }));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let value = serde_json::to_value(TargetOutcome::cancelled("a")).unwrap();
        assert_eq!(value["outcome"], "failure");
        assert_eq!(value["kind"], "cancelled");
        assert_eq!(value["target"], "a");
    }

    #[test]
    fn worker_errors_map_to_kinds() {
        assert_eq!(FailureKind::from(&WorkerError::Cancelled), FailureKind::Cancelled);
        assert_eq!(
            FailureKind::from(&WorkerError::Timeout { secs: 1 }),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::from(&WorkerError::contract("c", "r")),
            FailureKind::Contract
        );
        assert_eq!(FailureKind::from(&WorkerError::failed("x")), FailureKind::Worker);
    }
}
