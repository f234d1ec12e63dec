//! Core types for Rivalscope

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Job identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Arc<str>);

impl JobId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    /// Fresh random id for a new submission.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Requested thoroughness; controls the shape of each target's pipeline.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    #[default]
    Standard,
    Comprehensive,
}

impl Depth {
    pub const ALL: [Depth; 3] = [Depth::Quick, Depth::Standard, Depth::Comprehensive];

    /// Base wall-clock estimate for analyzing a single target at this depth.
    pub fn base_time_secs(&self) -> u64 {
        match self {
            Depth::Quick => 60,
            Depth::Standard => 120,
            Depth::Comprehensive => 240,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Quick => "quick",
            Depth::Standard => "standard",
            Depth::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Depth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(Depth::Quick),
            "standard" => Ok(Depth::Standard),
            "comprehensive" => Ok(Depth::Comprehensive),
            other => Err(Error::configuration(format!(
                "unknown analysis depth '{}' (expected quick, standard or comprehensive)",
                other
            ))),
        }
    }
}

/// Logical role that executes a work unit.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Research,
    Analysis,
    Synthesis,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Research => write!(f, "research"),
            Self::Analysis => write!(f, "analysis"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// Coordination style for a batch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Units run one after another in pipeline order.
    Flat,
    /// A coordinator delegates every eligible unit as soon as it is ready.
    Managed,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Managed => write!(f, "managed"),
        }
    }
}

/// Job lifecycle: `pending -> running -> {completed, failed}`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Output contracts a worker may be asked to honour.
pub mod contracts {
    pub const RESEARCH_BRIEF: &str = "research_brief.v1";
    pub const ANALYSIS_FINDINGS: &str = "analysis_findings.v1";
    pub const TARGET_REPORT: &str = "target_report.v1";
}

/// An atomic piece of work handed to a worker capability.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkUnit {
    /// Unique within the owning pipeline.
    pub id: String,
    pub target: String,
    pub description: String,
    pub capability: Capability,
    /// Units whose output must exist before this one may start.
    pub depends_on: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

impl WorkUnit {
    pub fn new(
        id: impl Into<String>,
        target: impl Into<String>,
        capability: Capability,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            description: description.into(),
            capability,
            depends_on: BTreeSet::new(),
            expected_output: None,
        }
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_contract(mut self, contract: &str) -> Self {
        self.expected_output = Some(contract.to_string());
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.depends_on.is_empty()
    }
}

/// What a worker produced for one unit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UnitOutput {
    pub unit_id: String,
    pub capability: Capability,
    pub content: serde_json::Value,
}

impl UnitOutput {
    pub fn new(unit: &WorkUnit, content: serde_json::Value) -> Self {
        Self {
            unit_id: unit.id.clone(),
            capability: unit.capability,
            content,
        }
    }

    /// `confidence_score` field of a structured output, if present and within [0, 1].
    pub fn confidence(&self) -> Option<f64> {
        self.content
            .get("confidence_score")
            .and_then(|v| v.as_f64())
            .filter(|c| (0.0..=1.0).contains(c))
    }
}
