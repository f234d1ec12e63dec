//! Submission protocol: request/response schemas shared by the service and its transports
//!
//! Wire format (JSON, snake_case):
//!
//! Client → Server:
//!   { "targets": ["acme", "globex"], "depth": "standard", "visual_analysis": false, "use_cache": true }
//!
//! Server → Client:
//!   { "job_id": "…", "status": "pending", "targets": 2, "estimated_completion_secs": 240, "topology": "flat", "cached_results": 0 }

use crate::error::{Error, Result};
use crate::types::{Depth, JobId, JobStatus, Topology};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Targets at or below this count are handled flat and cost full price each.
pub const MANAGED_THRESHOLD: usize = 3;

/// Marginal cost of every target beyond the threshold.
const EXTRA_TARGET_WEIGHT: f64 = 0.5;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Raw submission as received from a transport. Depth stays a string so that an
/// unknown value surfaces as a configuration error instead of a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub targets: Vec<String>,
    #[serde(default = "default_depth")]
    pub depth: String,
    #[serde(default)]
    pub visual_analysis: bool,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_depth() -> String {
    Depth::default().as_str().to_string()
}

fn default_use_cache() -> bool {
    true
}

impl SubmitRequest {
    pub fn new(targets: Vec<String>, depth: Depth) -> Self {
        Self {
            targets,
            depth: depth.as_str().to_string(),
            visual_analysis: false,
            use_cache: true,
        }
    }

    /// Validate against a target limit and normalise into a [`Submission`].
    pub fn validate(&self, max_targets: usize) -> Result<Submission> {
        let depth: Depth = self.depth.parse()?;

        if self.targets.is_empty() {
            return Err(Error::configuration("at least one target is required"));
        }
        if self.targets.len() > max_targets {
            return Err(Error::configuration(format!(
                "too many targets: {} (limit {})",
                self.targets.len(),
                max_targets
            )));
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for raw in &self.targets {
            let target = raw.trim();
            if target.is_empty() {
                return Err(Error::configuration("target names must not be blank"));
            }
            if !seen.insert(target.to_string()) {
                return Err(Error::configuration(format!("duplicate target '{}'", target)));
            }
            targets.push(target.to_string());
        }

        Ok(Submission {
            targets,
            depth,
            wants_visual_pass: self.visual_analysis,
            use_cache: self.use_cache,
        })
    }
}

/// A validated submission, ready to become a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub targets: Vec<String>,
    pub depth: Depth,
    pub wants_visual_pass: bool,
    pub use_cache: bool,
}

impl Submission {
    pub fn estimated_completion_secs(&self) -> u64 {
        estimate_completion_secs(self.depth, self.targets.len())
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub targets: usize,
    pub estimated_completion_secs: u64,
    pub topology: Topology,
    pub cached_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Estimates
// ---------------------------------------------------------------------------

/// Scaling factor for a batch: linear up to the threshold, half weight beyond it.
pub fn target_multiplier(target_count: usize) -> f64 {
    if target_count <= MANAGED_THRESHOLD {
        target_count as f64
    } else {
        MANAGED_THRESHOLD as f64 + (target_count - MANAGED_THRESHOLD) as f64 * EXTRA_TARGET_WEIGHT
    }
}

/// `base_time(depth) × target_multiplier(count)`, rounded to whole seconds.
pub fn estimate_completion_secs(depth: Depth, target_count: usize) -> u64 {
    (depth.base_time_secs() as f64 * target_multiplier(target_count)).round() as u64
}
