//! Error types for Rivalscope

use crate::types::JobStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid depth, malformed pipeline request, or a submission that breaks
    /// the configured limits. Raised before a job record exists.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid transition for job {job}: {from} -> {to}")]
    InvalidTransition {
        job: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Error outside unit execution; terminates the whole job.
    #[error("job failed: {0}")]
    JobFailure(String),

    #[error("no successful targets ({total} attempted)")]
    NoSuccessfulTargets { total: usize },

    #[error("persistence warning: {0}")]
    Persistence(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn job_failure(message: impl Into<String>) -> Self {
        Self::JobFailure(message.into())
    }

    pub fn invalid_transition(job: impl Into<String>, from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition {
            job: job.into(),
            from,
            to,
        }
    }

    /// True for errors the caller caused (bad input), as opposed to server faults.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::JobNotFound(_))
    }
}
