//! HTTP error mapping

use crate::auth::AuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rivalscope_core::{Error, ErrorBody};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("{0}")]
    BadRequest(String),

    /// The job exists but has no report yet.
    #[error("job {job_id} is still {status}")]
    NotReady { job_id: String, status: String, progress: u8 },

    /// The job ended in `failed`; there is no report.
    #[error("{message}")]
    JobFailed { job_id: String, message: String, step: String },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Core(Error::Configuration(_)) => StatusCode::BAD_REQUEST,
            Self::Core(Error::JobNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Core(Error::InvalidTransition { .. }) => StatusCode::CONFLICT,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotReady { .. } => StatusCode::CONFLICT,
            Self::JobFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = match &self {
            Self::NotReady {
                job_id,
                status,
                progress,
            } => json!({
                "error": self.to_string(),
                "job_id": job_id,
                "status": status,
                "progress_percentage": progress,
            }),
            Self::JobFailed {
                job_id,
                message,
                step,
            } => json!({
                "error": message,
                "job_id": job_id,
                "step": step,
            }),
            _ => json!(ErrorBody::new(self.to_string())),
        };
        (status, Json(body)).into_response()
    }
}
