//! Pipeline failures and their HTTP rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use commenter_core::{
    fingerprint::DecodeError,
    model::{MessageResponse, RequestId, StatusResponse},
    validation::ValidationError,
};
use thiserror::Error;

/// Status reported when an image is not attested by the run logs.
pub const SHA_NOT_FOUND: &str = "screenshot sha not found in action logs";

/// Everything an invocation can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Submission is structurally incomplete.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// Body is not the JSON the phase expects.
    #[error("malformed request body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    /// A staged image does not decode.
    #[error(transparent)]
    Content(#[from] DecodeError),
    /// Recomputed fingerprint of `image` does not occur in the log corpus.
    #[error("screenshot sha not found in action logs")]
    ShaNotFound {
        /// Label of the rejected image.
        image: String,
        /// Its recomputed fingerprint.
        fingerprint: String,
    },
    /// Continuation for an id that was never staged.
    #[error("no staged submission for request {0}")]
    NotFound(RequestId),
    /// Credential exchange, storage, queue, archive or comment failure.
    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

impl PipelineError {
    /// HTTP status this failure is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Invalid(_) | Self::MalformedBody(_) | Self::Content(_) | Self::ShaNotFound { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        match &self {
            Self::ShaNotFound { image, fingerprint } => {
                tracing::warn!(%image, %fingerprint, "verification failed");
                let body = Json(StatusResponse {
                    status: SHA_NOT_FOUND.to_string(),
                });
                (code, body).into_response()
            }
            Self::Dependency(e) => {
                tracing::error!(error = format!("{e:#}"), "request failed");
                let body = Json(MessageResponse {
                    message: e.to_string(),
                });
                (code, body).into_response()
            }
            other => {
                tracing::warn!(error = %other, "request rejected");
                let body = Json(MessageResponse {
                    message: other.to_string(),
                });
                (code, body).into_response()
            }
        }
    }
}
