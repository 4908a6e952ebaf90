use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use hazrep_auth::IdentityError;
use hazrep_queue::QueueError;
use hazrep_secrets::SecretsError;
use hazrep_store::StoreError;
use hazrep_workers::WorkerError;

/// Top-level API error shared by all route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("credential error: {0}")]
    Secrets(#[from] SecretsError),
    #[error("webhook signature verification failed")]
    SignatureMismatch,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            ApiError::Identity(_) => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            // Tenant provisioning problems are configuration, not caller
            // errors; the request cannot succeed until an operator acts.
            ApiError::Secrets(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::SignatureMismatch => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            // The worker could not attribute the job to the caller's tenant;
            // answer as if the job does not exist.
            WorkerError::JobNotFound(_) => Self::NotFound("job not found".into()),
            WorkerError::Store(e) => Self::Store(e),
            WorkerError::Queue(e) => Self::Queue(e),
            other => Self::Unexpected(other.to_string()),
        }
    }
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}
