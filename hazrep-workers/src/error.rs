//! Worker errors.
//!
//! Anything that reaches the run loop as an `Err` is treated as transient:
//! the delivery is nacked and the queue's visibility timeout schedules the
//! retry. Conditions that retrying cannot fix (bad input, missing tenant
//! config, exhausted regenerations) are turned into job state transitions
//! inside the handlers instead and never surface here.

use thiserror::Error;
use uuid::Uuid;

use hazrep_gen_client::GenApiError;
use hazrep_queue::QueueError;
use hazrep_secrets::SecretsError;
use hazrep_store::StoreError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Secrets(#[from] SecretsError),
    #[error(transparent)]
    GenApi(#[from] GenApiError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for WorkerError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(StoreError::Sqlx(e))
    }
}
