//! Error types for the work queue.

use thiserror::Error;

/// Errors that may occur while interacting with the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend is unavailable")]
    Unavailable,

    #[error("failed to enqueue work item: {0}")]
    Backend(String),
}
