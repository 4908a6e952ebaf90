//! Error types for pool configuration and job queries.

use std::num::ParseIntError;

use thiserror::Error;

/// Errors that can occur while configuring the pool or reading job rows.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("environment variable {0} is missing")]
    MissingEnvVar(String),
    #[error("database url cannot be empty")]
    EmptyDatabaseUrl,
    #[error("failed to parse numeric environment variable {var}: {source}")]
    InvalidNumber {
        var: String,
        #[source]
        source: ParseIntError,
    },
    #[error("file/directory creation error: {0}")]
    FileCreation(String),
    #[error("unknown job status '{0}'")]
    UnknownStatus(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
