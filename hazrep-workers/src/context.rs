//! Shared worker collaborators.

use std::sync::Arc;

use hazrep_gen_client::GenerationApi;
use hazrep_queue::WorkQueue;
use hazrep_secrets::CredentialResolver;
use hazrep_store::DbPool;

/// Bound on content-validation regenerations per job.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Everything a worker invocation needs, created once at process start and
/// reused across invocations. Tests substitute fakes per collaborator.
#[derive(Clone)]
pub struct WorkerContext {
    pub db_pool: DbPool,
    pub queue: Arc<dyn WorkQueue>,
    pub credentials: CredentialResolver,
    pub gen_api: Arc<dyn GenerationApi>,
    pub retry: RetryPolicy,
    /// Where the generation API should push its signed completion callback.
    /// `None` disables the webhook path; polling still works.
    pub callback_url: Option<String>,
}

impl WorkerContext {
    pub fn new(
        db_pool: DbPool,
        queue: Arc<dyn WorkQueue>,
        credentials: CredentialResolver,
        gen_api: Arc<dyn GenerationApi>,
        retry: RetryPolicy,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            db_pool,
            queue,
            credentials,
            gen_api,
            retry,
            callback_url,
        }
    }
}
