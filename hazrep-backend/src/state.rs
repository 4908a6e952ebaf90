use std::sync::Arc;

use hazrep_auth::IdentityProvider;
use hazrep_queue::WorkQueue;
use hazrep_secrets::CredentialResolver;
use hazrep_store::DbPool;
use hazrep_workers::CompletionWorker;

/// Shared application state passed to every route handler.
///
/// Clients are created once at startup and reused across invocations; tests
/// substitute in-memory fakes per collaborator.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<DbPool>,
    pub queue: Arc<dyn WorkQueue>,
    pub credentials: CredentialResolver,
    pub identity: Arc<dyn IdentityProvider>,
    /// Shared with the queue-driven completion worker so the webhook path
    /// finalizes through the exact same logic.
    pub completion: Arc<CompletionWorker>,
}

impl AppState {
    pub fn new(
        db_pool: DbPool,
        queue: Arc<dyn WorkQueue>,
        credentials: CredentialResolver,
        identity: Arc<dyn IdentityProvider>,
        completion: Arc<CompletionWorker>,
    ) -> Self {
        Self {
            db_pool: Arc::new(db_pool),
            queue,
            credentials,
            identity,
            completion,
        }
    }
}
