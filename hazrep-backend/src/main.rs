//! Hazrep backend server.
//!
//! Entry point: configuration loading, store/queue/credential wiring, worker
//! loop spawn, and HTTP server startup.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use hazrep_backend::state::AppState;
use hazrep_gen_client::{GenerationApi, HttpGenerationApi};
use hazrep_queue::{MemoryWorkQueue, WorkQueue};
use hazrep_secrets::{CredentialResolver, MemorySecretStore, SecretStore};
use hazrep_workers::{run_worker_loop, CompletionWorker, RetryPolicy, WorkerContext};

mod cli;
mod tracing_setup;

use cli::CliArgs;

/// How long an idle worker loop sleeps between queue checks.
const WORKER_IDLE_WAIT: Duration = Duration::from_millis(250);
/// Worker loops to run alongside the HTTP server.
const WORKER_COUNT: usize = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    if args.help_requested {
        CliArgs::print_help();
        return Ok(());
    }

    let config = hazrep_config::load_config(args.config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    tracing_setup::install_tracing(&config.logging);

    // Store
    let db_cfg = hazrep_store::DbConnectionConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        ..Default::default()
    };
    let db_pool = hazrep_store::create_pool(&db_cfg)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create database pool: {e}"))?;
    hazrep_store::jobs::apply_schema(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("failed to apply schema: {e}"))?;
    tracing::info!(db_url = %config.database.url, "job store ready");

    // Queue
    let queue = Arc::new(MemoryWorkQueue::new(
        Duration::from_secs(config.queue.visibility_timeout_secs),
        config.queue.max_receive_count,
    ));

    // Tenant credentials
    let secret_store: Arc<dyn SecretStore> = match &config.secrets.file {
        Some(file) => Arc::new(
            MemorySecretStore::from_file(&config.secrets.secret_ref, file)
                .map_err(|e| anyhow::anyhow!("failed to load secrets file: {e}"))?,
        ),
        None => {
            tracing::warn!(
                "no secrets file configured; credential resolution will fail for every tenant"
            );
            Arc::new(MemorySecretStore::new())
        }
    };
    let credentials = CredentialResolver::new(secret_store, config.secrets.secret_ref.clone());

    // External generation API
    let gen_api: Arc<dyn GenerationApi> = Arc::new(HttpGenerationApi::new(
        config.generation.auth_url.clone(),
        config.generation.message_url.clone(),
    ));

    // Workers
    let ctx = Arc::new(WorkerContext::new(
        db_pool.clone(),
        queue.clone() as Arc<dyn WorkQueue>,
        credentials.clone(),
        gen_api,
        RetryPolicy {
            max_retries: config.workflow.max_retries,
        },
        config.generation.callback_url.clone(),
    ));
    let shutdown = CancellationToken::new();
    let mut worker_tasks = Vec::with_capacity(WORKER_COUNT);
    for _ in 0..WORKER_COUNT {
        worker_tasks.push(tokio::spawn(run_worker_loop(
            ctx.clone(),
            WORKER_IDLE_WAIT,
            shutdown.clone(),
        )));
    }

    // HTTP service
    let state = Arc::new(AppState::new(
        db_pool,
        queue as Arc<dyn WorkQueue>,
        credentials,
        Arc::new(hazrep_auth::TrustedHeaderIdentity),
        Arc::new(CompletionWorker::new(ctx)),
    ));
    let app = hazrep_backend::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "hazrep backend listening");

    axum::serve(listener, app.into_make_service()).await?;

    shutdown.cancel();
    for task in worker_tasks {
        let _ = task.await;
    }
    Ok(())
}
