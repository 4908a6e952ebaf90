//! Queue consumption loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use hazrep_queue::WorkKind;

use crate::completion::CompletionWorker;
use crate::context::WorkerContext;
use crate::dispatch::DispatchWorker;
use crate::Disposition;

/// Receive work items until `shutdown` fires, routing each to the matching
/// worker. Spawn several of these for parallelism; every handler is
/// re-entrant, so overlapping invocations for the same job are safe.
pub async fn run_worker_loop(
    ctx: Arc<WorkerContext>,
    idle_wait: Duration,
    shutdown: CancellationToken,
) {
    let dispatch = DispatchWorker::new(ctx.clone());
    let completion = CompletionWorker::new(ctx.clone());
    info!("worker loop started");

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = ctx.queue.receive() => received,
        };

        let delivery = match received {
            Ok(Some(delivery)) => delivery,
            Ok(None) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(idle_wait) => continue,
                }
            }
            Err(e) => {
                error!(error = %e, "queue receive failed");
                tokio::time::sleep(idle_wait).await;
                continue;
            }
        };

        let outcome = match delivery.item.kind {
            WorkKind::Dispatch => dispatch.handle(&delivery.item).await,
            WorkKind::Poll => completion.handle_poll(&delivery.item).await,
        };

        let settle = match outcome {
            Ok(Disposition::Done) => ctx.queue.ack(delivery.receipt).await,
            Ok(Disposition::Defer) => {
                debug!(job_id = %delivery.item.job_id, kind = %delivery.item.kind,
                    "deferring work item");
                ctx.queue.nack(delivery.receipt).await
            }
            Err(e) => {
                // Transient failure: nack and let redelivery retry it.
                error!(job_id = %delivery.item.job_id, kind = %delivery.item.kind,
                    receive_count = delivery.receive_count, error = %e,
                    "work item failed, leaving for redelivery");
                ctx.queue.nack(delivery.receipt).await
            }
        };
        if let Err(e) = settle {
            error!(error = %e, "failed to settle delivery");
        }
    }

    info!("worker loop stopped");
}
