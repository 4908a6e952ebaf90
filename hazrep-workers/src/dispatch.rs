//! Dispatch worker: submits a job's input to the external generation API.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use hazrep_queue::{WorkItem, WorkQueue};
use hazrep_store::jobs;

use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::Disposition;

/// Handles `WorkKind::Dispatch` items: the PENDING -> SENT transition and the
/// resubmission leg of a regeneration (SENT -> SENT with fresh ids).
///
/// Re-entry is tolerated: a duplicate invocation submits a duplicate request
/// to the external API, but each submission gets fresh correlation ids and
/// only the most recently stored pair is trusted afterwards.
pub struct DispatchWorker {
    ctx: Arc<WorkerContext>,
}

impl DispatchWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, item: &WorkItem) -> Result<Disposition, WorkerError> {
        let mut conn = self.ctx.db_pool.acquire().await?;

        let Some(job) = jobs::find_by_job_id(&mut *conn, &item.job_id).await? else {
            warn!(job_id = %item.job_id, "dispatch item references unknown job");
            return Ok(Disposition::Done);
        };
        if job.tenant_id != item.tenant_id {
            warn!(job_id = %item.job_id, "dispatch item tenant does not match job owner");
            return Ok(Disposition::Done);
        }
        if job.status()?.is_terminal() {
            debug!(job_id = %item.job_id, status = %job.status, "job already settled");
            return Ok(Disposition::Done);
        }

        // Input problems cannot be fixed by retrying: fail the job, keep the
        // retry budget untouched, and let the queue drop the message.
        let Some(message) = extract_message(&job.input) else {
            warn!(job_id = %item.job_id, "job input has no usable message");
            jobs::mark_failed(&mut *conn, &item.job_id, "invalid input: message is required")
                .await?;
            return Ok(Disposition::Done);
        };

        let creds = match self.ctx.credentials.resolve(&item.tenant_id).await {
            Ok(creds) => creds,
            Err(e) if e.is_fatal() => {
                warn!(job_id = %item.job_id, tenant_id = %item.tenant_id, error = %e,
                    "credential resolution failed permanently");
                jobs::mark_failed(&mut *conn, &item.job_id, &e.to_string()).await?;
                return Ok(Disposition::Done);
            }
            // Transient secret-store trouble: re-raise for redelivery.
            Err(e) => return Err(e.into()),
        };
        drop(conn);

        // Transient external failures (auth, network, 5xx) propagate; the
        // queue's redelivery is the only retry mechanism for this step.
        let token = self
            .ctx
            .gen_api
            .authenticate(&creds.api_key, &creds.login_id)
            .await?;
        let ids = self
            .ctx
            .gen_api
            .submit(
                &token,
                &message,
                &creds.model_id,
                self.ctx.callback_url.as_deref(),
            )
            .await?;

        let mut conn = self.ctx.db_pool.acquire().await?;
        let updated =
            jobs::mark_sent(&mut *conn, &item.job_id, &ids.thread_id, &ids.message_id).await?;
        if !updated {
            // The job went terminal while we were talking to the API; the
            // submission is wasted but harmless, its ids are never stored.
            debug!(job_id = %item.job_id, "job settled during dispatch, dropping ids");
            return Ok(Disposition::Done);
        }

        info!(job_id = %item.job_id, tenant_id = %item.tenant_id, thread_id = %ids.thread_id,
            "job dispatched to generation API");
        self.ctx
            .queue
            .enqueue(WorkItem::poll(item.job_id, item.tenant_id.clone()))
            .await?;
        Ok(Disposition::Done)
    }
}

/// Pull the prompt message out of the stored input payload.
fn extract_message(input_json: &str) -> Option<String> {
    let input: Value = serde_json::from_str(input_json).ok()?;
    input
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}
