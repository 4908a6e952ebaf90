//! Completion worker: detects finished generations and finalizes jobs.
//!
//! Two completion paths feed this code — the queue-driven polling handler and
//! the webhook handler in the HTTP service. Both funnel into [`finalize`],
//! and every transition is conditional on the stored status, so whichever
//! path lands first wins and the other becomes a no-op.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use hazrep_gen_client::{CorrelationIds, PollOutcome};
use hazrep_queue::{WorkItem, WorkQueue};
use hazrep_store::jobs::{self, JobStatus};

use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::Disposition;

/// Outcome of a finalize attempt, shared by the polling and webhook paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Content validated; the job is COMPLETED.
    Completed,
    /// Content failed validation; a regeneration was enqueued.
    Regenerating,
    /// Content failed validation and the retry budget is spent; FAILED.
    RetryExhausted,
    /// The external service reported failure; FAILED without consuming a
    /// retry.
    Failed,
    /// The job was already terminal; nothing was touched.
    AlreadyFinal,
    /// The job has not been dispatched yet; try again later.
    NotReady,
}

pub struct CompletionWorker {
    ctx: Arc<WorkerContext>,
}

impl CompletionWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Handle a `WorkKind::Poll` item.
    ///
    /// Answers [`Disposition::Defer`] while the external job is still in
    /// progress — the visibility timeout is the backoff; there is no sleep
    /// loop inside an invocation.
    pub async fn handle_poll(&self, item: &WorkItem) -> Result<Disposition, WorkerError> {
        let mut conn = self.ctx.db_pool.acquire().await?;

        let Some(job) = jobs::find_by_job_id(&mut *conn, &item.job_id).await? else {
            warn!(job_id = %item.job_id, "poll item references unknown job");
            return Ok(Disposition::Done);
        };
        if job.tenant_id != item.tenant_id {
            warn!(job_id = %item.job_id, "poll item tenant does not match job owner");
            return Ok(Disposition::Done);
        }

        let status = job.status()?;
        if status.is_terminal() {
            debug!(job_id = %item.job_id, status = %job.status, "job already settled");
            return Ok(Disposition::Done);
        }
        if status == JobStatus::Pending {
            // Dispatch may still be in flight; observing PENDING means "not
            // dispatched yet", never "failed".
            return Ok(Disposition::Defer);
        }

        let (Some(thread_id), Some(message_id)) = (&job.thread_id, &job.message_id) else {
            warn!(job_id = %item.job_id, "job is SENT but has no correlation ids");
            return Ok(Disposition::Defer);
        };
        let ids = CorrelationIds {
            thread_id: thread_id.clone(),
            message_id: message_id.clone(),
        };
        drop(conn);

        let creds = match self.ctx.credentials.resolve(&item.tenant_id).await {
            Ok(creds) => creds,
            Err(e) if e.is_fatal() => {
                warn!(job_id = %item.job_id, tenant_id = %item.tenant_id, error = %e,
                    "credential resolution failed permanently");
                let mut conn = self.ctx.db_pool.acquire().await?;
                jobs::mark_failed(&mut *conn, &item.job_id, &e.to_string()).await?;
                return Ok(Disposition::Done);
            }
            Err(e) => return Err(e.into()),
        };
        let token = self
            .ctx
            .gen_api
            .authenticate(&creds.api_key, &creds.login_id)
            .await?;

        match self.ctx.gen_api.poll(&token, &ids).await? {
            PollOutcome::Pending => Ok(Disposition::Defer),
            PollOutcome::Failed(message) => {
                let mut conn = self.ctx.db_pool.acquire().await?;
                jobs::mark_failed(
                    &mut *conn,
                    &item.job_id,
                    &format!("generation failed: {message}"),
                )
                .await?;
                info!(job_id = %item.job_id, "generation API reported failure");
                Ok(Disposition::Done)
            }
            PollOutcome::Done(raw) => {
                self.finalize(item.job_id, &item.tenant_id, &raw).await?;
                Ok(Disposition::Done)
            }
        }
    }

    /// Validate raw generated content and settle the job.
    ///
    /// Idempotent: an already-terminal job returns
    /// [`FinalizeOutcome::AlreadyFinal`] without side effects, and the
    /// conditional store updates make racing invocations safe.
    pub async fn finalize(
        &self,
        job_id: Uuid,
        tenant_id: &str,
        raw_content: &str,
    ) -> Result<FinalizeOutcome, WorkerError> {
        let mut conn = self.ctx.db_pool.acquire().await?;

        let Some(job) = jobs::find_by_job_id(&mut *conn, &job_id).await? else {
            return Err(WorkerError::JobNotFound(job_id));
        };
        if job.tenant_id != tenant_id {
            // Callers pass the tenant from their own trust boundary; a
            // mismatch reads the same as an unknown job.
            return Err(WorkerError::JobNotFound(job_id));
        }

        let status = job.status()?;
        if status.is_terminal() {
            return Ok(FinalizeOutcome::AlreadyFinal);
        }
        if status == JobStatus::Pending {
            return Ok(FinalizeOutcome::NotReady);
        }

        match hazrep_validator::validate(raw_content) {
            hazrep_validator::Outcome::Valid(report) => {
                let result_json = serde_json::to_string(&report)?;
                let updated = jobs::mark_completed(&mut *conn, &job_id, &result_json).await?;
                if updated {
                    info!(job_id = %job_id, tenant_id = %tenant_id, "job completed");
                    Ok(FinalizeOutcome::Completed)
                } else {
                    Ok(FinalizeOutcome::AlreadyFinal)
                }
            }
            hazrep_validator::Outcome::Invalid(reason) => {
                // Optimistic bump: exactly one invocation wins the counter
                // for a given attempt; losers treat the job as settled.
                let bumped = jobs::bump_retry(&mut *conn, &job_id, job.retry_count).await?;
                if !bumped {
                    return Ok(FinalizeOutcome::AlreadyFinal);
                }

                let attempts = job.retry_count as u32 + 1;
                if attempts >= self.ctx.retry.max_retries {
                    let message = format!(
                        "validation failed after {} regenerations",
                        self.ctx.retry.max_retries
                    );
                    jobs::mark_failed(&mut *conn, &job_id, &message).await?;
                    warn!(job_id = %job_id, %reason, "retry budget exhausted");
                    Ok(FinalizeOutcome::RetryExhausted)
                } else {
                    warn!(job_id = %job_id, %reason, attempt = attempts,
                        "generated content failed validation, regenerating");
                    self.ctx
                        .queue
                        .enqueue(WorkItem::dispatch(job_id, tenant_id))
                        .await?;
                    Ok(FinalizeOutcome::Regenerating)
                }
            }
        }
    }

    /// Record a failure the external service pushed via webhook.
    ///
    /// No retry is consumed: the service said the generation itself failed.
    pub async fn record_external_failure(
        &self,
        job_id: Uuid,
        tenant_id: &str,
        message: &str,
    ) -> Result<FinalizeOutcome, WorkerError> {
        let mut conn = self.ctx.db_pool.acquire().await?;

        let Some(job) = jobs::find_by_job_id(&mut *conn, &job_id).await? else {
            return Err(WorkerError::JobNotFound(job_id));
        };
        if job.tenant_id != tenant_id {
            return Err(WorkerError::JobNotFound(job_id));
        }
        if job.status()?.is_terminal() {
            return Ok(FinalizeOutcome::AlreadyFinal);
        }

        jobs::mark_failed(&mut *conn, &job_id, &format!("generation failed: {message}")).await?;
        info!(job_id = %job_id, "external failure recorded");
        Ok(FinalizeOutcome::Failed)
    }
}
