use std::sync::Arc;

use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use hazrep_queue::WorkItem;
use hazrep_store::jobs::{self, JobRecord};

use crate::{error::ApiError, state::AppState};

/// POST /reports
/// Accept a generation request and return the job id immediately.
///
/// The external generation API is never contacted here — that is the whole
/// point of the asynchronous design. Caller latency is one store write plus
/// one enqueue.
pub async fn submit(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let identity = crate::handlers::utils::identify(&state, &headers).await?;

    let payload = body.map(|json| json.0).unwrap_or(Value::Null);
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("message is required"))?;

    // Fail fast on unprovisioned tenants: no job row is created.
    state.credentials.resolve(&identity.tenant_id).await?;

    let job_id = uuid::Uuid::new_v4();
    let record = JobRecord::new(
        job_id,
        &identity.tenant_id,
        &identity.user_id,
        json!({ "message": message }).to_string(),
    );

    let mut conn = state.db_pool.acquire().await?;
    jobs::insert_job(&mut *conn, &record).await?;

    // Row write happens-before enqueue. If the enqueue fails the request
    // errors, but the PENDING row stays visible to status polling instead of
    // being silently lost.
    state
        .queue
        .enqueue(WorkItem::dispatch(job_id, identity.tenant_id.clone()))
        .await?;

    tracing::info!(job_id = %job_id, tenant_id = %identity.tenant_id, "report job accepted");
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}
