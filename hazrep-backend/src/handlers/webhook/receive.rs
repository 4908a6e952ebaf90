use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, Query};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use hazrep_auth::webhook::{verify_signature, SIGNATURE_HEADER};
use hazrep_secrets::SecretsError;
use hazrep_workers::FinalizeOutcome;

use crate::{error::ApiError, state::AppState};

/// Push callback body from the generation API.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    status: String,
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// POST /webhook?tenant_id=...&job_id=...
/// Signed push completion from the generation API.
///
/// The signature is HMAC-SHA256 over the raw request body with the tenant's
/// webhook secret; the tenant comes from the query string, out-of-band of the
/// job record. Nothing about the job is touched until the signature checks
/// out.
pub async fn receive(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = params
        .get("tenant_id")
        .map(String::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("tenant_id query parameter is required"))?;
    let job_id = params
        .get("job_id")
        .ok_or_else(|| ApiError::bad_request("job_id query parameter is required"))?;
    let job_id =
        uuid::Uuid::parse_str(job_id).map_err(|_| ApiError::bad_request("invalid job id"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::SignatureMismatch)?;

    // An unknown tenant answers exactly like a bad signature so this
    // unauthenticated endpoint leaks nothing about tenant existence.
    let creds = match state.credentials.resolve(tenant_id).await {
        Ok(creds) => creds,
        Err(SecretsError::TenantConfigNotFound(_)) => return Err(ApiError::SignatureMismatch),
        Err(e) => return Err(e.into()),
    };
    if verify_signature(&creds.webhook_secret, &body, signature).is_err() {
        tracing::warn!(%tenant_id, %job_id, "webhook signature verification failed");
        return Err(ApiError::SignatureMismatch);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid webhook payload: {e}")))?;

    let outcome = match payload.status.as_str() {
        "completed" => {
            let reply = payload
                .reply
                .ok_or_else(|| ApiError::bad_request("completed callback without a reply"))?;
            state.completion.finalize(job_id, tenant_id, &reply).await?
        }
        "failed" => {
            let message = payload
                .error
                .unwrap_or_else(|| "generation failed".to_owned());
            state
                .completion
                .record_external_failure(job_id, tenant_id, &message)
                .await?
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "unsupported callback status '{other}'"
            )))
        }
    };

    let label = match outcome {
        // Dispatch has not landed yet; a 5xx makes the sender retry later,
        // mirroring the polling path's deferral.
        FinalizeOutcome::NotReady => {
            return Err(ApiError::Unexpected(
                "job has not been dispatched yet".into(),
            ))
        }
        FinalizeOutcome::Completed => "completed",
        FinalizeOutcome::Regenerating => "regenerating",
        FinalizeOutcome::RetryExhausted | FinalizeOutcome::Failed => "failed",
        FinalizeOutcome::AlreadyFinal => "ignored",
    };
    Ok(Json(json!({ "result": label })))
}
