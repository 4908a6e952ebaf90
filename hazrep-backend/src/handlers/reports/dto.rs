use serde_json::{json, Value};

use hazrep_store::jobs::JobRecord;

/// Reduced caller-facing view of a job.
///
/// Deliberately excludes the external correlation ids and the raw input —
/// callers only ever see status, result, and error.
pub fn job_view(job: &JobRecord) -> Value {
    let mut view = json!({
        "jobId": job.job_id,
        "status": job.status,
        "userId": job.user_id,
        "createdAt": job.created_at,
        "updatedAt": job.updated_at,
    });
    if let Some(raw) = job.result.as_deref() {
        // Stored results are JSON text; fall back to the raw string rather
        // than failing the whole view if a row predates the current schema.
        view["result"] =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
    }
    if let Some(error) = &job.error_message {
        view["error"] = json!(error);
    }
    view
}
