use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use hazrep_store::jobs;

use crate::handlers::reports::dto::job_view;
use crate::{error::ApiError, state::AppState};

/// GET /reports/{jobId}
/// Return the status view of a single job.
///
/// A job that belongs to another tenant answers 403 without confirming that
/// the id exists — the ownership check is the anti-IDOR boundary, not a
/// nicety.
pub async fn get(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(path): Path<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let identity = crate::handlers::utils::identify(&state, &headers).await?;

    let id_str = path
        .get("jobId")
        .ok_or_else(|| ApiError::bad_request("missing jobId path parameter"))?;
    let job_id =
        uuid::Uuid::parse_str(id_str).map_err(|_| ApiError::bad_request("invalid job id"))?;

    let mut conn = state.db_pool.acquire().await?;
    let Some(job) = jobs::find_by_job_id(&mut *conn, &job_id).await? else {
        return Err(ApiError::not_found("job not found"));
    };
    if job.tenant_id != identity.tenant_id {
        return Err(ApiError::forbidden("access denied"));
    }

    Ok(Json(job_view(&job)))
}
