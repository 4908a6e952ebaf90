use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use hazrep_store::jobs;

use crate::handlers::reports::dto::job_view;
use crate::handlers::utils::parse_non_negative_i64;
use crate::{error::ApiError, state::AppState};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// GET /reports?limit=&offset=
/// Tenant-scoped job history, newest first.
pub async fn list(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let identity = crate::handlers::utils::identify(&state, &headers).await?;


    // Out-of-range limits are clamped rather than rejected.
    let limit = parse_non_negative_i64(params.get("limit"), DEFAULT_LIMIT, "limit")?
        .clamp(1, MAX_LIMIT);
    let offset = parse_non_negative_i64(params.get("offset"), 0, "offset")?;

    let mut conn = state.db_pool.acquire().await?;
    let rows = jobs::find_for_tenant(&mut *conn, &identity.tenant_id, limit, offset).await?;
    let items: Vec<Value> = rows.iter().map(job_view).collect();

    Ok(Json(json!({
        "jobs": items,
        "limit": limit,
        "offset": offset,
    })))
}
