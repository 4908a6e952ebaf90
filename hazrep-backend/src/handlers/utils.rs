use axum::http::HeaderMap;

use hazrep_auth::{RequestIdentity, TENANT_HEADER, USER_HEADER};

use crate::{error::ApiError, state::AppState};

/// Resolve the request identity from the BFF-injected headers.
pub async fn identify(state: &AppState, headers: &HeaderMap) -> Result<RequestIdentity, ApiError> {
    let tenant = headers.get(TENANT_HEADER).and_then(|v| v.to_str().ok());
    let user = headers.get(USER_HEADER).and_then(|v| v.to_str().ok());
    state
        .identity
        .identify(tenant, user)
        .await
        .map_err(ApiError::from)
}

/// Parse an optional non-negative integer query parameter.
pub fn parse_non_negative_i64(
    value: Option<&String>,
    default: i64,
    name: &str,
) -> Result<i64, ApiError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| ApiError::bad_request(format!("{name} must be a non-negative integer"))),
    }
}
