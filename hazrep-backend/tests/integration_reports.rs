//! Intake, status query, and history tests over in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;
use tower::util::ServiceExt;

use hazrep_auth::TrustedHeaderIdentity;
use hazrep_backend::error::ApiError;
use hazrep_backend::handlers::reports;
use hazrep_backend::state::AppState;
use hazrep_gen_client::{GenerationApi, StubGenerationApi};
use hazrep_queue::{MemoryWorkQueue, WorkKind, WorkQueue};
use hazrep_secrets::{CredentialResolver, MemorySecretStore, SecretStore};
use hazrep_store::jobs::{self, JobStatus};
use hazrep_store::{create_pool, DbConnectionConfig, DbPool};
use hazrep_workers::{CompletionWorker, RetryPolicy, WorkerContext};

const SECRET_REF: &str = "hazrep/tenants";

struct TestApp {
    state: Arc<AppState>,
    pool: DbPool,
    queue: Arc<MemoryWorkQueue>,
    gen_api: Arc<StubGenerationApi>,
}

async fn test_app(tenants: &[&str]) -> TestApp {
    let pool = create_pool(&DbConnectionConfig::new("sqlite::memory:"))
        .await
        .expect("create pool");
    jobs::apply_schema(&pool).await.expect("apply schema");

    let secrets = MemorySecretStore::new();
    let bundles: Vec<serde_json::Value> = tenants
        .iter()
        .map(|tenant| {
            json!({
                "tenant_id": tenant,
                "secret_data": {
                    "api_key": format!("key-{tenant}"),
                    "login_id": format!("login-{tenant}"),
                    "model_id": "safety-v2",
                    "webhook_secret": format!("whs-{tenant}")
                }
            })
        })
        .collect();
    secrets.insert(SECRET_REF, json!(bundles));
    let credentials =
        CredentialResolver::new(Arc::new(secrets) as Arc<dyn SecretStore>, SECRET_REF);

    let queue = Arc::new(MemoryWorkQueue::new(Duration::from_secs(30), 5));
    let gen_api = Arc::new(StubGenerationApi::new());
    let ctx = Arc::new(WorkerContext::new(
        pool.clone(),
        queue.clone() as Arc<dyn WorkQueue>,
        credentials.clone(),
        gen_api.clone() as Arc<dyn GenerationApi>,
        RetryPolicy::default(),
        None,
    ));

    let state = Arc::new(AppState::new(
        pool.clone(),
        queue.clone() as Arc<dyn WorkQueue>,
        credentials,
        Arc::new(TrustedHeaderIdentity),
        Arc::new(CompletionWorker::new(ctx)),
    ));

    TestApp {
        state,
        pool,
        queue,
        gen_api,
    }
}

fn identity_headers(tenant: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        hazrep_auth::TENANT_HEADER,
        HeaderValue::from_str(tenant).expect("header value"),
    );
    headers.insert(hazrep_auth::USER_HEADER, HeaderValue::from_static("user-1"));
    headers
}

async fn submit(app: &TestApp, tenant: &str, message: &str) -> uuid::Uuid {
    let (status, body) = reports::submit::submit(
        Extension(app.state.clone()),
        identity_headers(tenant),
        Some(axum::Json(json!({ "message": message }))),
    )
    .await
    .expect("submit");
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body.0.get("jobId").and_then(|v| v.as_str()).expect("jobId");
    uuid::Uuid::parse_str(id).expect("uuid")
}

#[tokio::test]
async fn submit_returns_job_id_without_touching_the_external_api() {
    let app = test_app(&["t1"]).await;
    let job_id = submit(&app, "t1", "crane outrigger sank into soft ground").await;

    let job = jobs::find_by_job_id(&app.pool, &job_id)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(job.status().expect("status"), JobStatus::Pending);
    assert_eq!(job.tenant_id, "t1");
    assert_eq!(job.user_id, "user-1");

    // The work item is queued for the dispatch worker...
    let delivery = app.queue.receive().await.expect("receive").expect("delivery");
    assert_eq!(delivery.item.kind, WorkKind::Dispatch);
    assert_eq!(delivery.item.job_id, job_id);
    // ...and intake itself never called the generation API.
    assert_eq!(app.gen_api.submission_count(), 0);
}

#[tokio::test]
async fn submit_rejects_missing_message_without_creating_a_job() {
    let app = test_app(&["t1"]).await;

    for body in [None, Some(axum::Json(json!({}))), Some(axum::Json(json!({ "message": "  " })))] {
        let err = reports::submit::submit(
            Extension(app.state.clone()),
            identity_headers("t1"),
            body,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    let rows = jobs::find_for_tenant(&app.pool, "t1", 10, 0)
        .await
        .expect("query");
    assert!(rows.is_empty());
    assert!(app.queue.is_empty().await);
}

#[tokio::test]
async fn submit_requires_a_tenant_identity() {
    let app = test_app(&["t1"]).await;
    let err = reports::submit::submit(
        Extension(app.state.clone()),
        HeaderMap::new(),
        Some(axum::Json(json!({ "message": "hello" }))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Identity(_)));
}

#[tokio::test]
async fn submit_fails_for_unprovisioned_tenant_before_any_write() {
    let app = test_app(&["t1"]).await;
    let err = reports::submit::submit(
        Extension(app.state.clone()),
        identity_headers("t-unknown"),
        Some(axum::Json(json!({ "message": "hello" }))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Secrets(_)));

    let rows = jobs::find_for_tenant(&app.pool, "t-unknown", 10, 0)
        .await
        .expect("query");
    assert!(rows.is_empty());
    assert!(app.queue.is_empty().await);
}

#[tokio::test]
async fn status_view_tracks_the_job_lifecycle() {
    let app = test_app(&["t1"]).await;
    let job_id = submit(&app, "t1", "hello").await;

    let view = reports::get::get(
        Extension(app.state.clone()),
        identity_headers("t1"),
        Path(std::collections::HashMap::from([(
            "jobId".to_string(),
            job_id.to_string(),
        )])),
    )
    .await
    .expect("get")
    .0;
    assert_eq!(view["status"], "PENDING");
    assert!(view.get("result").is_none());
    assert!(view.get("error").is_none());

    jobs::mark_sent(&app.pool, &job_id, "tid-1", "mid-1")
        .await
        .expect("sent");
    jobs::mark_completed(&app.pool, &job_id, r#"[{"caseNo":1}]"#)
        .await
        .expect("completed");

    let view = reports::get::get(
        Extension(app.state.clone()),
        identity_headers("t1"),
        Path(std::collections::HashMap::from([(
            "jobId".to_string(),
            job_id.to_string(),
        )])),
    )
    .await
    .expect("get")
    .0;
    assert_eq!(view["status"], "COMPLETED");
    assert_eq!(view["result"][0]["caseNo"], 1);
    // The reduced view never exposes correlation ids or credentials.
    assert!(view.get("threadId").is_none());
    assert!(view.get("thread_id").is_none());
    assert!(view.get("messageId").is_none());
}

#[tokio::test]
async fn foreign_tenant_gets_forbidden_not_the_result() {
    let app = test_app(&["t1", "t2"]).await;
    let job_id = submit(&app, "t1", "hello").await;

    let err = reports::get::get(
        Extension(app.state.clone()),
        identity_headers("t2"),
        Path(std::collections::HashMap::from([(
            "jobId".to_string(),
            job_id.to_string(),
        )])),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = test_app(&["t1"]).await;
    let err = reports::get::get(
        Extension(app.state.clone()),
        identity_headers("t1"),
        Path(std::collections::HashMap::from([(
            "jobId".to_string(),
            uuid::Uuid::new_v4().to_string(),
        )])),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn history_is_tenant_scoped() {
    let app = test_app(&["t1", "t2"]).await;
    submit(&app, "t1", "first").await;
    submit(&app, "t1", "second").await;
    submit(&app, "t2", "other tenant").await;

    let body = reports::list::list(
        Extension(app.state.clone()),
        identity_headers("t1"),
        Query(std::collections::HashMap::new()),
    )
    .await
    .expect("list")
    .0;
    let items = body["jobs"].as_array().expect("jobs array");
    assert_eq!(items.len(), 2);
    assert_eq!(body["limit"], 20);
}

#[tokio::test]
async fn history_rejects_malformed_limit() {
    let app = test_app(&["t1"]).await;
    let err = reports::list::list(
        Extension(app.state.clone()),
        identity_headers("t1"),
        Query(std::collections::HashMap::from([(
            "limit".to_string(),
            "many".to_string(),
        )])),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn router_serves_submit_and_health() {
    let app = test_app(&["t1"]).await;
    let router = hazrep_backend::build_router(app.state.clone());

    let response = router
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/reports")
                .header("content-type", "application/json")
                .header(hazrep_auth::TENANT_HEADER, "t1")
                .header(hazrep_auth::USER_HEADER, "user-1")
                .body(axum::body::Body::from(r#"{"message":"hello"}"#))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = router
        .oneshot(
            axum::http::Request::builder()
                .uri("/health")
                .body(axum::body::Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
