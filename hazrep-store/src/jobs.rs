//! Typed queries over the `jobs` table.
//!
//! One row per generation request. Rows are created once by intake and then
//! only ever updated through the conditional transition functions below;
//! nothing in the workflow deletes a row (retention is the store's concern).

use serde::{Deserialize, Serialize};
use sqlx::Executor;

use crate::error::StoreError;
use crate::pool::{DbBackend, DbPool};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Sent,
    Completed,
    Failed,
}

impl JobStatus {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// COMPLETED and FAILED are absorbing: no transition leaves them.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(StoreError::UnknownStatus(other.to_owned())),
        }
    }
}

/// One generation request as stored.
///
/// `input` and `result` hold JSON text; `thread_id`/`message_id` are the
/// external API's correlation ids for the most recent submission and are
/// replaced wholesale on regeneration.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub job_id: sqlx::types::Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub status: String,
    pub input: String,
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub retry_count: i64,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRecord {
    /// Build a fresh PENDING record for intake.
    pub fn new(
        job_id: sqlx::types::Uuid,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        input_json: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            job_id,
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            status: JobStatus::Pending.as_str().to_owned(),
            input: input_json.into(),
            thread_id: None,
            message_id: None,
            retry_count: 0,
            result: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Parse the stored status string.
    pub fn status(&self) -> Result<JobStatus, StoreError> {
        self.status.parse()
    }
}

#[inline]
fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Create the `jobs` table and its tenant/history index if missing.
pub async fn apply_schema(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL,
            input TEXT NOT NULL,
            thread_id TEXT,
            message_id TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            result TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_tenant_created ON jobs (tenant_id, created_at)")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_job<'e, E>(executor: E, record: &JobRecord) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = DbBackend>,
{
    sqlx::query(
        r#"INSERT INTO jobs (
            job_id, tenant_id, user_id, status, input, thread_id, message_id,
            retry_count, result, error_message, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(record.job_id)
    .bind(&record.tenant_id)
    .bind(&record.user_id)
    .bind(&record.status)
    .bind(&record.input)
    .bind(&record.thread_id)
    .bind(&record.message_id)
    .bind(record.retry_count)
    .bind(&record.result)
    .bind(&record.error_message)
    .bind(&record.created_at)
    .bind(&record.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_by_job_id<'e, E>(
    executor: E,
    job_id: &sqlx::types::Uuid,
) -> Result<Option<JobRecord>, sqlx::Error>
where
    E: Executor<'e, Database = DbBackend>,
{
    sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE job_id = ?")
        .bind(job_id)
        .fetch_optional(executor)
        .await
}

/// Tenant-scoped history, newest first.
pub async fn find_for_tenant<'e, E>(
    executor: E,
    tenant_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<JobRecord>, sqlx::Error>
where
    E: Executor<'e, Database = DbBackend>,
{
    sqlx::query_as::<_, JobRecord>(
        "SELECT * FROM jobs WHERE tenant_id = ? ORDER BY created_at DESC, job_id DESC LIMIT ? OFFSET ?",
    )
    .bind(tenant_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}

/// PENDING/SENT -> SENT with fresh correlation ids.
///
/// Also matches SENT so regeneration can overwrite the previous ids. Returns
/// whether a row changed; `false` means the job is already terminal.
pub async fn mark_sent<'e, E>(
    executor: E,
    job_id: &sqlx::types::Uuid,
    thread_id: &str,
    message_id: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = DbBackend>,
{
    let result = sqlx::query(
        "UPDATE jobs SET status = 'SENT', thread_id = ?, message_id = ?, updated_at = ? \
         WHERE job_id = ? AND status IN ('PENDING', 'SENT')",
    )
    .bind(thread_id)
    .bind(message_id)
    .bind(now_rfc3339())
    .bind(job_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// SENT -> COMPLETED with the validated result.
///
/// Conditional on the job still being SENT; the losing side of a
/// poll-vs-webhook race sees `false` and must not touch the row again.
pub async fn mark_completed<'e, E>(
    executor: E,
    job_id: &sqlx::types::Uuid,
    result_json: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = DbBackend>,
{
    let result = sqlx::query(
        "UPDATE jobs SET status = 'COMPLETED', result = ?, error_message = NULL, updated_at = ? \
         WHERE job_id = ? AND status = 'SENT'",
    )
    .bind(result_json)
    .bind(now_rfc3339())
    .bind(job_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Any non-terminal status -> FAILED.
pub async fn mark_failed<'e, E>(
    executor: E,
    job_id: &sqlx::types::Uuid,
    error_message: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = DbBackend>,
{
    let result = sqlx::query(
        "UPDATE jobs SET status = 'FAILED', error_message = ?, updated_at = ? \
         WHERE job_id = ? AND status NOT IN ('COMPLETED', 'FAILED')",
    )
    .bind(error_message)
    .bind(now_rfc3339())
    .bind(job_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Optimistic regeneration counter bump.
///
/// Only succeeds while the job is SENT and `retry_count` still equals
/// `expected_count`, so concurrent completion invocations cannot double-count
/// one invalid result.
pub async fn bump_retry<'e, E>(
    executor: E,
    job_id: &sqlx::types::Uuid,
    expected_count: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = DbBackend>,
{
    let result = sqlx::query(
        "UPDATE jobs SET retry_count = retry_count + 1, updated_at = ? \
         WHERE job_id = ? AND status = 'SENT' AND retry_count = ?",
    )
    .bind(now_rfc3339())
    .bind(job_id)
    .bind(expected_count)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConnectionConfig;
    use crate::pool::create_pool;

    async fn test_pool() -> DbPool {
        let config = DbConnectionConfig::new("sqlite::memory:");
        let pool = create_pool(&config).await.expect("create pool");
        apply_schema(&pool).await.expect("apply schema");
        pool
    }

    fn record(tenant: &str) -> JobRecord {
        JobRecord::new(
            sqlx::types::Uuid::new_v4(),
            tenant,
            "user-1",
            r#"{"message":"near-miss at the loading bay"}"#,
        )
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let pool = test_pool().await;
        let job = record("t1");
        insert_job(&pool, &job).await.expect("insert");

        let found = find_by_job_id(&pool, &job.job_id)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(found.tenant_id, "t1");
        assert_eq!(found.status().expect("status"), JobStatus::Pending);
        assert_eq!(found.retry_count, 0);
        assert!(found.thread_id.is_none());
    }

    #[tokio::test]
    async fn tenant_history_is_scoped_and_limited() {
        let pool = test_pool().await;
        for _ in 0..3 {
            insert_job(&pool, &record("t1")).await.expect("insert");
        }
        insert_job(&pool, &record("t2")).await.expect("insert");

        let rows = find_for_tenant(&pool, "t1", 2, 0).await.expect("query");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.tenant_id == "t1"));

        let rest = find_for_tenant(&pool, "t1", 10, 2).await.expect("query");
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn mark_sent_transitions_and_replaces_ids() {
        let pool = test_pool().await;
        let job = record("t1");
        insert_job(&pool, &job).await.expect("insert");

        assert!(mark_sent(&pool, &job.job_id, "tid-1", "mid-1")
            .await
            .expect("mark sent"));
        // SENT -> SENT is allowed: regeneration replaces the ids.
        assert!(mark_sent(&pool, &job.job_id, "tid-2", "mid-2")
            .await
            .expect("mark sent again"));

        let row = find_by_job_id(&pool, &job.job_id)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(row.status().expect("status"), JobStatus::Sent);
        assert_eq!(row.thread_id.as_deref(), Some("tid-2"));
        assert_eq!(row.message_id.as_deref(), Some("mid-2"));
    }

    #[tokio::test]
    async fn completion_requires_sent_and_is_idempotent() {
        let pool = test_pool().await;
        let job = record("t1");
        insert_job(&pool, &job).await.expect("insert");

        // Not dispatched yet: completion must not land.
        assert!(!mark_completed(&pool, &job.job_id, "[]").await.expect("mark"));

        mark_sent(&pool, &job.job_id, "tid", "mid").await.expect("sent");
        assert!(mark_completed(&pool, &job.job_id, r#"[{"caseNo":1}]"#)
            .await
            .expect("mark"));
        // Second finalize loses the condition and changes nothing.
        assert!(!mark_completed(&pool, &job.job_id, "[]").await.expect("mark"));

        let row = find_by_job_id(&pool, &job.job_id)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(row.status().expect("status"), JobStatus::Completed);
        assert_eq!(row.result.as_deref(), Some(r#"[{"caseNo":1}]"#));
    }

    #[tokio::test]
    async fn terminal_states_absorb_failures() {
        let pool = test_pool().await;
        let job = record("t1");
        insert_job(&pool, &job).await.expect("insert");
        mark_sent(&pool, &job.job_id, "tid", "mid").await.expect("sent");
        mark_completed(&pool, &job.job_id, "[]").await.expect("completed");

        assert!(!mark_failed(&pool, &job.job_id, "too late")
            .await
            .expect("mark failed"));
        let row = find_by_job_id(&pool, &job.job_id)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(row.status().expect("status"), JobStatus::Completed);
        assert!(row.error_message.is_none());
    }

    #[tokio::test]
    async fn bump_retry_is_optimistic() {
        let pool = test_pool().await;
        let job = record("t1");
        insert_job(&pool, &job).await.expect("insert");
        mark_sent(&pool, &job.job_id, "tid", "mid").await.expect("sent");

        assert!(bump_retry(&pool, &job.job_id, 0).await.expect("bump"));
        // A racing invocation with the stale expected count loses.
        assert!(!bump_retry(&pool, &job.job_id, 0).await.expect("bump"));
        assert!(bump_retry(&pool, &job.job_id, 1).await.expect("bump"));

        let row = find_by_job_id(&pool, &job.job_id)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(row.retry_count, 2);
    }
}
