//! Client for the external report-generation API.
//!
//! The API is an opaque HTTP service: authenticate with a per-tenant key to
//! get a short-lived token, submit a message for generation, then either poll
//! for the result or wait for the service to push a signed webhook. Every
//! submission is identified by a `(thread_id, message_id)` pair the service
//! assigns; regeneration produces a fresh pair and only the latest one is
//! ever trusted.
//!
//! Workers program against the [`GenerationApi`] trait so tests can swap in
//! [`StubGenerationApi`]; [`HttpGenerationApi`] is the production
//! implementation.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External identifiers for one submission. Replaced wholesale on
/// regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationIds {
    pub thread_id: String,
    pub message_id: String,
}

/// Three-way completion check result. "Not finished yet" is ordinary data
/// here, not an error: the caller decides whether to defer.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Generation finished; the raw generated text.
    Done(String),
    /// Still in progress; check again later.
    Pending,
    /// The service itself reported failure.
    Failed(String),
}

/// Errors from the generation API. Transport and status errors are transient
/// from the workflow's point of view and are retried via queue redelivery.
#[derive(Debug, Error)]
pub enum GenApiError {
    #[error("request to generation API failed: {0}")]
    Transport(String),
    #[error("generation API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected generation API payload: {0}")]
    Payload(String),
}

impl From<reqwest::Error> for GenApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
pub trait GenerationApi: Send + Sync {
    /// Exchange tenant credentials for a bearer token.
    async fn authenticate(&self, api_key: &str, login_id: &str) -> Result<String, GenApiError>;

    /// Submit a message for generation, returning the correlation ids.
    async fn submit(
        &self,
        token: &str,
        message: &str,
        model_id: &str,
        callback_url: Option<&str>,
    ) -> Result<CorrelationIds, GenApiError>;

    /// Check whether a submission finished.
    async fn poll(&self, token: &str, ids: &CorrelationIds) -> Result<PollOutcome, GenApiError>;
}

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Serialize)]
struct AuthRequest<'a> {
    api_key: &'a str,
    login_id: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    message: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    tid: String,
    mid: String,
}

#[derive(Deserialize)]
struct PollResponse {
    status: String,
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn outcome_from_response(resp: PollResponse) -> Result<PollOutcome, GenApiError> {
    match resp.status.as_str() {
        "completed" => {
            let reply = resp.reply.ok_or_else(|| {
                GenApiError::Payload("completed response without a reply".into())
            })?;
            Ok(PollOutcome::Done(reply))
        }
        "pending" | "in_progress" => Ok(PollOutcome::Pending),
        "failed" => Ok(PollOutcome::Failed(
            resp.error.unwrap_or_else(|| "generation failed".into()),
        )),
        other => Err(GenApiError::Payload(format!("unknown job status '{other}'"))),
    }
}

/// reqwest-backed [`GenerationApi`] implementation.
#[derive(Debug, Clone)]
pub struct HttpGenerationApi {
    http: reqwest::Client,
    auth_url: String,
    message_url: String,
}

impl HttpGenerationApi {
    pub fn new(auth_url: impl Into<String>, message_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: auth_url.into(),
            message_url: message_url.into(),
        }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GenApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GenApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait::async_trait]
impl GenerationApi for HttpGenerationApi {
    async fn authenticate(&self, api_key: &str, login_id: &str) -> Result<String, GenApiError> {
        let resp = self
            .http
            .post(&self.auth_url)
            .json(&AuthRequest { api_key, login_id })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let auth: AuthResponse = resp.json().await?;
        Ok(auth.token)
    }

    async fn submit(
        &self,
        token: &str,
        message: &str,
        model_id: &str,
        callback_url: Option<&str>,
    ) -> Result<CorrelationIds, GenApiError> {
        let resp = self
            .http
            .post(&self.message_url)
            .header(AUTH_TOKEN_HEADER, token)
            .json(&SubmitRequest {
                message,
                model_id,
                callback_url,
            })
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let submitted: SubmitResponse = resp.json().await?;
        tracing::debug!(thread_id = %submitted.tid, "generation request accepted");
        Ok(CorrelationIds {
            thread_id: submitted.tid,
            message_id: submitted.mid,
        })
    }

    async fn poll(&self, token: &str, ids: &CorrelationIds) -> Result<PollOutcome, GenApiError> {
        let resp = self
            .http
            .get(&self.message_url)
            .header(AUTH_TOKEN_HEADER, token)
            .query(&[("tid", ids.thread_id.as_str()), ("mid", ids.message_id.as_str())])
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let poll: PollResponse = resp.json().await?;
        outcome_from_response(poll)
    }
}

/// Scriptable in-memory [`GenerationApi`] for tests and local wiring.
///
/// `submit` hands out sequential correlation ids; `poll` pops from a queue of
/// scripted outcomes and answers [`PollOutcome::Pending`] once the script is
/// exhausted.
#[derive(Debug, Default)]
pub struct StubGenerationApi {
    submissions: Mutex<u64>,
    poll_script: Mutex<VecDeque<PollOutcome>>,
}

impl StubGenerationApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next outcome `poll` should answer with.
    pub fn script_poll(&self, outcome: PollOutcome) {
        let mut script = self.poll_script.lock().expect("poll script lock poisoned");
        script.push_back(outcome);
    }

    /// How many submissions were made (initial dispatch + regenerations).
    pub fn submission_count(&self) -> u64 {
        *self.submissions.lock().expect("submission counter lock poisoned")
    }
}

#[async_trait::async_trait]
impl GenerationApi for StubGenerationApi {
    async fn authenticate(&self, _api_key: &str, _login_id: &str) -> Result<String, GenApiError> {
        Ok("stub-token".into())
    }

    async fn submit(
        &self,
        _token: &str,
        _message: &str,
        _model_id: &str,
        _callback_url: Option<&str>,
    ) -> Result<CorrelationIds, GenApiError> {
        let mut count = self.submissions.lock().expect("submission counter lock poisoned");
        *count += 1;
        Ok(CorrelationIds {
            thread_id: format!("tid-{count}"),
            message_id: format!("mid-{count}"),
        })
    }

    async fn poll(&self, _token: &str, _ids: &CorrelationIds) -> Result<PollOutcome, GenApiError> {
        let mut script = self.poll_script.lock().expect("poll script lock poisoned");
        Ok(script.pop_front().unwrap_or(PollOutcome::Pending))
    }
}
