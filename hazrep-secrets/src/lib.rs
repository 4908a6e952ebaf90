//! Tenant credential resolution.
//!
//! The workflow never talks to the secret backend directly: everything goes
//! through [`CredentialResolver`], which fetches one secret document and
//! selects the bundle for a tenant. The document may be either a single
//! credential bundle (legacy single-tenant deployments) or a list of bundles
//! keyed by `tenant_id`; both shapes are handled here and never leak past
//! this crate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Per-tenant secret bundle. Read-only from the workflow's perspective.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantCredentials {
    pub api_key: String,
    pub login_id: String,
    pub model_id: String,
    pub webhook_secret: String,
}

/// Errors surfaced by secret lookup and credential resolution.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secret {0} not found")]
    SecretNotFound(String),
    #[error("tenant config not found for id: {0}")]
    TenantConfigNotFound(String),
    #[error("malformed secret payload: {0}")]
    Malformed(String),
    #[error("secret store is unavailable: {0}")]
    Unavailable(String),
}

impl SecretsError {
    /// A missing tenant is a configuration error, not a transient fault:
    /// callers must not retry it.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TenantConfigNotFound(_) | Self::Malformed(_) | Self::SecretNotFound(_)
        )
    }
}

/// Trait for secret backends. The workflow only ever reads.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync + 'static {
    async fn fetch(&self, secret_ref: &str) -> Result<Value, SecretsError>;
}

/// In-memory secret store, seedable from a JSON file at startup or from
/// literal values in tests.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, Value>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a secret document from a JSON file and register it under
    /// `secret_ref`.
    pub fn from_file<P: AsRef<Path>>(secret_ref: &str, path: P) -> Result<Self, SecretsError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SecretsError::Unavailable(e.to_string()))?;
        let value: Value = serde_json::from_str(&contents)
            .map_err(|e| SecretsError::Malformed(e.to_string()))?;
        let store = Self::new();
        store.insert(secret_ref, value);
        Ok(store)
    }

    pub fn insert(&self, secret_ref: &str, value: Value) {
        let mut secrets = self.secrets.write().expect("secret store lock poisoned");
        secrets.insert(secret_ref.to_owned(), value);
    }
}

#[async_trait::async_trait]
impl SecretStore for MemorySecretStore {
    async fn fetch(&self, secret_ref: &str) -> Result<Value, SecretsError> {
        let secrets = self.secrets.read().expect("secret store lock poisoned");
        secrets
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| SecretsError::SecretNotFound(secret_ref.to_owned()))
    }
}

/// The two shapes the secret document is allowed to take. Resolved here and
/// nowhere else.
#[derive(Deserialize)]
#[serde(untagged)]
enum SecretShape {
    /// Multi-tenant: a list of bundles keyed by tenant id.
    Bundles(Vec<BundleEntry>),
    /// Legacy single-tenant: the bundle wrapped in a `secret_data` envelope.
    Wrapped { secret_data: TenantCredentials },
    /// Legacy single-tenant: the bundle stored bare.
    Bare(TenantCredentials),
}

#[derive(Deserialize)]
struct BundleEntry {
    tenant_id: String,
    secret_data: TenantCredentials,
}

/// Resolves per-tenant credentials from one secret reference.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
    secret_ref: String,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn SecretStore>, secret_ref: impl Into<String>) -> Self {
        Self {
            store,
            secret_ref: secret_ref.into(),
        }
    }

    /// Resolve the credential bundle for `tenant_id`.
    ///
    /// Fails with [`SecretsError::TenantConfigNotFound`] when the document is
    /// a bundle list and no entry matches. In the single-bundle shapes the
    /// bundle applies to whichever tenant the deployment serves.
    pub async fn resolve(&self, tenant_id: &str) -> Result<TenantCredentials, SecretsError> {
        let document = self.store.fetch(&self.secret_ref).await?;
        let shape: SecretShape = serde_json::from_value(document)
            .map_err(|e| SecretsError::Malformed(e.to_string()))?;

        match shape {
            SecretShape::Bundles(entries) => entries
                .into_iter()
                .find(|entry| entry.tenant_id == tenant_id)
                .map(|entry| entry.secret_data)
                .ok_or_else(|| {
                    tracing::warn!(%tenant_id, "no credential bundle for tenant");
                    SecretsError::TenantConfigNotFound(tenant_id.to_owned())
                }),
            SecretShape::Wrapped { secret_data } => Ok(secret_data),
            SecretShape::Bare(credentials) => Ok(credentials),
        }
    }
}
