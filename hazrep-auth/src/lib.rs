//! Request identity facade and webhook signature verification.
//!
//! Identity issuance lives in an upstream collaborator (the BFF); by the time
//! a request reaches this service the tenant and user have already been
//! derived and are carried in trusted headers. This crate never re-derives
//! identity — it only extracts and validates what the collaborator supplied.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header carrying the tenant id, injected by the BFF.
pub const TENANT_HEADER: &str = "x-hazrep-tenant";
/// Header carrying the user id, injected by the BFF.
pub const USER_HEADER: &str = "x-hazrep-user";

/// Fallback user id when the collaborator did not forward one.
const UNKNOWN_USER: &str = "unknown";

// ============================================================================
// Request Identity
// ============================================================================

/// The authenticated subject of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub tenant_id: String,
    pub user_id: String,
}

impl RequestIdentity {
    #[inline]
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Identity errors that can surface during request processing.
#[derive(Debug, Error, Clone)]
pub enum IdentityError {
    #[error("missing tenant identity")]
    MissingTenant,
    #[error("identity subsystem is unavailable: {0}")]
    Subsystem(String),
}

/// Trait for identity sources. Implement this for production and test
/// providers.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolve the request identity from the raw header values.
    async fn identify(
        &self,
        tenant_header: Option<&str>,
        user_header: Option<&str>,
    ) -> Result<RequestIdentity, IdentityError>;
}

/// Production provider: trusts the BFF-injected header values.
///
/// A request without a tenant cannot be attributed (or billed) and is
/// rejected; a missing user degrades to "unknown" since the history view is
/// the only consumer of it.
#[derive(Debug, Default, Clone)]
pub struct TrustedHeaderIdentity;

#[async_trait::async_trait]
impl IdentityProvider for TrustedHeaderIdentity {
    async fn identify(
        &self,
        tenant_header: Option<&str>,
        user_header: Option<&str>,
    ) -> Result<RequestIdentity, IdentityError> {
        let tenant_id = tenant_header
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                tracing::debug!("request carries no tenant header");
                IdentityError::MissingTenant
            })?;
        let user_id = user_header
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(UNKNOWN_USER);
        Ok(RequestIdentity::new(tenant_id, user_id))
    }
}

/// Test-only provider returning a fixed identity regardless of headers.
#[derive(Debug, Clone)]
pub struct TestIdentityProvider {
    identity: RequestIdentity,
}

impl TestIdentityProvider {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            identity: RequestIdentity::new(tenant_id, user_id),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for TestIdentityProvider {
    async fn identify(
        &self,
        _tenant_header: Option<&str>,
        _user_header: Option<&str>,
    ) -> Result<RequestIdentity, IdentityError> {
        Ok(self.identity.clone())
    }
}

// ============================================================================
// Webhook signatures
// ============================================================================

pub mod webhook {
    //! HMAC-SHA256 signatures over raw webhook bodies.
    //!
    //! The generation API signs the exact bytes it sends; any re-serialization
    //! before verification would break the signature, so callers must pass the
    //! body untouched.

    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use thiserror::Error;

    type HmacSha256 = Hmac<Sha256>;

    /// Header carrying the hex-encoded signature.
    pub const SIGNATURE_HEADER: &str = "x-hazrep-signature";

    #[derive(Debug, Error, Clone, PartialEq, Eq)]
    pub enum SignatureError {
        #[error("signature is not valid hex")]
        Encoding,
        #[error("signature mismatch")]
        Mismatch,
    }

    /// Compute the hex-encoded signature for a body. Used by tests and by
    /// collaborators that need to produce signed callbacks.
    pub fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a hex-encoded signature against the raw body.
    ///
    /// The comparison is constant-time (`Mac::verify_slice`).
    pub fn verify_signature(
        secret: &str,
        body: &[u8],
        signature_hex: &str,
    ) -> Result<(), SignatureError> {
        let claimed = hex::decode(signature_hex.trim()).map_err(|_| SignatureError::Encoding)?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(body);
        mac.verify_slice(&claimed).map_err(|_| SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::webhook::{sign, verify_signature, SignatureError};
    use super::*;

    #[tokio::test]
    async fn header_identity_requires_tenant() {
        let provider = TrustedHeaderIdentity;
        let err = provider.identify(None, Some("u1")).await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingTenant));

        let err = provider.identify(Some("   "), Some("u1")).await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingTenant));
    }

    #[tokio::test]
    async fn header_identity_defaults_missing_user() {
        let provider = TrustedHeaderIdentity;
        let identity = provider.identify(Some("t1"), None).await.expect("identity");
        assert_eq!(identity.tenant_id, "t1");
        assert_eq!(identity.user_id, "unknown");
    }

    #[tokio::test]
    async fn header_identity_trims_values() {
        let provider = TrustedHeaderIdentity;
        let identity = provider
            .identify(Some(" t1 "), Some(" u1 "))
            .await
            .expect("identity");
        assert_eq!(identity, RequestIdentity::new("t1", "u1"));
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"status":"completed","reply":"[]"}"#;
        let signature = sign("secret-1", body);
        assert!(verify_signature("secret-1", body, &signature).is_ok());
    }

    #[test]
    fn mutated_body_is_rejected() {
        let body = br#"{"status":"completed","reply":"[]"}"#;
        let signature = sign("secret-1", body);
        let tampered = br#"{"status":"completed","reply":"[1]"}"#;
        assert_eq!(
            verify_signature("secret-1", tampered, &signature),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"payload";
        let signature = sign("secret-1", body);
        assert_eq!(
            verify_signature("secret-2", body, &signature),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        assert_eq!(
            verify_signature("secret", b"payload", "not-hex!"),
            Err(SignatureError::Encoding)
        );
    }
}
