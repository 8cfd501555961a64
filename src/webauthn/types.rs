//! # Ceremony API Types
//!
//! Request bodies for the four ceremony endpoints, the proofs extracted from
//! them, and the parameters each "begin" step returns.
//!
//! Each proof type carries only what its ceremony needs: a registration proof
//! is the attestation credential, an authentication proof is the assertion
//! plus the credential id it claims. Both carry the challenge the client was
//! answering, exactly as the options step returned it.

use crate::db::models::{Credential, IdentitySummary};
use crate::webauthn::verifier::{RegistrationPolicy, UserVerification};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /api/webauthn/generate-registration-options`
///
/// ```json
/// { "handle": "alice" }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationStartRequest {
    pub handle: String,
}

/// `POST /api/webauthn/verify-registration`
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationFinishRequest {
    /// Identity id returned by the options step.
    pub identity_id: String,
    /// `challenge` returned by the options step, echoed back unchanged.
    pub challenge: String,
    /// Output of `navigator.credentials.create()`, JSON-encoded by the client.
    pub credential: Value,
}

/// `POST /api/webauthn/generate-authentication-options`
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticationStartRequest {
    pub handle: String,
}

/// `POST /api/webauthn/verify-authentication`
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticationFinishRequest {
    pub handle: String,
    pub challenge: String,
    /// Output of `navigator.credentials.get()`, JSON-encoded by the client.
    pub credential: Value,
}

/// Attestation returned by the authenticator at registration.
#[derive(Debug, Clone)]
pub struct RegistrationProof {
    /// base64url challenge this attestation answers.
    pub challenge: String,
    pub response: Value,
}

impl RegistrationProof {
    pub fn new(challenge: impl Into<String>, response: Value) -> Self {
        Self {
            challenge: challenge.into(),
            response,
        }
    }

    /// Advisory transport hints at `response.transports`; non-strings are skipped.
    pub fn transports(&self) -> Vec<String> {
        self.response
            .pointer("/response/transports")
            .and_then(Value::as_array)
            .map(|hints| {
                hints
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Assertion returned by the authenticator at login.
#[derive(Debug, Clone)]
pub struct AuthenticationProof {
    /// base64url challenge this assertion answers.
    pub challenge: String,
    /// base64url credential id the assertion claims to come from (`id`).
    pub credential_id: String,
    pub response: Value,
}

impl AuthenticationProof {
    /// `None` when the assertion carries no string `id`.
    pub fn from_assertion(challenge: impl Into<String>, response: Value) -> Option<Self> {
        let credential_id = response.get("id")?.as_str()?.to_string();
        Some(Self {
            challenge: challenge.into(),
            credential_id,
            response,
        })
    }
}

/// Id and transport hints of a credential, as listed in exclude/allow sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    pub id: String,
    pub transports: Vec<String>,
}

impl From<&Credential> for CredentialDescriptor {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.credential_id.clone(),
            transports: credential.transports.clone(),
        }
    }
}

/// Returned by the registration options step.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationParameters {
    pub identity: IdentitySummary,
    /// base64url challenge value.
    pub challenge: String,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub policy: RegistrationPolicy,
    /// Options for `navigator.credentials.create()`.
    pub options: Value,
}

/// Returned by the authentication options step.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationParameters {
    pub identity: IdentitySummary,
    pub challenge: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerification,
    /// Options for `navigator.credentials.get()`.
    pub options: Value,
}

/// Returned by a verified authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationSummary {
    pub identity: IdentitySummary,
    pub credential_id: String,
    pub counter: u32,
}
