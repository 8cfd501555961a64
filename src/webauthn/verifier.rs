//! # Verification Primitive
//!
//! The orchestrator never parses authenticator data or checks signatures
//! itself. It asks a `CeremonyVerifier` to build the client-facing options
//! and to verify the returned proofs, and trusts the answer.
//!
//! Two implementations ship with the crate:
//! - [`PasskeyVerifier`](super::passkey::PasskeyVerifier): webauthn-rs, used in production
//! - [`ScriptedVerifier`](super::scripted::ScriptedVerifier): queued outcomes, for tests

use crate::db::models::{Challenge, Credential, Identity, NewCredential};
use crate::relying_party::RelyingParty;
use crate::webauthn::types::{AuthenticationProof, RegistrationProof};
use serde::Serialize;

/// Faults of the primitive itself (bad configuration, unreadable state).
/// A proof that simply does not verify is *not* an error; see the
/// `*Verification` enums.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("relying party configuration rejected: {0}")]
    Config(String),

    #[error("ceremony state missing or unreadable: {0}")]
    State(String),

    #[error("stored credential unreadable: {0}")]
    Credential(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attestation {
    None,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidentKey {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Attachment {
    Platform,
    CrossPlatform,
}

/// What a registration asks of the authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationPolicy {
    pub user_verification: UserVerification,
    pub attestation: Attestation,
    pub resident_key: ResidentKey,
    pub attachment: Option<Attachment>,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            user_verification: UserVerification::Required,
            attestation: Attestation::None,
            resident_key: ResidentKey::Preferred,
            attachment: Some(Attachment::Platform),
        }
    }
}

/// What an authentication asks of the authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationPolicy {
    pub user_verification: UserVerification,
}

impl Default for AuthenticationPolicy {
    fn default() -> Self {
        Self {
            user_verification: UserVerification::Required,
        }
    }
}

/// Client-facing options plus any state the verifier must see again at
/// verification time. The orchestrator stores `binding` with the challenge.
#[derive(Debug, Clone)]
pub struct CeremonyOptions {
    pub public_key: serde_json::Value,
    pub binding: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationVerification {
    Verified(NewCredential),
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationVerification {
    Verified { new_counter: u32 },
    Rejected(String),
    /// The signature checked out but the primitive refused the counter
    /// without reporting it.
    CounterRegressed,
}

pub trait CeremonyVerifier: Send + Sync {
    fn registration_options(
        &self,
        rp: &RelyingParty,
        identity: &Identity,
        challenge: &Challenge,
        exclude: &[Credential],
        policy: &RegistrationPolicy,
    ) -> Result<CeremonyOptions, VerifierError>;

    fn verify_registration(
        &self,
        rp: &RelyingParty,
        proof: &RegistrationProof,
        expected: &Challenge,
    ) -> Result<RegistrationVerification, VerifierError>;

    fn authentication_options(
        &self,
        rp: &RelyingParty,
        challenge: &Challenge,
        allow: &[Credential],
        policy: &AuthenticationPolicy,
    ) -> Result<CeremonyOptions, VerifierError>;

    fn verify_authentication(
        &self,
        rp: &RelyingParty,
        proof: &AuthenticationProof,
        expected: &Challenge,
        credential: &Credential,
    ) -> Result<AuthenticationVerification, VerifierError>;
}
