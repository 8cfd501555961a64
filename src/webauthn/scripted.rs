//! Scripted verification primitive.
//!
//! Returns queued verdicts in order instead of doing any cryptography, so
//! orchestrator behavior can be tested deterministically.
//! WARNING: accepts any proof it has a verdict queued for. Never use in production.
//!
//! The one check it does perform: if the proof JSON carries a top-level
//! `challenge` string, it must equal the expected challenge's base64url
//! value, otherwise the proof is rejected. This mimics a real authenticator
//! having signed over a specific challenge.

use crate::db::models::{Challenge, Credential, Identity};
use crate::relying_party::RelyingParty;
use crate::webauthn::types::{AuthenticationProof, CredentialDescriptor, RegistrationProof};
use crate::webauthn::verifier::{
    AuthenticationPolicy, AuthenticationVerification, CeremonyOptions, CeremonyVerifier,
    RegistrationPolicy, RegistrationVerification, VerifierError,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ScriptedVerifier {
    registrations: Mutex<VecDeque<RegistrationVerification>>,
    authentications: Mutex<VecDeque<AuthenticationVerification>>,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the verdict for the next `verify_registration`.
    pub fn push_registration(&self, verdict: RegistrationVerification) {
        lock(&self.registrations).push_back(verdict);
    }

    /// Queue the verdict for the next `verify_authentication`.
    pub fn push_authentication(&self, verdict: AuthenticationVerification) {
        lock(&self.authentications).push_back(verdict);
    }
}

fn lock<T>(queue: &Mutex<VecDeque<T>>) -> std::sync::MutexGuard<'_, VecDeque<T>> {
    // A panicking test thread must not wedge the others.
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `Some(reason)` if `response` names a different challenge than `expected`.
fn challenge_mismatch(response: &Value, expected: &Challenge) -> Option<String> {
    let claimed = response.get("challenge")?.as_str()?;
    (claimed != expected.encoded_value()).then(|| "challenge mismatch".to_string())
}

fn descriptors(credentials: &[Credential]) -> Vec<CredentialDescriptor> {
    credentials.iter().map(CredentialDescriptor::from).collect()
}

impl CeremonyVerifier for ScriptedVerifier {
    fn registration_options(
        &self,
        rp: &RelyingParty,
        identity: &Identity,
        challenge: &Challenge,
        exclude: &[Credential],
        policy: &RegistrationPolicy,
    ) -> Result<CeremonyOptions, VerifierError> {
        Ok(CeremonyOptions {
            public_key: json!({
                "rp": { "id": rp.id },
                "user": { "id": identity.id, "name": identity.handle },
                "challenge": challenge.encoded_value(),
                "excludeCredentials": descriptors(exclude),
                "policy": policy,
            }),
            binding: None,
        })
    }

    fn verify_registration(
        &self,
        _rp: &RelyingParty,
        proof: &RegistrationProof,
        expected: &Challenge,
    ) -> Result<RegistrationVerification, VerifierError> {
        let verdict = lock(&self.registrations).pop_front();

        if let Some(reason) = challenge_mismatch(&proof.response, expected) {
            return Ok(RegistrationVerification::Rejected(reason));
        }
        Ok(verdict
            .unwrap_or_else(|| RegistrationVerification::Rejected("no scripted verdict".into())))
    }

    fn authentication_options(
        &self,
        rp: &RelyingParty,
        challenge: &Challenge,
        allow: &[Credential],
        policy: &AuthenticationPolicy,
    ) -> Result<CeremonyOptions, VerifierError> {
        Ok(CeremonyOptions {
            public_key: json!({
                "rpId": rp.id,
                "challenge": challenge.encoded_value(),
                "allowCredentials": descriptors(allow),
                "userVerification": policy.user_verification,
            }),
            binding: None,
        })
    }

    fn verify_authentication(
        &self,
        _rp: &RelyingParty,
        proof: &AuthenticationProof,
        expected: &Challenge,
        _credential: &Credential,
    ) -> Result<AuthenticationVerification, VerifierError> {
        let verdict = lock(&self.authentications).pop_front();

        if let Some(reason) = challenge_mismatch(&proof.response, expected) {
            return Ok(AuthenticationVerification::Rejected(reason));
        }
        Ok(verdict
            .unwrap_or_else(|| AuthenticationVerification::Rejected("no scripted verdict".into())))
    }
}
