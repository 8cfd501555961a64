//! Shared fixtures for orchestrator tests.

use crate::db::Stores;
use crate::relying_party::RelyingParty;
use crate::webauthn::types::{AuthenticationProof, RegistrationProof};
use crate::webauthn::{CeremonyOrchestrator, ScriptedVerifier, DEFAULT_CHALLENGE_TTL_SECS};
use chrono::Duration;
use serde_json::json;
use std::sync::Arc;

pub fn rp() -> RelyingParty {
    RelyingParty {
        id: "localhost".to_string(),
        origin: "http://localhost:4000".to_string(),
    }
}

/// In-memory orchestrator wired to a scripted verifier.
pub fn harness() -> (CeremonyOrchestrator, Arc<ScriptedVerifier>) {
    harness_with_ttl(Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS))
}

pub fn harness_with_ttl(ttl: Duration) -> (CeremonyOrchestrator, Arc<ScriptedVerifier>) {
    let verifier = Arc::new(ScriptedVerifier::new());
    let orchestrator = CeremonyOrchestrator::new(Stores::memory(), verifier.clone(), ttl);
    (orchestrator, verifier)
}

/// Attestation "signed" over `challenge`.
pub fn registration_proof(challenge: &str) -> RegistrationProof {
    RegistrationProof::new(
        challenge,
        json!({
            "id": "ignored-by-scripted-verifier",
            "challenge": challenge,
            "response": { "transports": ["internal"] },
        }),
    )
}

/// Assertion from `credential_id` "signed" over `challenge`.
pub fn assertion_proof(challenge: &str, credential_id: &str) -> AuthenticationProof {
    AuthenticationProof::from_assertion(
        challenge,
        json!({
            "id": credential_id,
            "challenge": challenge,
            "response": {},
        }),
    )
    .expect("assertion has an id")
}
