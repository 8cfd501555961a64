//! # WebAuthn Ceremonies
//!
//! The `CeremonyOrchestrator` drives both passkey ceremonies against the
//! three stores and an injected verification primitive.
//!
//! ## Registration
//! 1. `begin_registration(handle)`: resolve or create the identity, list its
//!    credentials as the exclude set, issue a `Registration` challenge
//! 2. `complete_registration(identity_id, proof)`: consume the challenge,
//!    verify, persist the new credential
//!
//! ## Authentication
//! 1. `begin_authentication(handle)`: find the identity, list its credentials
//!    as the allow set, issue an `Authentication` challenge
//! 2. `complete_authentication(handle, proof)`: consume the challenge, verify
//!    the assertion, run clone detection on the counter
//!
//! A ceremony sits in "options issued" while its challenge is outstanding and
//! ends the moment the challenge is consumed, whatever the verdict. The
//! orchestrator keeps no state of its own between the two steps; any
//! instance sharing the stores can serve either one.

pub mod authentication;
pub mod clone_detection;
pub mod error;
pub mod passkey;
pub mod registration;
pub mod scripted;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use error::{CeremonyError, CeremonyResult};
pub use passkey::PasskeyVerifier;
pub use scripted::ScriptedVerifier;
pub use verifier::CeremonyVerifier;

use crate::db::models::{Challenge, Purpose};
use crate::db::Stores;
use chrono::{Duration, Utc};
use std::sync::Arc;
use verifier::CeremonyOptions;

/// Default staleness window for outstanding challenges.
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 300;

pub struct CeremonyOrchestrator {
    stores: Stores,
    verifier: Arc<dyn CeremonyVerifier>,
    challenge_ttl: Duration,
}

impl CeremonyOrchestrator {
    pub fn new(
        stores: Stores,
        verifier: Arc<dyn CeremonyVerifier>,
        challenge_ttl: Duration,
    ) -> Self {
        Self {
            stores,
            verifier,
            challenge_ttl,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn challenge_ttl(&self) -> Duration {
        self.challenge_ttl
    }

    /// Issues a challenge for `identity_id`, logging any challenge it supersedes.
    async fn issue_challenge(
        &self,
        identity_id: &str,
        purpose: Purpose,
    ) -> CeremonyResult<Challenge> {
        let issued = self.stores.challenges.issue(identity_id, purpose).await?;

        if let Some(previous) = issued.superseded {
            tracing::debug!(
                identity_id,
                previous_purpose = %previous.purpose,
                "Superseded outstanding challenge"
            );
        }

        Ok(issued.challenge)
    }

    /// Stores the verifier's binding state next to `challenge` and returns
    /// the client-facing options.
    ///
    /// If a racing `begin` already replaced the challenge, nothing is stored
    /// and the options are returned anyway; completing them will fail with
    /// `ChallengeNotFound`.
    async fn attach_binding(
        &self,
        challenge: &Challenge,
        options: CeremonyOptions,
    ) -> CeremonyResult<serde_json::Value> {
        if let Some(binding) = options.binding {
            let attached = self
                .stores
                .challenges
                .bind(&challenge.identity_id, &challenge.value, binding)
                .await?;

            if !attached {
                tracing::debug!(
                    identity_id = %challenge.identity_id,
                    "Challenge superseded before its verifier state was stored"
                );
            }
        }

        Ok(options.public_key)
    }

    /// Consumes the identity's challenge for `purpose`, provided `presented`
    /// (the base64url value the client answered) is the outstanding one.
    ///
    /// A superseded or unknown value fails with `ChallengeNotFound` and leaves
    /// the outstanding challenge in place. Once matched, the record is gone
    /// whatever happens next; a challenge older than the staleness window is
    /// consumed and then refused.
    async fn take_challenge(
        &self,
        identity_id: &str,
        purpose: Purpose,
        presented: &str,
    ) -> CeremonyResult<Challenge> {
        let value = Challenge::decode_value(presented).ok_or(CeremonyError::ChallengeNotFound)?;

        let challenge = self
            .stores
            .challenges
            .consume(identity_id, purpose, &value)
            .await?
            .ok_or_else(|| {
                tracing::debug!(identity_id, %purpose, "No outstanding challenge matches");
                CeremonyError::ChallengeNotFound
            })?;

        if challenge.is_stale(self.challenge_ttl, Utc::now()) {
            tracing::info!(
                identity_id,
                %purpose,
                issued_at = %challenge.issued_at,
                "Refused stale challenge"
            );
            return Err(CeremonyError::ChallengeNotFound);
        }

        Ok(challenge)
    }
}

impl std::fmt::Debug for CeremonyOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyOrchestrator")
            .field("stores", &self.stores)
            .field("challenge_ttl", &self.challenge_ttl)
            .finish()
    }
}
