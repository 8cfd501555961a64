//! # Passkey Authentication
//!
//! Step 1 issues an `Authentication` challenge listing the identity's
//! credentials; step 2 consumes it, verifies the assertion and applies clone
//! detection to the signature counter.

use crate::db::models::Purpose;
use crate::relying_party::RelyingParty;
use crate::webauthn::clone_detection::{self, CounterAssessment};
use crate::webauthn::types::{
    AuthenticationParameters, AuthenticationProof, AuthenticationSummary, CredentialDescriptor,
};
use crate::webauthn::verifier::{AuthenticationPolicy, AuthenticationVerification};
use crate::webauthn::{CeremonyError, CeremonyOrchestrator, CeremonyResult};

impl CeremonyOrchestrator {
    /// Start a login for `handle`.
    ///
    /// ## Errors
    /// - `IdentityNotFound`: no identity has this handle
    /// - `NoCredentials`: the identity has nothing to authenticate with
    pub async fn begin_authentication(
        &self,
        rp: &RelyingParty,
        handle: &str,
    ) -> CeremonyResult<AuthenticationParameters> {
        let identity = self
            .stores
            .identities
            .find_by_handle(handle)
            .await?
            .ok_or(CeremonyError::IdentityNotFound)?;

        let credentials = self.stores.credentials.list_for_identity(&identity.id).await?;
        if credentials.is_empty() {
            return Err(CeremonyError::NoCredentials);
        }

        let challenge = self.issue_challenge(&identity.id, Purpose::Authentication).await?;

        let policy = AuthenticationPolicy::default();
        let options = self
            .verifier
            .authentication_options(rp, &challenge, &credentials, &policy)?;
        let options = self.attach_binding(&challenge, options).await?;

        tracing::debug!(
            identity_id = %identity.id,
            allowed = credentials.len(),
            "Issued authentication options"
        );

        Ok(AuthenticationParameters {
            identity: identity.summary(),
            challenge: challenge.encoded_value(),
            allow_credentials: credentials.iter().map(CredentialDescriptor::from).collect(),
            user_verification: policy.user_verification,
            options,
        })
    }

    /// Finish a login for `handle` with the authenticator's assertion.
    ///
    /// On success the stored counter is advanced (unless the authenticator
    /// does not count). A counter that stands still or goes back is reported
    /// as `PossibleCloneDetected` and the stored counter is left untouched;
    /// what to do about the credential is up to the caller.
    ///
    /// ## Errors
    /// - `IdentityNotFound`, `ChallengeNotFound`, `CredentialNotFound`
    /// - `VerificationFailed`: the assertion did not verify
    /// - `PossibleCloneDetected`: valid assertion, non-increasing counter
    pub async fn complete_authentication(
        &self,
        rp: &RelyingParty,
        handle: &str,
        proof: &AuthenticationProof,
    ) -> CeremonyResult<AuthenticationSummary> {
        let identity = self
            .stores
            .identities
            .find_by_handle(handle)
            .await?
            .ok_or(CeremonyError::IdentityNotFound)?;

        let challenge = self
            .take_challenge(&identity.id, Purpose::Authentication, &proof.challenge)
            .await?;

        let credential = self
            .stores
            .credentials
            .find_by_credential_id(&proof.credential_id)
            .await?
            .filter(|credential| credential.identity_id == identity.id)
            .ok_or(CeremonyError::CredentialNotFound)?;

        let reported = match self
            .verifier
            .verify_authentication(rp, proof, &challenge, &credential)?
        {
            AuthenticationVerification::Verified { new_counter } => new_counter,
            AuthenticationVerification::Rejected(reason) => {
                tracing::info!(
                    identity_id = %identity.id,
                    credential_id = %credential.credential_id,
                    %reason,
                    "Authentication verification failed"
                );
                return Err(CeremonyError::VerificationFailed(reason));
            }
            AuthenticationVerification::CounterRegressed => {
                let stored = credential.counter;
                return Err(self.clone_detected(&credential.credential_id, stored, None));
            }
        };

        let counter = match clone_detection::assess(credential.counter, reported) {
            CounterAssessment::Unsupported => credential.counter,
            CounterAssessment::Advanced(counter) => {
                self.stores
                    .credentials
                    .update_counter(&credential.credential_id, counter)
                    .await?;
                counter
            }
            CounterAssessment::Regressed => {
                let stored = credential.counter;
                return Err(self.clone_detected(&credential.credential_id, stored, Some(reported)));
            }
        };

        tracing::info!(
            identity_id = %identity.id,
            credential_id = %credential.credential_id,
            counter,
            "Authenticated"
        );

        Ok(AuthenticationSummary {
            identity: identity.summary(),
            credential_id: credential.credential_id,
            counter,
        })
    }

    fn clone_detected(
        &self,
        credential_id: &str,
        stored: u32,
        reported: Option<u32>,
    ) -> CeremonyError {
        tracing::warn!(
            credential_id,
            stored_counter = stored,
            reported_counter = ?reported,
            "Signature counter did not advance: possible cloned authenticator"
        );

        CeremonyError::PossibleCloneDetected {
            credential_id: credential_id.to_string(),
            stored_counter: stored,
            reported_counter: reported,
        }
    }
}
