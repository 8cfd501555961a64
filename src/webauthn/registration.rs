//! # Passkey Registration
//!
//! Step 1 issues a `Registration` challenge for a (possibly new) identity;
//! step 2 consumes it and stores the verified credential.

use crate::db::models::{Handle, IdentitySummary, Purpose};
use crate::relying_party::RelyingParty;
use crate::webauthn::types::{CredentialDescriptor, RegistrationParameters, RegistrationProof};
use crate::webauthn::verifier::{RegistrationPolicy, RegistrationVerification};
use crate::webauthn::{CeremonyError, CeremonyOrchestrator, CeremonyResult};

impl CeremonyOrchestrator {
    /// Start registering a passkey for `handle`.
    ///
    /// Creates the identity on first use. Credentials the identity already
    /// owns are returned as the exclude set so the same authenticator is not
    /// registered twice.
    ///
    /// ## Errors
    /// - `InvalidHandle`: handle is not 2..=32 characters
    pub async fn begin_registration(
        &self,
        rp: &RelyingParty,
        handle: &str,
    ) -> CeremonyResult<RegistrationParameters> {
        let handle = Handle::parse(handle)?;
        let identity = self.stores.identities.resolve_or_create(&handle).await?;

        let existing = self.stores.credentials.list_for_identity(&identity.id).await?;
        let challenge = self.issue_challenge(&identity.id, Purpose::Registration).await?;

        let policy = RegistrationPolicy::default();
        let options = self
            .verifier
            .registration_options(rp, &identity, &challenge, &existing, &policy)?;
        let options = self.attach_binding(&challenge, options).await?;

        tracing::debug!(
            identity_id = %identity.id,
            excluded = existing.len(),
            "Issued registration options"
        );

        Ok(RegistrationParameters {
            identity: identity.summary(),
            challenge: challenge.encoded_value(),
            exclude_credentials: existing.iter().map(CredentialDescriptor::from).collect(),
            policy,
            options,
        })
    }

    /// Finish registration for `identity_id` with the authenticator's attestation.
    ///
    /// The outstanding challenge is consumed before anything else, so a
    /// failed attempt can never be retried against the same challenge.
    ///
    /// ## Errors
    /// - `ChallengeNotFound`: no (fresh) registration challenge outstanding
    /// - `IdentityNotFound`: the identity was removed meanwhile
    /// - `VerificationFailed`: the verifier rejected the attestation
    /// - `DuplicateCredential`: the credential id is already registered
    pub async fn complete_registration(
        &self,
        rp: &RelyingParty,
        identity_id: &str,
        proof: &RegistrationProof,
    ) -> CeremonyResult<IdentitySummary> {
        let challenge = self
            .take_challenge(identity_id, Purpose::Registration, &proof.challenge)
            .await?;

        let identity = self
            .stores
            .identities
            .find_by_id(identity_id)
            .await?
            .ok_or(CeremonyError::IdentityNotFound)?;

        let credential = match self.verifier.verify_registration(rp, proof, &challenge)? {
            RegistrationVerification::Verified(credential) => credential,
            RegistrationVerification::Rejected(reason) => {
                tracing::info!(identity_id, %reason, "Registration verification failed");
                return Err(CeremonyError::VerificationFailed(reason));
            }
        };

        let credential_id = credential.credential_id.clone();
        match self.stores.credentials.create(&identity.id, credential).await {
            Ok(stored) => {
                tracing::info!(
                    identity_id,
                    credential_id = %stored.credential_id,
                    counter = stored.counter,
                    "Registered credential"
                );
                Ok(identity.summary())
            }
            Err(e) => {
                let e = CeremonyError::from(e);
                if matches!(e, CeremonyError::DuplicateCredential(_)) {
                    tracing::warn!(
                        identity_id,
                        %credential_id,
                        "Refused credential already registered: possible replay or sharing"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::models::NewCredential;
    use crate::webauthn::test_support::{harness, registration_proof, rp};
    use crate::webauthn::types::RegistrationProof;
    use crate::webauthn::verifier::RegistrationVerification;
    use crate::webauthn::CeremonyError;

    fn verified(credential_id: &str) -> RegistrationVerification {
        RegistrationVerification::Verified(NewCredential {
            credential_id: credential_id.to_string(),
            public_key: b"public-key".to_vec(),
            counter: 0,
            transports: vec!["internal".to_string()],
        })
    }

    #[tokio::test]
    async fn test_register_new_identity() {
        let (orchestrator, verifier) = harness();

        let params = orchestrator.begin_registration(&rp(), "alice").await.unwrap();
        assert_eq!(params.identity.handle, "alice");
        assert!(params.exclude_credentials.is_empty());
        assert!(!params.challenge.is_empty());

        verifier.push_registration(verified("cred-1"));
        let identity = orchestrator
            .complete_registration(
                &rp(),
                &params.identity.id,
                &registration_proof(&params.challenge),
            )
            .await
            .unwrap();
        assert_eq!(identity, params.identity);

        let stored = orchestrator
            .stores()
            .credentials
            .find_by_credential_id("cred-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.identity_id, params.identity.id);
        assert_eq!(stored.counter, 0);
    }

    #[tokio::test]
    async fn test_invalid_handle_rejected() {
        let (orchestrator, _) = harness();

        let err = orchestrator.begin_registration(&rp(), "a").await.unwrap_err();
        assert!(matches!(err, CeremonyError::InvalidHandle(_)));

        let long = "x".repeat(33);
        let err = orchestrator.begin_registration(&rp(), &long).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_handle");
    }

    #[tokio::test]
    async fn test_existing_credentials_are_excluded() {
        let (orchestrator, verifier) = harness();
        let params = orchestrator.begin_registration(&rp(), "alice").await.unwrap();
        verifier.push_registration(verified("cred-1"));
        orchestrator
            .complete_registration(
                &rp(),
                &params.identity.id,
                &registration_proof(&params.challenge),
            )
            .await
            .unwrap();

        let again = orchestrator.begin_registration(&rp(), "alice").await.unwrap();
        assert_eq!(again.identity.id, params.identity.id);
        let excluded: Vec<_> = again.exclude_credentials.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(excluded, vec!["cred-1"]);
        assert_ne!(again.challenge, params.challenge);
    }

    #[tokio::test]
    async fn test_complete_without_challenge() {
        let (orchestrator, verifier) = harness();
        let params = orchestrator.begin_registration(&rp(), "alice").await.unwrap();
        verifier.push_registration(verified("cred-1"));
        orchestrator
            .complete_registration(
                &rp(),
                &params.identity.id,
                &registration_proof(&params.challenge),
            )
            .await
            .unwrap();

        verifier.push_registration(verified("cred-2"));
        let err = orchestrator
            .complete_registration(
                &rp(),
                &params.identity.id,
                &registration_proof(&params.challenge),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CeremonyError::ChallengeNotFound));
    }

    #[tokio::test]
    async fn test_failed_verification_still_consumes_challenge() {
        let (orchestrator, verifier) = harness();
        let params = orchestrator.begin_registration(&rp(), "alice").await.unwrap();

        verifier.push_registration(RegistrationVerification::Rejected("bad signature".into()));
        let err = orchestrator
            .complete_registration(
                &rp(),
                &params.identity.id,
                &registration_proof(&params.challenge),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CeremonyError::VerificationFailed(_)));

        verifier.push_registration(verified("cred-1"));
        let err = orchestrator
            .complete_registration(
                &rp(),
                &params.identity.id,
                &registration_proof(&params.challenge),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CeremonyError::ChallengeNotFound));
    }

    #[tokio::test]
    async fn test_credential_reuse_across_identities() {
        let (orchestrator, verifier) = harness();

        let alice = orchestrator.begin_registration(&rp(), "alice").await.unwrap();
        verifier.push_registration(verified("cred-1"));
        orchestrator
            .complete_registration(&rp(), &alice.identity.id, &registration_proof(&alice.challenge))
            .await
            .unwrap();

        let mallory = orchestrator.begin_registration(&rp(), "mallory").await.unwrap();
        verifier.push_registration(verified("cred-1"));
        let err = orchestrator
            .complete_registration(
                &rp(),
                &mallory.identity.id,
                &registration_proof(&mallory.challenge),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CeremonyError::DuplicateCredential(ref id) if id == "cred-1"));

        let owner = orchestrator
            .stores()
            .credentials
            .find_by_credential_id("cred-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.identity_id, alice.identity.id);
    }

    #[tokio::test]
    async fn test_superseded_challenge_cannot_complete() {
        let (orchestrator, verifier) = harness();
        let first = orchestrator.begin_registration(&rp(), "alice").await.unwrap();
        let second = orchestrator.begin_registration(&rp(), "alice").await.unwrap();
        let identity_id = &first.identity.id;
        verifier.push_registration(verified("cred-1"));

        // An answer to the first challenge is refused before verification.
        let err = orchestrator
            .complete_registration(&rp(), identity_id, &registration_proof(&first.challenge))
            .await
            .unwrap_err();
        assert!(matches!(err, CeremonyError::ChallengeNotFound));

        // The second ceremony is still open and completes.
        let identity = orchestrator
            .complete_registration(&rp(), identity_id, &registration_proof(&second.challenge))
            .await
            .unwrap();
        assert_eq!(identity.id, second.identity.id);
    }

    #[tokio::test]
    async fn test_garbled_challenge_is_not_found() {
        let (orchestrator, verifier) = harness();
        let params = orchestrator.begin_registration(&rp(), "alice").await.unwrap();
        verifier.push_registration(verified("cred-1"));

        let proof = RegistrationProof::new("%%%", serde_json::json!({ "response": {} }));
        let err = orchestrator
            .complete_registration(&rp(), &params.identity.id, &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, CeremonyError::ChallengeNotFound));

        orchestrator
            .complete_registration(
                &rp(),
                &params.identity.id,
                &registration_proof(&params.challenge),
            )
            .await
            .unwrap();
    }
}
