//! # webauthn-rs Verification Primitive
//!
//! Production `CeremonyVerifier` backed by webauthn-rs' passkey profile.
//!
//! ## How state flows
//! webauthn-rs generates and tracks its own ceremony challenge inside
//! `PasskeyRegistration` / `PasskeyAuthentication`. That state is serialized
//! into the challenge record's `binding`, so it is consumed exactly once
//! together with the challenge, and handed back here at verification time.
//!
//! The stored credential "public key" is the serialized `Passkey`, which
//! webauthn-rs needs in full to verify later assertions.
//!
//! ## Policy
//! The passkey profile fixes user verification to required and attestation
//! to none, matching the default `RegistrationPolicy`/`AuthenticationPolicy`.

use crate::db::models::{Challenge, Credential, Identity, NewCredential};
use crate::relying_party::RelyingParty;
use crate::webauthn::clone_detection::COUNTER_UNSUPPORTED;
use crate::webauthn::types::{AuthenticationProof, RegistrationProof};
use crate::webauthn::verifier::{
    AuthenticationPolicy, AuthenticationVerification, CeremonyOptions, CeremonyVerifier,
    RegistrationPolicy, RegistrationVerification, VerifierError,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use webauthn_rs::prelude::*;

/// Upper bound on cached `Webauthn` instances. Relying parties come from
/// request headers, so the cache must not grow with attacker input.
const MAX_CACHED_RELYING_PARTIES: usize = 32;

pub struct PasskeyVerifier {
    rp_name: String,
    /// (rp id, origin) -> configured instance
    instances: DashMap<(String, String), Arc<Webauthn>>,
}

impl PasskeyVerifier {
    pub fn new(rp_name: impl Into<String>) -> Self {
        Self {
            rp_name: rp_name.into(),
            instances: DashMap::new(),
        }
    }

    /// The `Webauthn` instance configured for this relying party.
    fn webauthn(&self, rp: &RelyingParty) -> Result<Arc<Webauthn>, VerifierError> {
        let key = (rp.id.clone(), rp.origin.clone());
        if let Some(instance) = self.instances.get(&key) {
            return Ok(instance.value().clone());
        }

        let origin = Url::parse(&rp.origin)
            .map_err(|e| VerifierError::Config(format!("origin '{}': {}", rp.origin, e)))?;
        let webauthn = WebauthnBuilder::new(&rp.id, &origin)
            .map_err(|e| VerifierError::Config(format!("rp id '{}': {}", rp.id, e)))?
            .rp_name(&self.rp_name)
            .build()
            .map_err(|e| VerifierError::Config(e.to_string()))?;
        let webauthn = Arc::new(webauthn);

        if self.instances.len() < MAX_CACHED_RELYING_PARTIES {
            self.instances.insert(key, webauthn.clone());
        }
        Ok(webauthn)
    }
}

fn decode_binding<T: DeserializeOwned>(challenge: &Challenge) -> Result<T, VerifierError> {
    let binding = challenge
        .binding
        .as_deref()
        .ok_or_else(|| VerifierError::State("challenge carries no webauthn state".to_string()))?;
    serde_json::from_slice(binding).map_err(|e| VerifierError::State(e.to_string()))
}

fn decode_passkey(credential: &Credential) -> Result<Passkey, VerifierError> {
    serde_json::from_slice(&credential.public_key)
        .map_err(|e| VerifierError::Credential(format!("'{}': {}", credential.credential_id, e)))
}

fn encode_credential_id(id: &CredentialID) -> String {
    URL_SAFE_NO_PAD.encode(id)
}

/// Signature counter recorded in a serialized passkey, or the "does not
/// count" sentinel when it is absent.
fn initial_counter(serialized: &serde_json::Value) -> u32 {
    serialized
        .pointer("/cred/counter")
        .and_then(serde_json::Value::as_u64)
        .and_then(|counter| u32::try_from(counter).ok())
        .unwrap_or(COUNTER_UNSUPPORTED)
}

impl CeremonyVerifier for PasskeyVerifier {
    fn registration_options(
        &self,
        rp: &RelyingParty,
        identity: &Identity,
        _challenge: &Challenge,
        exclude: &[Credential],
        _policy: &RegistrationPolicy,
    ) -> Result<CeremonyOptions, VerifierError> {
        let webauthn = self.webauthn(rp)?;

        let user_id = Uuid::parse_str(&identity.id)
            .map_err(|e| VerifierError::State(format!("identity id is not a UUID: {}", e)))?;

        let exclude = exclude
            .iter()
            .map(|credential| decode_passkey(credential).map(|passkey| passkey.cred_id().clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = (!exclude.is_empty()).then_some(exclude);

        let (ccr, state) = webauthn
            .start_passkey_registration(user_id, &identity.handle, &identity.handle, exclude)
            .map_err(|e| VerifierError::Config(e.to_string()))?;

        Ok(CeremonyOptions {
            public_key: serde_json::to_value(&ccr)?,
            binding: Some(serde_json::to_vec(&state)?),
        })
    }

    fn verify_registration(
        &self,
        rp: &RelyingParty,
        proof: &RegistrationProof,
        expected: &Challenge,
    ) -> Result<RegistrationVerification, VerifierError> {
        let webauthn = self.webauthn(rp)?;
        let state: PasskeyRegistration = decode_binding(expected)?;

        let credential: RegisterPublicKeyCredential =
            match serde_json::from_value(proof.response.clone()) {
                Ok(credential) => credential,
                Err(e) => {
                    let reason = format!("malformed attestation: {}", e);
                    return Ok(RegistrationVerification::Rejected(reason));
                }
            };

        let passkey = match webauthn.finish_passkey_registration(&credential, &state) {
            Ok(passkey) => passkey,
            Err(e) => return Ok(RegistrationVerification::Rejected(e.to_string())),
        };

        // The passkey profile has no counter accessor; read it back from the
        // serialized credential that is stored anyway.
        let serialized = serde_json::to_value(&passkey)?;
        Ok(RegistrationVerification::Verified(NewCredential {
            credential_id: encode_credential_id(passkey.cred_id()),
            counter: initial_counter(&serialized),
            public_key: serde_json::to_vec(&serialized)?,
            transports: proof.transports(),
        }))
    }

    fn authentication_options(
        &self,
        rp: &RelyingParty,
        _challenge: &Challenge,
        allow: &[Credential],
        _policy: &AuthenticationPolicy,
    ) -> Result<CeremonyOptions, VerifierError> {
        let webauthn = self.webauthn(rp)?;

        let passkeys = allow
            .iter()
            .map(decode_passkey)
            .collect::<Result<Vec<_>, _>>()?;

        let (rcr, state) = webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| VerifierError::Config(e.to_string()))?;

        Ok(CeremonyOptions {
            public_key: serde_json::to_value(&rcr)?,
            binding: Some(serde_json::to_vec(&state)?),
        })
    }

    fn verify_authentication(
        &self,
        rp: &RelyingParty,
        proof: &AuthenticationProof,
        expected: &Challenge,
        credential: &Credential,
    ) -> Result<AuthenticationVerification, VerifierError> {
        let webauthn = self.webauthn(rp)?;
        let state: PasskeyAuthentication = decode_binding(expected)?;

        let assertion: PublicKeyCredential = match serde_json::from_value(proof.response.clone()) {
            Ok(assertion) => assertion,
            Err(e) => {
                let reason = format!("malformed assertion: {}", e);
                return Ok(AuthenticationVerification::Rejected(reason));
            }
        };

        let result = match webauthn.finish_passkey_authentication(&assertion, &state) {
            Ok(result) => result,
            Err(WebauthnError::CredentialPossibleCompromise) => {
                return Ok(AuthenticationVerification::CounterRegressed)
            }
            Err(e) => return Ok(AuthenticationVerification::Rejected(e.to_string())),
        };

        // The assertion may be signed by another credential of the same
        // identity than the one it claims in `id`.
        if encode_credential_id(result.cred_id()) != credential.credential_id {
            return Ok(AuthenticationVerification::Rejected(
                "assertion signed by a different credential than claimed".to_string(),
            ));
        }

        Ok(AuthenticationVerification::Verified {
            new_counter: result.counter(),
        })
    }
}

impl std::fmt::Debug for PasskeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeyVerifier")
            .field("rp_name", &self.rp_name)
            .field("cached_relying_parties", &self.instances.len())
            .finish()
    }
}
