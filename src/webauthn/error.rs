//! Ceremony outcomes other than success.
//!
//! Every variant except `Internal` is an expected, caller-recoverable result.
//! `Internal` carries the underlying detail for logs only; the HTTP layer
//! never shows it to clients.

use crate::db::StoreError;
use crate::webauthn::verifier::VerifierError;

#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    #[error("invalid handle: {0}")]
    InvalidHandle(#[from] crate::db::models::InvalidHandle),

    #[error("identity not found")]
    IdentityNotFound,

    #[error("identity has no registered credentials")]
    NoCredentials,

    #[error("no outstanding challenge for this ceremony")]
    ChallengeNotFound,

    #[error("credential not found")]
    CredentialNotFound,

    #[error("credential '{0}' is already registered")]
    DuplicateCredential(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// The proof was valid but the signature counter did not advance.
    /// `reported_counter` is `None` when the verifier refused the counter
    /// itself and did not report it.
    #[error(
        "possible cloned credential '{credential_id}' \
         (stored counter {stored_counter}, reported {reported_counter:?})"
    )]
    PossibleCloneDetected {
        credential_id: String,
        stored_counter: u32,
        reported_counter: Option<u32>,
    },

    #[error("internal failure: {0}")]
    Internal(String),
}

impl CeremonyError {
    /// Stable snake_case code for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CeremonyError::InvalidHandle(_) => "invalid_handle",
            CeremonyError::IdentityNotFound => "identity_not_found",
            CeremonyError::NoCredentials => "no_credentials",
            CeremonyError::ChallengeNotFound => "challenge_not_found",
            CeremonyError::CredentialNotFound => "credential_not_found",
            CeremonyError::DuplicateCredential(_) => "duplicate_credential",
            CeremonyError::VerificationFailed(_) => "verification_failed",
            CeremonyError::PossibleCloneDetected { .. } => "possible_clone_detected",
            CeremonyError::Internal(_) => "internal_failure",
        }
    }
}

impl From<StoreError> for CeremonyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateCredential(id) => CeremonyError::DuplicateCredential(id),
            other => CeremonyError::Internal(other.to_string()),
        }
    }
}

impl From<VerifierError> for CeremonyError {
    fn from(e: VerifierError) -> Self {
        CeremonyError::Internal(e.to_string())
    }
}

pub type CeremonyResult<T> = Result<T, CeremonyError>;
