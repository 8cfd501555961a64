//! # Error Handling
//!
//! `AppError` is what HTTP handlers return. Ceremony outcomes are mapped to
//! status codes and a stable `{"error": "<code>"}` body. Internal failures
//! are logged with full detail and answered with an opaque 500.

use crate::webauthn::CeremonyError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// A ceremony ended without success.
    #[error(transparent)]
    Ceremony(#[from] CeremonyError),

    /// The request itself is unusable (missing fields, no host to bind to).
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Ceremony(e) => match e {
                CeremonyError::InvalidHandle(_) => StatusCode::BAD_REQUEST,
                CeremonyError::IdentityNotFound => StatusCode::NOT_FOUND,
                CeremonyError::NoCredentials => StatusCode::NOT_FOUND,
                CeremonyError::ChallengeNotFound => StatusCode::BAD_REQUEST,
                CeremonyError::CredentialNotFound => StatusCode::NOT_FOUND,
                CeremonyError::DuplicateCredential(_) => StatusCode::CONFLICT,
                CeremonyError::VerificationFailed(_) => StatusCode::BAD_REQUEST,
                CeremonyError::PossibleCloneDetected { .. } => StatusCode::FORBIDDEN,
                CeremonyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Code placed in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Ceremony(e) => e.kind(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Ceremony(CeremonyError::Internal(detail)) => {
                tracing::error!("Internal failure: {}", detail);
            }
            AppError::BadRequest(reason) => {
                tracing::debug!("Bad request: {}", reason);
            }
            AppError::Ceremony(e) => {
                tracing::debug!(code = e.kind(), "Ceremony rejected: {}", e);
            }
        }

        let body = Json(json!({
            "error": self.code(),
        }));

        (self.status(), body).into_response()
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::from(CeremonyError::IdentityNotFound), StatusCode::NOT_FOUND),
            (AppError::from(CeremonyError::ChallengeNotFound), StatusCode::BAD_REQUEST),
            (AppError::from(CeremonyError::DuplicateCredential("c".into())), StatusCode::CONFLICT),
            (
                AppError::from(CeremonyError::VerificationFailed("sig".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(CeremonyError::PossibleCloneDetected {
                    credential_id: "c".into(),
                    stored_counter: 5,
                    reported_counter: Some(3),
                }),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::from(CeremonyError::Internal("db".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{:?}", error);
        }
    }

    #[tokio::test]
    async fn test_internal_detail_is_not_exposed() {
        let error = AppError::from(CeremonyError::Internal("disk I/O error at /var/db".into()));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "error": "internal_failure" }));
    }
}
