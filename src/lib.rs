//! # Passkey Ceremony Server
//!
//! Orchestrates WebAuthn passkey registration and authentication for
//! identities named by a short handle. The ceremony logic lives in
//! `webauthn`, persistence behind the traits in `db`, and the HTTP surface
//! in `handlers`.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod relying_party;
pub mod state;
pub mod webauthn;

use crate::handlers::auth::*;
use crate::handlers::health::health_check;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the application router over `state`.
pub fn router(state: AppState) -> Router {
    // Ceremonies are bound to an origin by the relying party, not by CORS.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Registration: options, then verification of the attestation
        .route("/api/webauthn/generate-registration-options", post(registration_options))
        .route("/api/webauthn/verify-registration", post(verify_registration))
        // Authentication: options, then verification of the assertion
        .route("/api/webauthn/generate-authentication-options", post(authentication_options))
        .route("/api/webauthn/verify-authentication", post(verify_authentication))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
