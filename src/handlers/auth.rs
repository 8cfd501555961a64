//! # Ceremony Endpoints
//!
//! Thin HTTP wrappers over the `CeremonyOrchestrator`. Each handler resolves
//! the relying party from the request, runs one ceremony step, and returns
//! its result as JSON. Failures become `AppError` responses.

use crate::error::{AppError, AppResult};
use crate::relying_party::RelyingParty;
use crate::state::AppState;
use crate::webauthn::types::*;
use axum::{extract::State, Json};
use serde_json::{json, Value};

// Registration endpoints

pub async fn registration_options(
    State(state): State<AppState>,
    rp: RelyingParty,
    Json(req): Json<RegistrationStartRequest>,
) -> AppResult<Json<Value>> {
    let params = state.orchestrator.begin_registration(&rp, &req.handle).await?;

    Ok(Json(json!({
        "identity": params.identity,
        "challenge": params.challenge,
        "exclude_credentials": params.exclude_credentials,
        "options": params.options,
    })))
}

pub async fn verify_registration(
    State(state): State<AppState>,
    rp: RelyingParty,
    Json(req): Json<RegistrationFinishRequest>,
) -> AppResult<Json<Value>> {
    let proof = RegistrationProof::new(req.challenge, req.credential);
    let identity = state
        .orchestrator
        .complete_registration(&rp, &req.identity_id, &proof)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "identity": identity,
    })))
}

// Authentication endpoints

pub async fn authentication_options(
    State(state): State<AppState>,
    rp: RelyingParty,
    Json(req): Json<AuthenticationStartRequest>,
) -> AppResult<Json<Value>> {
    let params = state.orchestrator.begin_authentication(&rp, &req.handle).await?;

    Ok(Json(json!({
        "identity": params.identity,
        "challenge": params.challenge,
        "allow_credentials": params.allow_credentials,
        "options": params.options,
    })))
}

pub async fn verify_authentication(
    State(state): State<AppState>,
    rp: RelyingParty,
    Json(req): Json<AuthenticationFinishRequest>,
) -> AppResult<Json<Value>> {
    let proof = AuthenticationProof::from_assertion(req.challenge, req.credential)
        .ok_or_else(|| AppError::BadRequest("assertion has no credential id".to_string()))?;

    let summary = state
        .orchestrator
        .complete_authentication(&rp, &req.handle, &proof)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "identity": summary.identity,
        "credential_id": summary.credential_id,
        "counter": summary.counter,
    })))
}
