//! API integration tests for the passkey ceremony server.
//!
//! Drives full registration and login ceremonies through the HTTP routes,
//! with in-memory stores and a scripted verifier standing in for the
//! authenticator's cryptography.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use passkey_ceremony::config::{Config, MEMORY_DATABASE};
use passkey_ceremony::db::models::NewCredential;
use passkey_ceremony::db::Stores;
use passkey_ceremony::state::AppState;
use passkey_ceremony::webauthn::verifier::{AuthenticationVerification, RegistrationVerification};
use passkey_ceremony::webauthn::ScriptedVerifier;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Router over fresh in-memory stores, plus the verifier to script.
fn create_test_app() -> (Router, Arc<ScriptedVerifier>) {
    let config = Config {
        database_url: MEMORY_DATABASE.to_string(),
        ..Config::default()
    };
    let verifier = Arc::new(ScriptedVerifier::new());
    let state = AppState::with_parts(config, Stores::memory(), verifier.clone());
    (passkey_ceremony::router(state), verifier)
}

/// POSTs `body` as JSON to `uri`, returning status and parsed body.
async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("host", "localhost:4000")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn credential(id: &str, counter: u32) -> NewCredential {
    NewCredential {
        credential_id: id.to_string(),
        public_key: b"cose-key".to_vec(),
        counter,
        transports: vec!["internal".to_string()],
    }
}

/// Registers `cred-1` with `counter` for `handle`; returns the identity id.
async fn register(
    app: &Router,
    verifier: &ScriptedVerifier,
    handle: &str,
    counter: u32,
) -> String {
    let (status, options) = post_json(
        app,
        "/api/webauthn/generate-registration-options",
        json!({ "handle": handle }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", options);

    let identity_id = options["identity"]["id"].as_str().unwrap().to_string();
    let challenge = options["challenge"].as_str().unwrap();

    verifier.push_registration(RegistrationVerification::Verified(credential("cred-1", counter)));
    let (status, body) = post_json(
        app,
        "/api/webauthn/verify-registration",
        json!({
            "identity_id": identity_id,
            "challenge": challenge,
            "credential": { "id": "cred-1", "challenge": challenge, "response": {} },
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["ok"], true);

    identity_id
}

/// Runs one login ceremony; the verifier reports `new_counter`.
async fn login(
    app: &Router,
    verifier: &ScriptedVerifier,
    handle: &str,
    new_counter: u32,
) -> (StatusCode, Value) {
    let (status, options) = post_json(
        app,
        "/api/webauthn/generate-authentication-options",
        json!({ "handle": handle }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", options);
    let challenge = options["challenge"].as_str().unwrap();

    verifier.push_authentication(AuthenticationVerification::Verified { new_counter });
    post_json(
        app,
        "/api/webauthn/verify-authentication",
        json!({
            "handle": handle,
            "challenge": challenge,
            "credential": { "id": "cred-1", "challenge": challenge, "response": {} },
        }),
    )
    .await
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_reports_backend() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "memory");
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_registration_options_for_new_handle() {
    let (app, _) = create_test_app();

    let (status, body) = post_json(
        &app,
        "/api/webauthn/generate-registration-options",
        json!({ "handle": "alice" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity"]["handle"], "alice");
    assert_eq!(body["exclude_credentials"], json!([]));
    // 32 bytes, base64url without padding
    assert_eq!(body["challenge"].as_str().unwrap().len(), 43);
    // Relying party derived from the Host header
    assert_eq!(body["options"]["rp"]["id"], "localhost");
}

#[tokio::test]
async fn test_invalid_handle_is_bad_request() {
    let (app, _) = create_test_app();

    let too_long = "x".repeat(33);
    for handle in ["a", too_long.as_str()] {
        let (status, body) = post_json(
            &app,
            "/api/webauthn/generate-registration-options",
            json!({ "handle": handle }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "invalid_handle" }));
    }
}

#[tokio::test]
async fn test_registered_credential_is_excluded_next_time() {
    let (app, verifier) = create_test_app();
    register(&app, &verifier, "alice", 5).await;

    let (status, body) = post_json(
        &app,
        "/api/webauthn/generate-registration-options",
        json!({ "handle": "alice" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exclude_credentials"][0]["id"], "cred-1");
}

#[tokio::test]
async fn test_verify_registration_without_options_is_rejected() {
    let (app, _) = create_test_app();

    let (status, body) = post_json(
        &app,
        "/api/webauthn/verify-registration",
        json!({
            "identity_id": "nobody",
            "challenge": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "credential": { "id": "cred-1" },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "challenge_not_found");
}

#[tokio::test]
async fn test_duplicate_credential_is_conflict() {
    let (app, verifier) = create_test_app();
    register(&app, &verifier, "alice", 0).await;

    let (_, options) = post_json(
        &app,
        "/api/webauthn/generate-registration-options",
        json!({ "handle": "bob" }),
    )
    .await;

    verifier.push_registration(RegistrationVerification::Verified(credential("cred-1", 0)));
    let (status, body) = post_json(
        &app,
        "/api/webauthn/verify-registration",
        json!({
            "identity_id": options["identity"]["id"],
            "challenge": options["challenge"],
            "credential": { "id": "cred-1", "challenge": options["challenge"], "response": {} },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_credential");
}

#[tokio::test]
async fn test_stale_options_do_not_cancel_newer_registration() {
    let (app, verifier) = create_test_app();

    let mut issued = Vec::new();
    for _ in 0..2 {
        let (status, options) = post_json(
            &app,
            "/api/webauthn/generate-registration-options",
            json!({ "handle": "alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        issued.push(options);
    }
    let (first, second) = (&issued[0], &issued[1]);

    let attestation = |options: &Value| {
        json!({
            "identity_id": options["identity"]["id"],
            "challenge": options["challenge"],
            "credential": { "id": "cred-1", "challenge": options["challenge"], "response": {} },
        })
    };

    verifier.push_registration(RegistrationVerification::Verified(credential("cred-1", 0)));
    let (status, body) =
        post_json(&app, "/api/webauthn/verify-registration", attestation(first)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "challenge_not_found");

    let (status, body) =
        post_json(&app, "/api/webauthn/verify-registration", attestation(second)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["identity"]["id"], second["identity"]["id"]);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_login_advances_counter() {
    let (app, verifier) = create_test_app();
    let identity_id = register(&app, &verifier, "alice", 5).await;

    let (status, body) = login(&app, &verifier, "alice", 6).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["identity"]["id"], identity_id.as_str());
    assert_eq!(body["credential_id"], "cred-1");
    assert_eq!(body["counter"], 6);
}

#[tokio::test]
async fn test_replayed_assertion_is_rejected() {
    let (app, verifier) = create_test_app();
    register(&app, &verifier, "alice", 0).await;

    let (_, options) = post_json(
        &app,
        "/api/webauthn/generate-authentication-options",
        json!({ "handle": "alice" }),
    )
    .await;
    let assertion = json!({
        "handle": "alice",
        "challenge": options["challenge"],
        "credential": { "id": "cred-1", "challenge": options["challenge"], "response": {} },
    });

    verifier.push_authentication(AuthenticationVerification::Verified { new_counter: 0 });
    let (status, _) =
        post_json(&app, "/api/webauthn/verify-authentication", assertion.clone()).await;
    assert_eq!(status, StatusCode::OK);

    verifier.push_authentication(AuthenticationVerification::Verified { new_counter: 0 });
    let (status, body) = post_json(&app, "/api/webauthn/verify-authentication", assertion).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "challenge_not_found");
}

#[tokio::test]
async fn test_counter_regression_is_forbidden() {
    let (app, verifier) = create_test_app();
    register(&app, &verifier, "alice", 5).await;

    let (status, body) = login(&app, &verifier, "alice", 3).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "possible_clone_detected" }));

    // The stored counter was left at 5, so 6 still succeeds.
    let (status, body) = login(&app, &verifier, "alice", 6).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counter"], 6);
}

#[tokio::test]
async fn test_login_for_unknown_handle_is_not_found() {
    let (app, _) = create_test_app();

    let (status, body) = post_json(
        &app,
        "/api/webauthn/generate-authentication-options",
        json!({ "handle": "ghost" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "identity_not_found");
}

#[tokio::test]
async fn test_login_without_credentials_is_not_found() {
    let (app, _) = create_test_app();

    // Creates the identity but never completes registration.
    post_json(
        &app,
        "/api/webauthn/generate-registration-options",
        json!({ "handle": "alice" }),
    )
    .await;

    let (status, body) = post_json(
        &app,
        "/api/webauthn/generate-authentication-options",
        json!({ "handle": "alice" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no_credentials");
}

#[tokio::test]
async fn test_assertion_without_id_is_bad_request() {
    let (app, verifier) = create_test_app();
    register(&app, &verifier, "alice", 0).await;

    let (status, body) = post_json(
        &app,
        "/api/webauthn/verify-authentication",
        json!({
            "handle": "alice",
            "challenge": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "credential": { "response": {} },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_missing_host_is_bad_request() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webauthn/generate-registration-options")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "handle": "alice" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
