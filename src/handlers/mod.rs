//! # HTTP Request Handlers
//!
//! ## Submodules
//! - `health`: Health check endpoint (for monitoring)
//! - `auth`: The four ceremony endpoints (registration and authentication,
//!   each split into an options step and a verify step)
//!
//! ## Handler Pattern
//! Handlers are async functions that:
//! 1. Extract data from the request (relying party, JSON body)
//! 2. Call one `CeremonyOrchestrator` step
//! 3. Return JSON, or an `AppError` that renders as `{"error": "<code>"}`

pub mod auth;
pub mod health;
