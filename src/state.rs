//! # Application State
//!
//! Shared by every handler. Axum clones it per request, which is cheap:
//! everything inside is behind an `Arc`.

use crate::config::Config;
use crate::db::{SqliteStore, Stores};
use crate::webauthn::{CeremonyOrchestrator, CeremonyVerifier, PasskeyVerifier};
use anyhow::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CeremonyOrchestrator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Production state: stores per `DATABASE_URL`, webauthn-rs verification.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn new(config: &Config) -> Result<Self> {
        let stores = if config.uses_memory_store() {
            tracing::warn!(
                "Using in-memory stores - identities and credentials will be lost on restart!"
            );
            Stores::memory()
        } else {
            Stores::sqlite(SqliteStore::connect(&config.database_url).await?)
        };

        let verifier = Arc::new(PasskeyVerifier::new(config.rp_name.clone()));
        Ok(Self::with_parts(config.clone(), stores, verifier))
    }

    /// State over explicit stores and verifier.
    pub fn with_parts(config: Config, stores: Stores, verifier: Arc<dyn CeremonyVerifier>) -> Self {
        let orchestrator = CeremonyOrchestrator::new(stores, verifier, config.challenge_ttl());
        Self {
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}
