//! # Ceremony Stores
//!
//! The three shared mutable resources of the service:
//! - `IdentityDirectory`: handle -> identity, unique handles
//! - `ChallengeStore`: at most one outstanding challenge per identity
//! - `CredentialStore`: registered credentials, unique ids across all identities
//!
//! Every contract that concurrent requests rely on (unique handle, consume-once
//! challenge, unique credential id) is enforced atomically by the backend itself,
//! never by a lock held in the orchestrator. Two backends implement the traits:
//! `SqliteStore` (persistent) and `MemoryStore` (DashMap, development and tests).

pub mod challenges;
pub mod credentials;
pub mod identities;
pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use models::{Challenge, Credential, Handle, Identity, IssuedChallenge, NewCredential, Purpose};
use std::sync::Arc;

/// Failures below the orchestrator's abstraction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The credential id is already registered, to any identity.
    #[error("credential '{0}' is already registered")]
    DuplicateCredential(String),

    /// A stored row could not be mapped back to a model.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Returns the identity owning `handle`, creating it if unseen.
    ///
    /// Concurrent callers racing on the same new handle all observe the
    /// single record that won.
    async fn resolve_or_create(&self, handle: &Handle) -> StoreResult<Identity>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Identity>>;

    async fn find_by_handle(&self, handle: &str) -> StoreResult<Option<Identity>>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Generates a fresh challenge and atomically replaces any prior one
    /// for the identity, returning both.
    async fn issue(&self, identity_id: &str, purpose: Purpose) -> StoreResult<IssuedChallenge>;

    /// Attaches verifier state to the outstanding challenge, only if it is
    /// still the one whose value is `value`. Returns whether it was attached.
    async fn bind(&self, identity_id: &str, value: &[u8], binding: Vec<u8>) -> StoreResult<bool>;

    /// Removes and returns the identity's challenge if it has `purpose` and
    /// its value is `value`.
    ///
    /// At most one caller ever receives a given challenge. A purpose or value
    /// mismatch returns `None` and leaves the record alone, so a proof made
    /// against a superseded challenge cannot cancel the current ceremony.
    async fn consume(
        &self,
        identity_id: &str,
        purpose: Purpose,
        value: &[u8],
    ) -> StoreResult<Option<Challenge>>;

    /// Deletes challenges issued before `cutoff`. Returns how many went.
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_for_identity(&self, identity_id: &str) -> StoreResult<Vec<Credential>>;

    async fn find_by_credential_id(&self, credential_id: &str) -> StoreResult<Option<Credential>>;

    /// Persists a credential. Fails with `StoreError::DuplicateCredential`
    /// if the id exists anywhere in the store, whether or not its owning
    /// identity still exists.
    async fn create(&self, identity_id: &str, credential: NewCredential) -> StoreResult<Credential>;

    /// Unconditional counter write; also stamps `last_used_at`.
    async fn update_counter(&self, credential_id: &str, counter: u32) -> StoreResult<()>;
}

/// The three stores the orchestrator works against.
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityDirectory>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub credentials: Arc<dyn CredentialStore>,
    backend: &'static str,
}

impl Stores {
    pub fn sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self {
            identities: store.clone(),
            challenges: store.clone(),
            credentials: store,
            backend: "sqlite",
        }
    }

    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            identities: store.clone(),
            challenges: store.clone(),
            credentials: store,
            backend: "memory",
        }
    }

    /// Name of the backend, for health reporting.
    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").field("backend", &self.backend).finish()
    }
}
