//! In-memory implementation of the three stores
//!
//! Useful for development (`DATABASE_URL=memory`) and orchestrator tests.
//! Everything is lost on restart. Atomicity comes from DashMap's per-shard
//! locking: `entry` for create-if-absent, `insert` for replace-and-return,
//! `remove_if` for consume-once.

use super::models::{
    Challenge, Credential, Handle, Identity, IssuedChallenge, NewCredential, Purpose,
};
use super::{ChallengeStore, CredentialStore, IdentityDirectory, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryStore {
    /// identity id -> identity
    identities: DashMap<String, Identity>,
    /// handle -> identity id
    handles: DashMap<String, String>,
    /// identity id -> outstanding challenge
    challenges: DashMap<String, Challenge>,
    /// credential id -> credential
    credentials: DashMap<String, Credential>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryStore {
    async fn resolve_or_create(&self, handle: &Handle) -> StoreResult<Identity> {
        // The handle entry stays locked until the identity is inserted, so a
        // loser of the race always finds the winner's record.
        let id = match self.handles.entry(handle.as_str().to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let identity = Identity::new(handle);
                self.identities.insert(identity.id.clone(), identity.clone());
                entry.insert(identity.id.clone());
                tracing::info!(
                    identity_id = %identity.id,
                    handle = %identity.handle,
                    "Created identity"
                );
                return Ok(identity);
            }
        };

        self.identities
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                StoreError::Corrupt(format!("handle '{}' points at missing identity", handle))
            })
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Identity>> {
        Ok(self.identities.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_handle(&self, handle: &str) -> StoreResult<Option<Identity>> {
        let id = match self.handles.get(handle) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        Ok(self.identities.get(&id).map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn issue(&self, identity_id: &str, purpose: Purpose) -> StoreResult<IssuedChallenge> {
        let challenge = Challenge::generate(identity_id, purpose);
        let superseded = self
            .challenges
            .insert(identity_id.to_string(), challenge.clone());

        Ok(IssuedChallenge { challenge, superseded })
    }

    async fn bind(&self, identity_id: &str, value: &[u8], binding: Vec<u8>) -> StoreResult<bool> {
        match self.challenges.get_mut(identity_id) {
            Some(mut entry) if entry.value == value => {
                entry.binding = Some(binding);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume(
        &self,
        identity_id: &str,
        purpose: Purpose,
        value: &[u8],
    ) -> StoreResult<Option<Challenge>> {
        Ok(self
            .challenges
            .remove_if(identity_id, |_, challenge| {
                challenge.purpose == purpose && challenge.value == value
            })
            .map(|(_, challenge)| challenge))
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let before = self.challenges.len();
        self.challenges.retain(|_, challenge| challenge.issued_at >= cutoff);
        Ok(before.saturating_sub(self.challenges.len()) as u64)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn list_for_identity(&self, identity_id: &str) -> StoreResult<Vec<Credential>> {
        let mut credentials: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|entry| entry.identity_id == identity_id)
            .map(|entry| entry.value().clone())
            .collect();
        credentials.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(credentials)
    }

    async fn find_by_credential_id(&self, credential_id: &str) -> StoreResult<Option<Credential>> {
        Ok(self.credentials.get(credential_id).map(|entry| entry.value().clone()))
    }

    async fn create(
        &self,
        identity_id: &str,
        credential: NewCredential,
    ) -> StoreResult<Credential> {
        match self.credentials.entry(credential.credential_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateCredential(credential.credential_id)),
            Entry::Vacant(entry) => {
                let credential = Credential::from_new(identity_id, credential);
                entry.insert(credential.clone());
                Ok(credential)
            }
        }
    }

    async fn update_counter(&self, credential_id: &str, counter: u32) -> StoreResult<()> {
        match self.credentials.get_mut(credential_id) {
            Some(mut entry) => {
                entry.counter = counter;
                entry.last_used_at = Some(Utc::now());
            }
            None => tracing::warn!(credential_id, "Counter update matched no credential"),
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("identities", &self.identities.len())
            .field("challenges", &self.challenges.len())
            .field("credentials", &self.credentials.len())
            .finish()
    }
}
