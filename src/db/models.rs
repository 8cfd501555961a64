//! # Store Models
//!
//! Records owned by the three stores: identities, challenges and credentials.
//! Timestamps are kept as `DateTime<Utc>` and stored by SQLite as RFC3339 text.

use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Shortest handle accepted at registration, in characters.
pub const MIN_HANDLE_CHARS: usize = 2;

/// Longest handle accepted at registration, in characters.
pub const MAX_HANDLE_CHARS: usize = 32;

/// Number of random bytes in a challenge value.
pub const CHALLENGE_BYTES: usize = 32;

/// A validated, user-chosen handle.
///
/// Only `Handle::parse` constructs one, so anything holding a `Handle`
/// is between 2 and 32 characters long.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(String);

/// Returned by [`Handle::parse`] when the length is out of range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handle must be 2 to 32 characters long, got {0}")]
pub struct InvalidHandle(pub usize);

impl Handle {
    pub fn parse(raw: &str) -> Result<Self, InvalidHandle> {
        let chars = raw.chars().count();
        if !(MIN_HANDLE_CHARS..=MAX_HANDLE_CHARS).contains(&chars) {
            return Err(InvalidHandle(chars));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered (or registering) person.
///
/// `id` is a UUID v4 generated once; `handle` is unique and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Identity {
    pub id: String,
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(handle: &Handle) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            handle: handle.as_str().to_string(),
            created_at: Utc::now(),
        }
    }

    /// The `{id, handle}` pair returned to clients.
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            id: self.id.clone(),
            handle: self.handle.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub id: String,
    pub handle: String,
}

/// Which ceremony a challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Registration,
    Authentication,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Registration => "registration",
            Purpose::Authentication => "authentication",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "registration" => Some(Purpose::Registration),
            "authentication" => Some(Purpose::Authentication),
            _ => None,
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single outstanding challenge of an identity.
///
/// `binding` is opaque per-ceremony state some verification primitives
/// need to keep next to the challenge (webauthn-rs keeps its own
/// registration/authentication state there).
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge {
    pub identity_id: String,
    pub value: Vec<u8>,
    pub purpose: Purpose,
    pub issued_at: DateTime<Utc>,
    pub binding: Option<Vec<u8>>,
}

impl Challenge {
    /// Fresh challenge with `CHALLENGE_BYTES` bytes from the OS RNG.
    pub fn generate(identity_id: &str, purpose: Purpose) -> Self {
        let mut value = vec![0u8; CHALLENGE_BYTES];
        OsRng.fill_bytes(&mut value);

        Self {
            identity_id: identity_id.to_string(),
            value,
            purpose,
            issued_at: Utc::now(),
            binding: None,
        }
    }

    /// base64url (no padding) form of `value`, as handed to clients.
    pub fn encoded_value(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(&self.value)
    }

    /// Decodes a client-echoed `encoded_value()` back to raw bytes.
    /// `None` if it is not base64url.
    pub fn decode_value(encoded: &str) -> Option<Vec<u8>> {
        BASE64_URL_SAFE_NO_PAD.decode(encoded).ok()
    }

    /// True once the challenge is older than `ttl` at `now`.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.issued_at > ttl
    }
}

// The value is a secret until the ceremony completes; keep it out of logs.
impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("identity_id", &self.identity_id)
            .field("value", &"[REDACTED]")
            .field("purpose", &self.purpose)
            .field("issued_at", &self.issued_at)
            .field("binding", &self.binding.as_ref().map(Vec::len))
            .finish()
    }
}

/// Result of `ChallengeStore::issue`: the new challenge and the one it replaced.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub challenge: Challenge,
    pub superseded: Option<Challenge>,
}

/// Server-side record of one registered authenticator.
///
/// `counter` only moves forward, and only through `CredentialStore::update_counter`.
/// A counter of `0` on both sides means the authenticator does not count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub credential_id: String,
    pub identity_id: String,
    pub public_key: Vec<u8>,
    pub counter: u32,
    pub transports: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Credential material extracted from a verified registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredential {
    pub credential_id: String,
    pub public_key: Vec<u8>,
    pub counter: u32,
    pub transports: Vec<String>,
}

impl Credential {
    pub fn from_new(identity_id: &str, new: NewCredential) -> Self {
        Self {
            credential_id: new.credential_id,
            identity_id: identity_id.to_string(),
            public_key: new.public_key,
            counter: new.counter,
            transports: new.transports,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}
