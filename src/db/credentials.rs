//! # Credential Store (SQLite)
//!
//! `credential_id` is the primary key, so cross-identity uniqueness is
//! enforced by the insert itself rather than a check-then-insert.
//!
//! ## Security Note
//! There is deliberately no foreign key to `identities`: a credential id stays
//! taken even after its owner is removed from the directory.

use crate::db::models::{Credential, NewCredential};
use crate::db::{CredentialStore, SqliteStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

#[derive(sqlx::FromRow)]
struct CredentialRow {
    credential_id: String,
    identity_id: String,
    public_key: Vec<u8>,
    counter: i64,
    transports: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let counter = u32::try_from(row.counter).map_err(|_| {
            StoreError::Corrupt(format!(
                "credential '{}' has out-of-range counter {}",
                row.credential_id, row.counter
            ))
        })?;

        Ok(Credential {
            credential_id: row.credential_id,
            identity_id: row.identity_id,
            public_key: row.public_key,
            counter,
            transports: row.transports.0,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        })
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn list_for_identity(&self, identity_id: &str) -> StoreResult<Vec<Credential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE identity_id = ? ORDER BY created_at",
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn find_by_credential_id(&self, credential_id: &str) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE credential_id = ?",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn create(
        &self,
        identity_id: &str,
        credential: NewCredential,
    ) -> StoreResult<Credential> {
        let credential = Credential::from_new(identity_id, credential);

        let result = sqlx::query(
            "INSERT INTO credentials
             (credential_id, identity_id, public_key, counter, transports, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&credential.credential_id)
        .bind(&credential.identity_id)
        .bind(&credential.public_key)
        .bind(i64::from(credential.counter))
        .bind(Json(&credential.transports))
        .bind(credential.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(credential),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateCredential(credential.credential_id))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn update_counter(&self, credential_id: &str, counter: u32) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE credentials
             SET counter = ?, last_used_at = ?
             WHERE credential_id = ?",
        )
        .bind(i64::from(counter))
        .bind(Utc::now())
        .bind(credential_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            tracing::warn!(credential_id, "Counter update matched no credential");
        }

        Ok(())
    }
}
