//! # Identity Directory (SQLite)
//!
//! Handle uniqueness is the table's UNIQUE constraint. Creation inserts with
//! `ON CONFLICT(handle) DO NOTHING` and then reads back whichever row won, so
//! racing first registrations of the same handle never produce two identities.

use crate::db::models::{Handle, Identity};
use crate::db::{IdentityDirectory, SqliteStore, StoreResult};
use async_trait::async_trait;

#[async_trait]
impl IdentityDirectory for SqliteStore {
    async fn resolve_or_create(&self, handle: &Handle) -> StoreResult<Identity> {
        let candidate = Identity::new(handle);

        let inserted = sqlx::query(
            "INSERT INTO identities (id, handle, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(handle) DO NOTHING",
        )
        .bind(&candidate.id)
        .bind(&candidate.handle)
        .bind(candidate.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            tracing::info!(
                identity_id = %candidate.id,
                handle = %candidate.handle,
                "Created identity"
            );
            return Ok(candidate);
        }

        self.find_by_handle(handle.as_str())
            .await?
            .ok_or_else(|| {
                crate::db::StoreError::Corrupt(format!("identity for handle '{}' vanished", handle))
            })
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(identity)
    }

    async fn find_by_handle(&self, handle: &str) -> StoreResult<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE handle = ?")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;

        Ok(identity)
    }
}
