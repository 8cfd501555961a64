//! # Challenge Store (SQLite)
//!
//! One row per identity (`identity_id` is the primary key).
//!
//! - `issue` deletes the previous row (returning it) and inserts the new one in
//!   a single write transaction.
//! - `consume` is one `DELETE ... RETURNING` statement matching identity,
//!   purpose and value, so of two racing completions exactly one gets the
//!   row back, and a superseded value never matches.

use crate::db::models::{Challenge, IssuedChallenge, Purpose};
use crate::db::{ChallengeStore, SqliteStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(sqlx::FromRow)]
struct ChallengeRow {
    identity_id: String,
    value: Vec<u8>,
    purpose: String,
    issued_at: DateTime<Utc>,
    binding: Option<Vec<u8>>,
}

impl TryFrom<ChallengeRow> for Challenge {
    type Error = StoreError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        let purpose = Purpose::parse(&row.purpose).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown challenge purpose '{}'", row.purpose))
        })?;

        Ok(Challenge {
            identity_id: row.identity_id,
            value: row.value,
            purpose,
            issued_at: row.issued_at,
            binding: row.binding,
        })
    }
}

#[async_trait]
impl ChallengeStore for SqliteStore {
    async fn issue(&self, identity_id: &str, purpose: Purpose) -> StoreResult<IssuedChallenge> {
        let challenge = Challenge::generate(identity_id, purpose);

        // The first statement is a write, so the transaction holds the write
        // lock from the start and no other issue/consume can interleave.
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query_as::<_, ChallengeRow>(
            "DELETE FROM challenges WHERE identity_id = ?
             RETURNING identity_id, value, purpose, issued_at, binding",
        )
        .bind(identity_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO challenges (identity_id, value, purpose, issued_at, binding)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(&challenge.identity_id)
        .bind(&challenge.value)
        .bind(challenge.purpose.as_str())
        .bind(challenge.issued_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(IssuedChallenge {
            challenge,
            superseded: superseded.map(Challenge::try_from).transpose()?,
        })
    }

    async fn bind(&self, identity_id: &str, value: &[u8], binding: Vec<u8>) -> StoreResult<bool> {
        let updated =
            sqlx::query("UPDATE challenges SET binding = ? WHERE identity_id = ? AND value = ?")
                .bind(binding)
                .bind(identity_id)
                .bind(value)
                .execute(&self.pool)
                .await?
                .rows_affected();

        Ok(updated == 1)
    }

    async fn consume(
        &self,
        identity_id: &str,
        purpose: Purpose,
        value: &[u8],
    ) -> StoreResult<Option<Challenge>> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            "DELETE FROM challenges WHERE identity_id = ? AND purpose = ? AND value = ?
             RETURNING identity_id, value, purpose, issued_at, binding",
        )
        .bind(identity_id)
        .bind(purpose.as_str())
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Challenge::try_from).transpose()
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let purged = sqlx::query("DELETE FROM challenges WHERE issued_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(purged)
    }
}
