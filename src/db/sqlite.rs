//! SQLite backend shared by the three store implementations.
//!
//! `identities.rs`, `challenges.rs` and `credentials.rs` each implement one
//! store trait on `SqliteStore`.

use super::StoreResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to `database_url` (WAL journal, 5s busy timeout) and runs migrations.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let store = Self::open(SqliteConnectOptions::from_str(database_url)?).await?;
        tracing::info!("Connected to SQLite database");
        Ok(store)
    }

    /// Opens a pool over `options` with the server's journal and busy settings.
    pub async fn open(options: SqliteConnectOptions) -> StoreResult<Self> {
        let options = options
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("Database migrations completed");
        Ok(())
    }

    /// Fresh in-memory database with the schema applied.
    ///
    /// A single connection is used: every `sqlite::memory:` connection would
    /// otherwise be its own empty database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }
}

/// File-backed database in a temporary directory, served by a
/// multi-connection pool so concurrent tasks really contend.
#[cfg(test)]
pub(crate) async fn file_backed() -> (SqliteStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let options = SqliteConnectOptions::new().filename(dir.path().join("ceremony.db"));
    let store = SqliteStore::open(options).await.unwrap();
    (store, dir)
}
