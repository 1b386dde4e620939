//! SQLite store implementation.
//!
//! One row per managed position. The record itself is stored as a JSON
//! document in the `body` column; `id`, `status`, and `created_at` are
//! materialized as columns so lookups and status listings stay plain SQL.
//! The schema is created on connect, so a fresh store path just works.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;
use warden_domain::{ManagedPosition, PositionId, PositionStatus};

use crate::error::StoreError;
use crate::repository::PositionStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS positions (
    id         TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    body       TEXT NOT NULL
)";

const STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_positions_status ON positions (status)";

/// SQLite-backed position store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a store at the given file path.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path, "sqlite store ready");
        Ok(store)
    }

    /// Open an in-memory store; used by tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // A single connection keeps the in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query(STATUS_INDEX).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PositionStore for SqliteStore {
    async fn upsert(&self, position: &ManagedPosition) -> Result<(), StoreError> {
        let body = serde_json::to_string(position)?;

        sqlx::query(
            "INSERT INTO positions (id, status, created_at, body) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, body = excluded.body",
        )
        .bind(position.id.to_string())
        .bind(position.status.name())
        .bind(position.created_at.to_rfc3339())
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: PositionId) -> Result<Option<ManagedPosition>, StoreError> {
        let row = sqlx::query("SELECT body FROM positions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let body: String = row.get("body");
            serde_json::from_str(&body).map_err(StoreError::from)
        })
        .transpose()
    }

    async fn list(
        &self,
        status: Option<PositionStatus>,
    ) -> Result<Vec<ManagedPosition>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT body FROM positions WHERE status = ?1 ORDER BY created_at DESC",
                )
                .bind(status.name())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT body FROM positions ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                serde_json::from_str(&body).map_err(StoreError::from)
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use warden_domain::{Price, Quantity, Side, Symbol};

    fn sample(symbol: &str) -> ManagedPosition {
        ManagedPosition::new(
            Symbol::new(symbol).unwrap(),
            Side::Long,
            Quantity::new(dec!(10)).unwrap(),
            dec!(1000),
            Price::new(dec!(100)).unwrap(),
            Price::new(dec!(95)).unwrap(),
            Price::new(dec!(110)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut position = sample("SPY");
        position.tags = vec!["swing".to_string()];

        store.upsert(&position).await.unwrap();
        let loaded = store.get(position.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, position.id);
        assert_eq!(loaded.tags, position.tags);
        assert_eq!(loaded.stop_price, position.stop_price);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut position = sample("SPY");

        store.upsert(&position).await.unwrap();
        position.transition(PositionStatus::Active).unwrap();
        store.upsert(&position).await.unwrap();

        let loaded = store.get(position.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PositionStatus::Active);

        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let store = SqliteStore::in_memory().await.unwrap();

        let pending = sample("SPY");
        store.upsert(&pending).await.unwrap();

        let mut stopped = sample("QQQ");
        stopped.transition(PositionStatus::Active).unwrap();
        stopped.transition(PositionStatus::StoppedOut).unwrap();
        store.upsert(&stopped).await.unwrap();

        let stopped_only = store.list(Some(PositionStatus::StoppedOut)).await.unwrap();
        assert_eq!(stopped_only.len(), 1);
        assert_eq!(stopped_only[0].symbol.as_str(), "QQQ");

        assert_eq!(store.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.get(uuid::Uuid::now_v7()).await.unwrap().is_none());
    }
}
