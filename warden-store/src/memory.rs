//! In-memory store implementation.
//!
//! Used for testing and development without a database file. Thread-safe
//! via `RwLock`; "durable" only for the lifetime of the process, which is
//! exactly what the crash-recovery tests need (they share one instance
//! across simulated restarts).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use warden_domain::{ManagedPosition, PositionId, PositionStatus};

use crate::error::StoreError;
use crate::repository::PositionStore;

/// In-memory position store.
#[derive(Default)]
pub struct MemoryStore {
    positions: RwLock<HashMap<PositionId, ManagedPosition>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.positions.read().unwrap().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.read().unwrap().is_empty()
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn upsert(&self, position: &ManagedPosition) -> Result<(), StoreError> {
        let mut positions = self.positions.write().unwrap();
        positions.insert(position.id, position.clone());
        Ok(())
    }

    async fn get(&self, id: PositionId) -> Result<Option<ManagedPosition>, StoreError> {
        let positions = self.positions.read().unwrap();
        Ok(positions.get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<PositionStatus>,
    ) -> Result<Vec<ManagedPosition>, StoreError> {
        let positions = self.positions.read().unwrap();
        let mut records: Vec<ManagedPosition> = positions
            .values()
            .filter(|p| status.map_or(true, |wanted| p.status == wanted))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
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
    async fn test_upsert_and_get() {
        let store = MemoryStore::new();
        let position = sample("SPY");
        let id = position.id;

        store.upsert(&position).await.unwrap();
        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.symbol.as_str(), "SPY");
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_id() {
        let store = MemoryStore::new();
        let mut position = sample("SPY");

        store.upsert(&position).await.unwrap();
        position.notes = "updated".to_string();
        store.upsert(&position).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(position.id).await.unwrap().unwrap().notes, "updated");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.get(uuid::Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let store = MemoryStore::new();

        let pending = sample("SPY");
        store.upsert(&pending).await.unwrap();

        let mut active = sample("QQQ");
        active.transition(PositionStatus::Active).unwrap();
        store.upsert(&active).await.unwrap();

        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let active_only = store.list(Some(PositionStatus::Active)).await.unwrap();
        assert_eq!(active_only.len(), 1);
        assert_eq!(active_only[0].symbol.as_str(), "QQQ");
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let store = MemoryStore::new();

        let mut older = sample("SPY");
        older.created_at = older.created_at - chrono::Duration::hours(1);
        store.upsert(&older).await.unwrap();

        let newer = sample("QQQ");
        store.upsert(&newer).await.unwrap();

        let all = store.list(None).await.unwrap();
        assert_eq!(all[0].symbol.as_str(), "QQQ");
        assert_eq!(all[1].symbol.as_str(), "SPY");
    }
}
