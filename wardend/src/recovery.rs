//! Startup recovery: rehydrate non-terminal records from the store.
//!
//! Recovery never resubmits broker orders on the basis of a record alone.
//! The supervisor's normal pass reconciles what the broker actually holds
//! through the stored order ids.

use tracing::{info, warn};
use warden_domain::{ManagedPosition, PositionStatus};
use warden_store::{PositionStore, StoreError};

/// Load every non-terminal record for the supervisor's working set.
///
/// `Pending` records without an entry order id are restored too (they stay
/// under management for listing and manual close), but flagged: the
/// planner's submission never went through, and only an operator can decide
/// what to do with them.
pub async fn restore_working_set<S: PositionStore>(
    store: &S,
) -> Result<Vec<ManagedPosition>, StoreError> {
    let all = store.list(None).await?;
    let mut restored = Vec::new();

    for record in all {
        if record.is_terminal() {
            continue;
        }

        if record.status == PositionStatus::Pending && record.entry_order_id.is_none() {
            warn!(
                position_id = %record.id,
                symbol = %record.symbol,
                created_at = %record.created_at,
                "pending record has no entry order id; needs operator attention"
            );
        }

        restored.push(record);
    }

    info!(count = restored.len(), "recovery loaded non-terminal records");
    Ok(restored)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use warden_domain::{Price, Quantity, Side, Symbol};
    use warden_store::MemoryStore;

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
    async fn test_restores_only_non_terminal() {
        let store = MemoryStore::new();

        let mut pending = sample("SPY");
        pending.entry_order_id = Some("SIM-1".to_string());
        store.upsert(&pending).await.unwrap();

        let mut active = sample("QQQ");
        active.entry_order_id = Some("SIM-2".to_string());
        active.apply_entry_fill(Price::new(dec!(100)).unwrap()).unwrap();
        store.upsert(&active).await.unwrap();

        let mut closed = sample("IWM");
        closed.apply_entry_fill(Price::new(dec!(100)).unwrap()).unwrap();
        closed.transition(PositionStatus::Closed).unwrap();
        store.upsert(&closed).await.unwrap();

        let restored = restore_working_set(&store).await.unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.iter().all(|r| !r.is_terminal()));
    }

    #[tokio::test]
    async fn test_orphaned_pending_still_restored() {
        let store = MemoryStore::new();
        let orphan = sample("SPY"); // no entry_order_id
        store.upsert(&orphan).await.unwrap();

        let restored = restore_working_set(&store).await.unwrap();
        assert_eq!(restored.len(), 1);
        assert!(restored[0].entry_order_id.is_none());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryStore::new();
        assert!(restore_working_set(&store).await.unwrap().is_empty());
    }
}
