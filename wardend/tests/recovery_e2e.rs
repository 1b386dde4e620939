//! Crash-and-recover scenarios: a fresh supervisor over the same store and
//! broker must evolve records exactly as the uninterrupted run would have.

mod common;

use common::{long_percent_request, Harness};
use rust_decimal_macros::dec;
use warden_broker::BrokerError;
use warden_domain::PositionStatus;
use warden_store::PositionStore;
use wardend::recovery::restore_working_set;

/// Crash mid-plan: the record was persisted in Pending with its entry
/// order id, but the process died before any poll. After restart the first
/// pass observes the fill and activates with protective orders, exactly
/// like the uninterrupted run.
#[tokio::test]
async fn test_crash_after_plan_resumes_management() {
    let h = Harness::new();
    h.broker.set_quote("SPY", dec!(99.9), dec!(100));

    // Planner persisted the record; the process dies before the supervisor
    // ever saw it (it is never adopted).
    let position = h.planner.open(long_percent_request()).await.unwrap();
    let entry_id = position.entry_order_id.clone().unwrap();

    // The broker filled the entry while the engine was down.
    h.broker.fill_at(&entry_id, dec!(100.00));

    // Restart: recovery seeds a fresh supervisor from the store.
    let supervisor = h.restarted_supervisor();
    let restored = restore_working_set(h.store.as_ref()).await.unwrap();
    assert_eq!(restored.len(), 1);
    supervisor.restore(restored).await;

    supervisor.pass().await;

    let record = h.record(position.id).await;
    assert_eq!(record.status, PositionStatus::Active);
    assert_eq!(record.entry_price.as_decimal(), dec!(100.00));
    assert!(record.stop_order_id.is_some());
    assert!(record.take_profit_order_id.is_some());

    // Entry + stop + take: no duplicated submissions from the restart.
    assert_eq!(h.broker.placed_count(), 3);
}

/// Crash mid-activation: the record went Active but the protective
/// placements were lost to a transient failure before the process died.
/// The restarted supervisor completes the bracket without duplicating
/// anything.
#[tokio::test]
async fn test_crash_mid_activation_completes_bracket() {
    let h = Harness::new();
    h.broker.set_quote("SPY", dec!(99.9), dec!(100));

    let position = h.open(long_percent_request()).await;
    h.broker.fill_at(&position.entry_order_id.clone().unwrap(), dec!(100.00));

    // The first protective placement fails; the pass abandons the record
    // with the bracket incomplete, then the process dies.
    h.broker.fail_next_place(BrokerError::Transient("link down".to_string()));
    h.supervisor.pass().await;

    let record = h.record(position.id).await;
    assert_eq!(record.status, PositionStatus::Active);
    assert!(record.stop_order_id.is_none());

    // Restart.
    let supervisor = h.restarted_supervisor();
    supervisor.restore(restore_working_set(h.store.as_ref()).await.unwrap()).await;
    supervisor.pass().await;

    let record = h.record(position.id).await;
    assert!(record.stop_order_id.is_some());
    assert!(record.take_profit_order_id.is_some());
    assert_eq!(h.broker.live_orders().len(), 2);
}

/// Terminal records stay out of the working set after restart.
#[tokio::test]
async fn test_restart_skips_terminal_records() {
    let h = Harness::new();
    h.broker.set_quote("SPY", dec!(99.9), dec!(100));

    let position = h.open(long_percent_request()).await;
    h.broker.fill_at(&position.entry_order_id.clone().unwrap(), dec!(100.00));
    h.supervisor.pass().await;

    let take_id = h.record(position.id).await.take_profit_order_id.clone().unwrap();
    h.broker.fill(&take_id);
    h.supervisor.pass().await;
    assert_eq!(h.record(position.id).await.status, PositionStatus::Closed);

    let supervisor = h.restarted_supervisor();
    supervisor.restore(restore_working_set(h.store.as_ref()).await.unwrap()).await;
    assert_eq!(supervisor.managed_count().await, 0);
}

/// A Pending record with no entry order id survives restarts untouched:
/// the supervisor has nothing to poll and places nothing.
#[tokio::test]
async fn test_orphaned_pending_left_alone() {
    let h = Harness::new();
    h.broker.set_quote("SPY", dec!(99.9), dec!(100));

    h.broker.fail_next_place(BrokerError::Transient("gateway timeout".to_string()));
    let error = h.planner.open(long_percent_request()).await;
    assert!(error.is_err());

    let supervisor = h.restarted_supervisor();
    let restored = restore_working_set(h.store.as_ref()).await.unwrap();
    assert_eq!(restored.len(), 1);
    supervisor.restore(restored).await;

    supervisor.pass().await;
    supervisor.pass().await;

    let records = h.store.list(Some(PositionStatus::Pending)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].entry_order_id.is_none());
    assert_eq!(h.broker.placed_count(), 0);
}

/// Killing the process between any two passes and recovering yields the
/// same terminal outcome as the uninterrupted run (crash-safety property,
/// exercised at the pass boundary after a stop fill).
#[tokio::test]
async fn test_recovery_after_stop_fill_matches_no_crash_run() {
    let h = Harness::new();
    h.broker.set_quote("SPY", dec!(99.9), dec!(100));

    let position = h.open(long_percent_request()).await;
    h.broker.fill_at(&position.entry_order_id.clone().unwrap(), dec!(100.00));
    h.supervisor.pass().await;

    let stop_id = h.record(position.id).await.stop_order_id.clone().unwrap();
    let take_id = h.record(position.id).await.take_profit_order_id.clone().unwrap();
    h.broker.fill(&stop_id);

    // Crash here: the fill is at the broker, nothing observed yet.
    let supervisor = h.restarted_supervisor();
    supervisor.restore(restore_working_set(h.store.as_ref()).await.unwrap()).await;
    supervisor.pass().await;

    let record = h.record(position.id).await;
    assert_eq!(record.status, PositionStatus::StoppedOut);
    assert_eq!(
        h.broker.order(&take_id).unwrap().status,
        warden_broker::OrderStatus::Canceled
    );
    assert_eq!(h.broker.placed_count(), 3);
}
