//! Shared harness for the integration suites: stub broker, in-memory
//! store, planner, and a supervisor with test cadence (every record due on
//! every pass).

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal_macros::dec;
use warden_broker::ScriptedBroker;
use warden_domain::{EntryKind, ManagedPosition, OpenPositionRequest, PositionId, Side};
use warden_store::{MemoryStore, PositionStore};
use wardend::{Config, Planner, Supervisor};

pub struct Harness {
    pub broker: Arc<ScriptedBroker>,
    pub store: Arc<MemoryStore>,
    pub planner: Planner<ScriptedBroker, MemoryStore>,
    pub supervisor: Arc<Supervisor<ScriptedBroker, MemoryStore>>,
}

impl Harness {
    pub fn new() -> Self {
        let config = Config::test();
        let broker = Arc::new(ScriptedBroker::new());
        let store = Arc::new(MemoryStore::new());
        let planner = Planner::new(Arc::clone(&broker), Arc::clone(&store));
        let supervisor =
            Arc::new(Supervisor::new(Arc::clone(&broker), Arc::clone(&store), config.supervisor));

        Self { broker, store, planner, supervisor }
    }

    /// Open a position and hand it to the supervisor, as the gateway does.
    pub async fn open(&self, request: OpenPositionRequest) -> ManagedPosition {
        let position = self.planner.open(request).await.expect("open failed");
        self.supervisor.adopt(position.clone()).await;
        position
    }

    /// Latest persisted state of a record.
    pub async fn record(&self, id: PositionId) -> ManagedPosition {
        self.store.get(id).await.expect("store read failed").expect("record missing")
    }

    /// A supervisor over the same store and broker, simulating a restart.
    pub fn restarted_supervisor(&self) -> Arc<Supervisor<ScriptedBroker, MemoryStore>> {
        Arc::new(Supervisor::new(
            Arc::clone(&self.broker),
            Arc::clone(&self.store),
            Config::test().supervisor,
        ))
    }
}

/// Long SPY, allocation 1000, market entry, stop 5%, take 10%.
pub fn long_percent_request() -> OpenPositionRequest {
    OpenPositionRequest {
        symbol: "SPY".to_string(),
        side: Side::Long,
        strategy_tag: "swing".to_string(),
        allocation: dec!(1000),
        entry_strategy: EntryKind::Market,
        entry_price: None,
        stop_price: None,
        stop_percent: Some(dec!(5)),
        take_profit_price: None,
        take_profit_percent: Some(dec!(10)),
        trailing_enabled: false,
        trailing_percent: None,
        partial_exit: None,
        notes: String::new(),
        tags: Vec::new(),
    }
}
