//! Scriptable broker stub.
//!
//! Unlike a real venue, orders here never fill on their own: they rest as
//! `Accepted` until the test script fills, rejects, or expires them. That
//! matches how the engine actually experiences a broker — it only ever
//! learns about fills by polling — and makes every reconciliation scenario
//! scriptable, including partial fills, out-of-band cancellations, and
//! transient transport failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use warden_domain::{Quantity, Symbol};

use crate::error::BrokerError;
use crate::ports::{
    BrokerPort, CancelOutcome, OrderAck, OrderRequest, OrderSnapshot, OrderStatus, Quote,
};

/// In-memory order as the stub venue sees it.
#[derive(Debug, Clone)]
struct SimOrder {
    request: OrderRequest,
    status: OrderStatus,
    filled_qty: Decimal,
    fill_avg_price: Option<Decimal>,
    submitted_at: chrono::DateTime<Utc>,
    filled_at: Option<chrono::DateTime<Utc>>,
    canceled_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<String, SimOrder>,
    order_sequence: Vec<String>,
    quotes: HashMap<String, (Decimal, Decimal)>,
    counter: u64,
    place_failures: VecDeque<BrokerError>,
    get_failures: VecDeque<BrokerError>,
    cancel_failures: VecDeque<BrokerError>,
    quote_failures: VecDeque<BrokerError>,
}

/// Scriptable stub implementation of [`BrokerPort`].
#[derive(Default)]
pub struct ScriptedBroker {
    inner: Mutex<Inner>,
}

impl ScriptedBroker {
    /// Create an empty stub venue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the quote for a symbol.
    pub fn set_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        let mut inner = self.inner.lock().unwrap();
        inner.quotes.insert(symbol.to_uppercase(), (bid, ask));
    }

    /// Fill an order completely at an explicit price.
    pub fn fill_at(&self, order_id: &str, price: Decimal) {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.orders.get_mut(order_id).expect("unknown stub order");
        order.status = OrderStatus::Filled;
        order.filled_qty = order.request.qty.as_decimal();
        order.fill_avg_price = Some(price);
        order.filled_at = Some(Utc::now());
    }

    /// Fill an order completely at its own resting price (limit or stop).
    pub fn fill(&self, order_id: &str) {
        let price = {
            let inner = self.inner.lock().unwrap();
            let order = inner.orders.get(order_id).expect("unknown stub order");
            order
                .request
                .limit_price
                .or(order.request.stop_price)
                .expect("order has no resting price, use fill_at")
                .as_decimal()
        };
        self.fill_at(order_id, price);
    }

    /// Report a partial fill, leaving the order working.
    pub fn fill_partial(&self, order_id: &str, qty: Decimal, price: Decimal) {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.orders.get_mut(order_id).expect("unknown stub order");
        order.status = OrderStatus::PartiallyFilled;
        order.filled_qty += qty;
        order.fill_avg_price = Some(price);
    }

    /// Mark an order rejected by the venue.
    pub fn reject(&self, order_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.orders.get_mut(order_id).expect("unknown stub order");
        order.status = OrderStatus::Rejected;
    }

    /// Expire an order (time-in-force lapsed).
    pub fn expire(&self, order_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.orders.get_mut(order_id).expect("unknown stub order");
        order.status = OrderStatus::Expired;
    }

    /// Cancel an order out-of-band, as if done from another terminal.
    pub fn cancel_out_of_band(&self, order_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.orders.get_mut(order_id).expect("unknown stub order");
        order.status = OrderStatus::Canceled;
        order.canceled_at = Some(Utc::now());
    }

    /// Queue a failure for the next `place_order` call.
    pub fn fail_next_place(&self, error: BrokerError) {
        self.inner.lock().unwrap().place_failures.push_back(error);
    }

    /// Queue a failure for the next `get_order` call.
    pub fn fail_next_get(&self, error: BrokerError) {
        self.inner.lock().unwrap().get_failures.push_back(error);
    }

    /// Queue a failure for the next `cancel_order` call.
    pub fn fail_next_cancel(&self, error: BrokerError) {
        self.inner.lock().unwrap().cancel_failures.push_back(error);
    }

    /// Queue a failure for the next `latest_quote` call.
    pub fn fail_next_quote(&self, error: BrokerError) {
        self.inner.lock().unwrap().quote_failures.push_back(error);
    }

    /// Snapshot of a single order, if the venue knows it.
    pub fn order(&self, order_id: &str) -> Option<OrderSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner.orders.get(order_id).map(|order| snapshot(order_id, order))
    }

    /// Snapshots of all non-terminal orders, oldest first.
    pub fn live_orders(&self) -> Vec<OrderSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner
            .order_sequence
            .iter()
            .filter_map(|id| inner.orders.get(id).map(|order| (id, order)))
            .filter(|(_, order)| !order.status.is_terminal())
            .map(|(id, order)| snapshot(id, order))
            .collect()
    }

    /// Total number of orders ever submitted.
    pub fn placed_count(&self) -> usize {
        self.inner.lock().unwrap().order_sequence.len()
    }

    /// Id of the most recently submitted order.
    pub fn last_order_id(&self) -> Option<String> {
        self.inner.lock().unwrap().order_sequence.last().cloned()
    }
}

fn snapshot(order_id: &str, order: &SimOrder) -> OrderSnapshot {
    OrderSnapshot {
        order_id: order_id.to_string(),
        status: order.status,
        filled_qty: Quantity::new(order.filled_qty).unwrap_or_else(|_| Quantity::zero()),
        fill_avg_price: order
            .fill_avg_price
            .and_then(|price| warden_domain::Price::new(price).ok()),
        submitted_at: order.submitted_at,
        filled_at: order.filled_at,
        canceled_at: order.canceled_at,
    }
}

#[async_trait]
impl BrokerPort for ScriptedBroker {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.place_failures.pop_front() {
            return Err(error);
        }

        inner.counter += 1;
        let order_id = format!("SIM-{}", inner.counter);

        inner.orders.insert(
            order_id.clone(),
            SimOrder {
                request: request.clone(),
                status: OrderStatus::Accepted,
                filled_qty: Decimal::ZERO,
                fill_avg_price: None,
                submitted_at: Utc::now(),
                filled_at: None,
                canceled_at: None,
            },
        );
        inner.order_sequence.push(order_id.clone());

        tracing::debug!(%order_id, symbol = %request.symbol, "stub: order accepted");
        Ok(OrderAck { order_id, status: OrderStatus::Accepted })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelOutcome, BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.cancel_failures.pop_front() {
            return Err(error);
        }

        match inner.orders.get_mut(order_id) {
            None => Ok(CancelOutcome::NotFound),
            Some(order) if order.status.is_terminal() => Ok(CancelOutcome::AlreadyTerminal),
            Some(order) => {
                order.status = OrderStatus::Canceled;
                order.canceled_at = Some(Utc::now());
                Ok(CancelOutcome::Cancelled)
            }
        }
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.get_failures.pop_front() {
            return Err(error);
        }

        inner
            .orders
            .get(order_id)
            .map(|order| snapshot(order_id, order))
            .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))
    }

    async fn latest_quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.quote_failures.pop_front() {
            return Err(error);
        }

        inner
            .quotes
            .get(symbol.as_str())
            .map(|(bid, ask)| Quote { bid: *bid, ask: *ask, ts: Utc::now() })
            .ok_or_else(|| BrokerError::Transient(format!("no quote for {symbol}")))
    }
}

// =============================================================================
// Tests
// =============================================================================
