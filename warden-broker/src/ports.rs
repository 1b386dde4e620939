//! Broker port definitions.
//!
//! `BrokerPort` is the single seam between the engine and the venue.
//! Implementations must be injectable for tests; the engine ships with
//! `ScriptedBroker` and treats anything behind this trait as potentially
//! slow and potentially failing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use warden_domain::{OrderSide, Price, Quantity, Symbol};

use crate::error::BrokerError;

// =============================================================================
// Wire types
// =============================================================================

/// Order pricing kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Execute at the prevailing price
    Market,
    /// Execute at the limit price or better
    Limit,
    /// Becomes a market order once the stop price trades
    Stop,
}

/// How long an order rests at the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Expires at the end of the trading day
    Day,
    /// Good until cancelled
    Gtc,
}

/// Venue-reported order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Received, not yet acknowledged
    Pending,
    /// Acknowledged and working
    Accepted,
    /// Some quantity filled, remainder working
    PartiallyFilled,
    /// Completely filled
    Filled,
    /// Cancelled before completion
    Canceled,
    /// Refused by the venue
    Rejected,
    /// Lapsed by time-in-force
    Expired,
}

impl OrderStatus {
    /// Whether the venue will never change this status again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// A normalized order to submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Ticker to trade
    pub symbol: Symbol,
    /// Quantity to trade
    pub qty: Quantity,
    /// Buy or sell
    pub side: OrderSide,
    /// Pricing kind
    pub kind: OrderKind,
    /// Resting behavior
    pub time_in_force: TimeInForce,
    /// Limit price, required for limit orders
    pub limit_price: Option<Price>,
    /// Stop trigger price, required for stop orders
    pub stop_price: Option<Price>,
}

impl OrderRequest {
    /// A market order.
    pub fn market(symbol: Symbol, side: OrderSide, qty: Quantity, tif: TimeInForce) -> Self {
        Self {
            symbol,
            qty,
            side,
            kind: OrderKind::Market,
            time_in_force: tif,
            limit_price: None,
            stop_price: None,
        }
    }

    /// A limit order resting at `limit_price`.
    pub fn limit(
        symbol: Symbol,
        side: OrderSide,
        qty: Quantity,
        tif: TimeInForce,
        limit_price: Price,
    ) -> Self {
        Self {
            symbol,
            qty,
            side,
            kind: OrderKind::Limit,
            time_in_force: tif,
            limit_price: Some(limit_price),
            stop_price: None,
        }
    }

    /// A stop order triggering at `stop_price`.
    pub fn stop(
        symbol: Symbol,
        side: OrderSide,
        qty: Quantity,
        tif: TimeInForce,
        stop_price: Price,
    ) -> Self {
        Self {
            symbol,
            qty,
            side,
            kind: OrderKind::Stop,
            time_in_force: tif,
            limit_price: None,
            stop_price: Some(stop_price),
        }
    }
}

/// Acknowledgment returned by a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Venue-assigned order id
    pub order_id: String,
    /// Status at acknowledgment time
    pub status: OrderStatus,
}

/// Point-in-time view of an order at the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Venue-assigned order id
    pub order_id: String,
    /// Current status
    pub status: OrderStatus,
    /// Quantity filled so far
    pub filled_qty: Quantity,
    /// Average fill price, present once anything has filled
    pub fill_avg_price: Option<Price>,
    /// When the order was submitted
    pub submitted_at: DateTime<Utc>,
    /// When the order completed filling
    pub filled_at: Option<DateTime<Utc>>,
    /// When the order was cancelled
    pub canceled_at: Option<DateTime<Utc>>,
}

/// Outcome of a cancellation attempt.
///
/// All three variants count as success for the engine: the order is no
/// longer working either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The venue cancelled the order
    Cancelled,
    /// The venue does not know the order
    NotFound,
    /// The order had already reached a terminal status
    AlreadyTerminal,
}

/// Latest top-of-book quote for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Best bid
    pub bid: Decimal,
    /// Best ask
    pub ask: Decimal,
    /// Venue timestamp of the quote
    pub ts: DateTime<Utc>,
}

// =============================================================================
// Port
// =============================================================================

/// Capability set required of any venue implementation.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Submit an order.
    ///
    /// # Errors
    /// `BrokerError::Rejected` for permanent refusals,
    /// `BrokerError::Transient` when a retry may succeed.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError>;

    /// Cancel an order.
    ///
    /// `NotFound` and `AlreadyTerminal` outcomes are returned in the `Ok`
    /// channel; only transport failures are errors.
    async fn cancel_order(&self, order_id: &str) -> Result<CancelOutcome, BrokerError>;

    /// Fetch the venue's current view of an order.
    ///
    /// # Errors
    /// `BrokerError::NotFound` when the venue does not know the id.
    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, BrokerError>;

    /// Fetch the latest quote for a symbol.
    async fn latest_quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError>;
}

impl Quote {
    /// Quote side used to price an entry for the given direction.
    ///
    /// Prefers the ask for longs and the bid for shorts, falling back to
    /// the other side when the preferred one is zero.
    pub fn entry_side(&self, side: warden_domain::Side) -> Decimal {
        match side {
            warden_domain::Side::Long => {
                if self.ask > Decimal::ZERO {
                    self.ask
                } else {
                    self.bid
                }
            }
            warden_domain::Side::Short => {
                if self.bid > Decimal::ZERO {
                    self.bid
                } else {
                    self.ask
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
