//! Lifecycle planner: turns an open-position request into a managed record
//! with a submitted entry order.
//!
//! The record is persisted before the entry order is submitted. That order
//! guarantees the engine can never lose a broker order it created: at worst
//! it holds a record with no order, which is harmless and gets flagged by
//! recovery.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use warden_broker::{BrokerError, BrokerPort, OrderRequest, TimeInForce};
use warden_domain::{
    risk, DomainError, EntryKind, ManagedPosition, OpenPositionRequest, PartialExit, Price,
    PositionStatus, Quantity, Side, Symbol,
};
use warden_store::PositionStore;

use crate::error::{DaemonError, DaemonResult};

/// Plans and opens managed positions.
pub struct Planner<B, S> {
    broker: Arc<B>,
    store: Arc<S>,
}

impl<B: BrokerPort, S: PositionStore> Planner<B, S> {
    /// Create a planner over the given ports.
    pub fn new(broker: Arc<B>, store: Arc<S>) -> Self {
        Self { broker, store }
    }

    /// Open a new managed position.
    ///
    /// Steps, in order: validate, discover the entry price, size the
    /// position, resolve absolute protective prices, persist the `Pending`
    /// record, submit the entry order, persist the order id.
    pub async fn open(&self, request: OpenPositionRequest) -> DaemonResult<ManagedPosition> {
        request.validate()?;

        let symbol = Symbol::new(&request.symbol)?;
        let side = request.side;

        info!(
            %symbol,
            %side,
            allocation = %request.allocation,
            "planning managed position"
        );

        // Price discovery: explicit limit price, otherwise the quote side
        // matching the direction.
        let entry_price = match (request.entry_strategy, request.entry_price) {
            (EntryKind::Limit, Some(price)) => Price::new(price)?,
            _ => {
                let quote = self.broker.latest_quote(&symbol).await?;
                Price::new(quote.entry_side(side)).map_err(|_| {
                    DomainError::InvalidRequest(format!("no usable quote for {symbol}"))
                })?
            }
        };

        let shares = risk::share_quantity(request.allocation, entry_price);
        if shares <= Decimal::ZERO {
            return Err(DaemonError::AllocationBelowPrice {
                allocation: request.allocation,
                price: entry_price.as_decimal(),
            });
        }
        let quantity = Quantity::new(shares)?;

        let stop_price = resolve_price(request.stop_price, request.stop_percent, |pct| {
            risk::stop_from_percent(entry_price, pct, side)
        })?;
        let take_profit_price =
            resolve_price(request.take_profit_price, request.take_profit_percent, |pct| {
                risk::take_from_percent(entry_price, pct, side)
            })?;

        check_bracket_ordering(side, stop_price, entry_price, take_profit_price)?;

        let mut position = ManagedPosition::new(
            symbol.clone(),
            side,
            quantity,
            request.allocation,
            entry_price,
            stop_price,
            take_profit_price,
        );
        position.strategy_tag = request.strategy_tag;
        position.entry_order_type = request.entry_strategy;
        position.stop_percent = request.stop_percent;
        position.take_profit_percent = request.take_profit_percent;
        position.trailing_enabled = request.trailing_enabled;
        position.trailing_percent = request.trailing_percent;
        position.notes = request.notes;
        position.tags = request.tags;

        if let Some(partial) = request.partial_exit {
            let trigger_price = Price::new(risk::partial_trigger_from_percent(
                entry_price,
                partial.trigger_percent,
                side,
            ))?;
            position.partial_exit = Some(PartialExit {
                fraction: partial.fraction,
                trigger_percent: Some(partial.trigger_percent),
                trigger_price,
                order_ids: Vec::new(),
                filled_order_ids: Vec::new(),
            });
        }

        // Persist first. If this fails, nothing was submitted and nothing
        // can be orphaned.
        self.store.upsert(&position).await?;

        let entry_order = match position.entry_order_type {
            EntryKind::Market => OrderRequest::market(
                symbol.clone(),
                side.entry_action(),
                quantity,
                TimeInForce::Gtc,
            ),
            EntryKind::Limit => OrderRequest::limit(
                symbol.clone(),
                side.entry_action(),
                quantity,
                TimeInForce::Gtc,
                entry_price,
            ),
        };

        match self.broker.place_order(&entry_order).await {
            Ok(ack) => {
                position.entry_order_id = Some(ack.order_id.clone());
                position.updated_at = chrono::Utc::now();
                self.store.upsert(&position).await?;

                let stop_pct = distance_pct(entry_price, stop_price);
                let take_pct = distance_pct(entry_price, take_profit_price);
                info!(
                    position_id = %position.id,
                    entry_order_id = %ack.order_id,
                    quantity = %quantity,
                    entry_price = %entry_price,
                    stop_price = %stop_price,
                    take_profit_price = %take_profit_price,
                    risk_reward_ratio = %(take_pct / stop_pct),
                    "managed position created"
                );
                Ok(position)
            }
            Err(BrokerError::Rejected { reason }) => {
                position.append_note(&format!("entry order rejected: {reason}"));
                position.transition(PositionStatus::Failed)?;
                self.store.upsert(&position).await?;
                Err(BrokerError::Rejected { reason }.into())
            }
            Err(transient) => {
                // The record stays Pending with no entry order id. The
                // supervisor has nothing to poll; recovery lists it for
                // operator attention.
                warn!(
                    position_id = %position.id,
                    error = %transient,
                    "entry submission failed transiently; record parked in Pending"
                );
                Err(transient.into())
            }
        }
    }
}

/// Pick the absolute price if given, otherwise derive it from the percent.
///
/// Request validation guarantees exactly one source is present.
fn resolve_price(
    absolute: Option<Decimal>,
    percent: Option<Decimal>,
    derive: impl Fn(Decimal) -> Decimal,
) -> Result<Price, DomainError> {
    match (absolute, percent) {
        (Some(price), _) => Price::new(price),
        (None, Some(pct)) => Price::new(derive(pct)).map_err(|_| {
            DomainError::InvalidRequest(format!("percentage {pct} resolves to a non-positive price"))
        }),
        (None, None) => Err(DomainError::InvalidRequest(
            "missing both absolute price and percentage".to_string(),
        )),
    }
}

/// Invariant 2: the bracket must be ordered in the profitable direction.
fn check_bracket_ordering(
    side: Side,
    stop: Price,
    entry: Price,
    take: Price,
) -> Result<(), DomainError> {
    let ordered = match side {
        Side::Long => stop < entry && entry < take,
        Side::Short => take < entry && entry < stop,
    };
    if !ordered {
        return Err(DomainError::InvalidRequest(format!(
            "bracket misordered for {side}: stop {stop}, entry {entry}, take {take}"
        )));
    }
    Ok(())
}

fn distance_pct(entry: Price, other: Price) -> Decimal {
    ((other.as_decimal() - entry.as_decimal()) / entry.as_decimal() * Decimal::ONE_HUNDRED).abs()
}

// =============================================================================
// Tests
// =============================================================================
