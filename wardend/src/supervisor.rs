//! Supervisor: timer-driven reconciliation over the working set.
//!
//! One driver runs a reconciliation pass at a fixed cadence. Within a pass,
//! each non-terminal record is reconciled under its own lock: the entry
//! order is polled while `Pending`; stop, take-profit, and partial-exit
//! orders are polled (in that fixed order, which decides simultaneous-fill
//! races) while `Active`/`Partial`; missing protective orders are
//! re-placed; the mark is refreshed; and the trailing stop is ratcheted.
//!
//! The broker is the source of truth for fills. Every broker call is
//! wrapped in a per-call timeout and a failed call abandons the record for
//! this pass without persisting any half-applied transition: the store is
//! only written after the broker acknowledged the step being recorded.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_broker::{
    BrokerError, BrokerPort, CancelOutcome, OrderAck, OrderRequest, OrderSnapshot, OrderStatus,
    Quote, TimeInForce,
};
use warden_domain::{
    risk, ManagedPosition, PositionId, PositionStatus, Price, Quantity, Symbol,
};
use warden_store::PositionStore;

use crate::config::SupervisorConfig;
use crate::error::{DaemonError, DaemonResult};

/// A record under management plus its poll bookkeeping.
struct Slot {
    record: ManagedPosition,
    polled_at: Option<Instant>,
}

/// Timer-driven reconciliation engine.
///
/// Exclusively owns mutation of managed-position records: the gateway only
/// reads store snapshots.
pub struct Supervisor<B, S> {
    broker: Arc<B>,
    store: Arc<S>,
    config: SupervisorConfig,
    working: RwLock<HashMap<PositionId, Arc<Mutex<Slot>>>>,
}

impl<B: BrokerPort + 'static, S: PositionStore + 'static> Supervisor<B, S> {
    /// Create a supervisor over the given ports.
    pub fn new(broker: Arc<B>, store: Arc<S>, config: SupervisorConfig) -> Self {
        Self { broker, store, config, working: RwLock::new(HashMap::new()) }
    }

    /// Put a record under management. Terminal records are ignored.
    pub async fn adopt(&self, record: ManagedPosition) {
        if record.is_terminal() {
            return;
        }
        let mut working = self.working.write().await;
        working.insert(record.id, Arc::new(Mutex::new(Slot { record, polled_at: None })));
    }

    /// Seed the working set from recovered records.
    pub async fn restore(&self, records: Vec<ManagedPosition>) {
        let count = records.len();
        for record in records {
            self.adopt(record).await;
        }
        if count > 0 {
            info!(count, "restored positions into the working set");
        }
    }

    /// Number of records currently under management.
    pub async fn managed_count(&self) -> usize {
        self.working.read().await.len()
    }

    /// Run reconciliation passes until `shutdown` is cancelled.
    ///
    /// The current pass always completes before the loop exits, so no
    /// record is abandoned mid-transition by an orderly shutdown.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let cadence = self.config.cadence().max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(cadence);

        info!(cadence_secs = cadence.as_secs(), "supervisor started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("supervisor received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.pass().await;
                }
            }
        }

        info!("supervisor stopped");
    }

    /// One reconciliation pass over the working set.
    pub async fn pass(&self) {
        let slots: Vec<(PositionId, Arc<Mutex<Slot>>)> = {
            let working = self.working.read().await;
            working.iter().map(|(id, slot)| (*id, Arc::clone(slot))).collect()
        };

        let mut finished = Vec::new();

        for (position_id, slot) in slots {
            let mut slot = slot.lock().await;

            if slot.record.is_terminal() {
                finished.push(position_id);
                continue;
            }
            if !self.due(position_id, &slot) {
                continue;
            }

            slot.polled_at = Some(Instant::now());
            if let Err(e) = self.reconcile(&mut slot.record).await {
                warn!(%position_id, error = %e, "reconciliation failed; will retry next pass");
            }
            if slot.record.is_terminal() {
                finished.push(position_id);
            }
        }

        if !finished.is_empty() {
            let mut working = self.working.write().await;
            for position_id in finished {
                working.remove(&position_id);
                debug!(%position_id, "terminal record left the working set");
            }
        }
    }

    /// Per-pass rate cap: a record is polled only when its last poll is at
    /// least one cadence ago, less a small deterministic per-id jitter.
    fn due(&self, position_id: PositionId, slot: &Slot) -> bool {
        let Some(polled_at) = slot.polled_at else {
            return true;
        };

        let mut hasher = DefaultHasher::new();
        position_id.hash(&mut hasher);
        let jitter = Duration::from_millis(hasher.finish() % 1000);

        polled_at.elapsed() >= self.config.cadence().saturating_sub(jitter)
    }

    async fn reconcile(&self, record: &mut ManagedPosition) -> DaemonResult<()> {
        match record.status {
            PositionStatus::Pending => self.reconcile_pending(record).await,
            PositionStatus::Active | PositionStatus::Partial => self.reconcile_open(record).await,
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Pending
    // =========================================================================

    async fn reconcile_pending(&self, record: &mut ManagedPosition) -> DaemonResult<()> {
        let Some(entry_order_id) = record.entry_order_id.clone() else {
            // Planner never got an order submitted; recovery reports these.
            return Ok(());
        };

        let snapshot = match self.get_order(&entry_order_id).await {
            Ok(snapshot) => snapshot,
            Err(BrokerError::NotFound(_)) => {
                warn!(
                    position_id = %record.id,
                    %entry_order_id,
                    "broker no longer knows the entry order"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match snapshot.status {
            OrderStatus::Filled => {
                let fill = snapshot.fill_avg_price.unwrap_or(record.entry_price);

                let mut next = record.clone();
                if let Err(e) = next.apply_entry_fill(fill) {
                    return self.fail_record(record, &e.to_string()).await;
                }
                self.commit(record, next).await?;

                info!(
                    position_id = %record.id,
                    symbol = %record.symbol,
                    fill_price = %fill,
                    "entry filled, position active"
                );

                self.ensure_protective_orders(record).await
            }
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired => {
                let mut next = record.clone();
                next.append_note(&format!(
                    "entry order {entry_order_id} ended {:?} before fill",
                    snapshot.status
                ));
                next.transition(PositionStatus::Failed)?;
                self.commit(record, next).await?;

                info!(position_id = %record.id, status = ?snapshot.status, "entry never filled, position failed");
                Ok(())
            }
            OrderStatus::PartiallyFilled => {
                // A partial entry is not entry completion: protective orders
                // are only sized from a definite quantity.
                debug!(position_id = %record.id, "entry partially filled, waiting for completion");
                Ok(())
            }
            OrderStatus::Pending | OrderStatus::Accepted => Ok(()),
        }
    }

    // =========================================================================
    // Active / Partial
    // =========================================================================

    async fn reconcile_open(&self, record: &mut ManagedPosition) -> DaemonResult<()> {
        // Stop before take: on a simultaneous fill the first observed order
        // decides the terminal status, and the loser's cancel comes back
        // AlreadyTerminal.
        if let Some(stop_order_id) = record.stop_order_id.clone() {
            match self.poll_protective(record, &stop_order_id, "stop").await? {
                ProtectivePoll::Filled(snapshot) => {
                    return self
                        .finish_exit(record, PositionStatus::StoppedOut, &snapshot, "stop filled")
                        .await;
                }
                ProtectivePoll::Retired => {
                    let mut next = record.clone();
                    next.stop_order_id = None;
                    self.commit(record, next).await?;
                }
                ProtectivePoll::Working => {}
            }
        }

        if let Some(take_order_id) = record.take_profit_order_id.clone() {
            match self.poll_protective(record, &take_order_id, "take-profit").await? {
                ProtectivePoll::Filled(snapshot) => {
                    return self
                        .finish_exit(record, PositionStatus::Closed, &snapshot, "take-profit filled")
                        .await;
                }
                ProtectivePoll::Retired => {
                    let mut next = record.clone();
                    next.take_profit_order_id = None;
                    self.commit(record, next).await?;
                }
                ProtectivePoll::Working => {}
            }
        }

        self.poll_partial_exits(record).await?;
        self.ensure_protective_orders(record).await?;
        self.refresh_mark(record).await
    }

    /// Poll one protective order and classify the result.
    async fn poll_protective(
        &self,
        record: &ManagedPosition,
        order_id: &str,
        label: &str,
    ) -> DaemonResult<ProtectivePoll> {
        let snapshot = match self.get_order(order_id).await {
            Ok(snapshot) => snapshot,
            Err(BrokerError::NotFound(_)) => {
                warn!(position_id = %record.id, order_id, label, "broker no longer knows the order; re-placing");
                return Ok(ProtectivePoll::Retired);
            }
            Err(e) => return Err(e.into()),
        };

        match snapshot.status {
            OrderStatus::Filled => Ok(ProtectivePoll::Filled(snapshot)),
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired => {
                warn!(
                    position_id = %record.id,
                    order_id,
                    label,
                    status = ?snapshot.status,
                    "protective order retired out-of-band; re-placing"
                );
                Ok(ProtectivePoll::Retired)
            }
            _ => Ok(ProtectivePoll::Working),
        }
    }

    /// Poll partial-exit orders and apply any fresh fills.
    async fn poll_partial_exits(&self, record: &mut ManagedPosition) -> DaemonResult<()> {
        let Some(partial) = record.partial_exit.clone() else {
            return Ok(());
        };

        for order_id in partial.order_ids {
            let snapshot = match self.get_order(&order_id).await {
                Ok(snapshot) => snapshot,
                Err(BrokerError::NotFound(_)) => {
                    warn!(position_id = %record.id, %order_id, "broker no longer knows partial-exit order");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if snapshot.status != OrderStatus::Filled {
                continue;
            }

            // The resize below re-places stop and take at the new remaining
            // quantity; cancel the stale ones first so the replacement
            // cannot race a second live copy.
            if let Some(stop_order_id) = record.stop_order_id.clone() {
                self.cancel_best_effort(&stop_order_id, "stop").await;
            }
            if let Some(take_order_id) = record.take_profit_order_id.clone() {
                self.cancel_best_effort(&take_order_id, "take-profit").await;
            }

            let mut next = record.clone();
            if let Err(e) = next.apply_partial_fill(snapshot.filled_qty) {
                return self.fail_record(record, &e.to_string()).await;
            }
            if let Some(plan) = next.partial_exit.as_mut() {
                plan.order_ids.retain(|id| id != &order_id);
                plan.filled_order_ids.push(order_id.clone());
            }
            next.stop_order_id = None;
            next.take_profit_order_id = None;
            self.commit(record, next).await?;

            info!(
                position_id = %record.id,
                %order_id,
                filled_qty = %snapshot.filled_qty,
                remaining_qty = %record.remaining_quantity,
                "partial exit filled; protective orders resized"
            );
        }

        Ok(())
    }

    /// Place whatever protective orders are missing, sized to the remaining
    /// quantity. Persist after each broker acknowledgment, so a transient
    /// failure only loses the not-yet-placed tail and retries next pass.
    async fn ensure_protective_orders(&self, record: &mut ManagedPosition) -> DaemonResult<()> {
        if record.stop_order_id.is_none() {
            let request = OrderRequest::stop(
                record.symbol.clone(),
                record.side.exit_action(),
                record.remaining_quantity,
                TimeInForce::Gtc,
                record.stop_price,
            );
            let ack = self.place_order(&request).await?;
            info!(
                position_id = %record.id,
                order_id = %ack.order_id,
                stop_price = %record.stop_price,
                qty = %record.remaining_quantity,
                "stop order placed"
            );

            let mut next = record.clone();
            next.stop_order_id = Some(ack.order_id);
            self.commit(record, next).await?;
        }

        if record.take_profit_order_id.is_none() {
            let request = OrderRequest::limit(
                record.symbol.clone(),
                record.side.exit_action(),
                record.remaining_quantity,
                TimeInForce::Gtc,
                record.take_profit_price,
            );
            let ack = self.place_order(&request).await?;
            info!(
                position_id = %record.id,
                order_id = %ack.order_id,
                limit_price = %record.take_profit_price,
                qty = %record.remaining_quantity,
                "take-profit order placed"
            );

            let mut next = record.clone();
            next.take_profit_order_id = Some(ack.order_id);
            self.commit(record, next).await?;
        }

        let untouched_plan = record.partial_exit.clone().filter(|plan| {
            record.status == PositionStatus::Active
                && plan.order_ids.is_empty()
                && plan.filled_order_ids.is_empty()
        });

        if let Some(plan) = untouched_plan {
            let tranche = (record.quantity.as_decimal() * plan.fraction).floor();
            let Ok(qty) = Quantity::new(tranche) else {
                return Ok(());
            };
            if qty.is_zero() {
                debug!(position_id = %record.id, "partial-exit tranche floors to zero; skipping");
                return Ok(());
            }

            let request = OrderRequest::limit(
                record.symbol.clone(),
                record.side.exit_action(),
                qty,
                TimeInForce::Gtc,
                plan.trigger_price,
            );
            let ack = self.place_order(&request).await?;
            info!(
                position_id = %record.id,
                order_id = %ack.order_id,
                limit_price = %plan.trigger_price,
                qty = %qty,
                "partial-exit order placed"
            );

            let mut next = record.clone();
            if let Some(plan) = next.partial_exit.as_mut() {
                plan.order_ids.push(ack.order_id);
            }
            self.commit(record, next).await?;
        }

        Ok(())
    }

    /// Refresh the mark and, when enabled, ratchet the trailing stop.
    async fn refresh_mark(&self, record: &mut ManagedPosition) -> DaemonResult<()> {
        let quote = self.latest_quote(&record.symbol).await?;
        let Ok(mark) = Price::new(quote.entry_side(record.side)) else {
            warn!(position_id = %record.id, symbol = %record.symbol, "quote has no usable price");
            return Ok(());
        };

        let mut next = record.clone();
        next.set_mark(mark);
        self.commit(record, next).await?;

        let (true, Some(pct)) = (record.trailing_enabled, record.trailing_percent) else {
            return Ok(());
        };
        let Some(candidate) = risk::trailing_stop_new(mark, pct, record.side, record.stop_price)
        else {
            return Ok(());
        };
        let new_stop = Price::new(candidate)?;

        // Adoption is cancel-then-replace. If the replace fails after the
        // cancel went through, the next pass observes the cancelled stop,
        // clears it, and re-places; the ratchet then re-adopts.
        if let Some(stop_order_id) = record.stop_order_id.clone() {
            self.cancel_order(&stop_order_id).await?;
        }
        let request = OrderRequest::stop(
            record.symbol.clone(),
            record.side.exit_action(),
            record.remaining_quantity,
            TimeInForce::Gtc,
            new_stop,
        );
        let ack = self.place_order(&request).await?;

        let previous_stop = record.stop_price;
        let mut next = record.clone();
        next.stop_price = new_stop;
        next.stop_order_id = Some(ack.order_id);
        self.commit(record, next).await?;

        info!(
            position_id = %record.id,
            previous_stop = %previous_stop,
            new_stop = %new_stop,
            mark = %mark,
            "trailing stop ratcheted"
        );
        Ok(())
    }

    /// Drive a record to a terminal exit status after a protective fill.
    async fn finish_exit(
        &self,
        record: &mut ManagedPosition,
        terminal: PositionStatus,
        fill: &OrderSnapshot,
        why: &str,
    ) -> DaemonResult<()> {
        // Best-effort retirement of the sibling orders; AlreadyTerminal and
        // NotFound both count as retired.
        let siblings = self.sibling_orders(record, terminal);
        for (order_id, label) in siblings {
            self.cancel_best_effort(&order_id, label).await;
        }

        let mut next = record.clone();
        if let Some(fill_price) = fill.fill_avg_price {
            next.set_mark(fill_price);
        }
        next.transition(terminal)?;
        self.commit(record, next).await?;

        info!(
            position_id = %record.id,
            symbol = %record.symbol,
            status = %terminal,
            fill_price = ?fill.fill_avg_price,
            why,
            "position exited"
        );
        Ok(())
    }

    /// Orders that must be retired when `terminal` is reached via a fill.
    fn sibling_orders(
        &self,
        record: &ManagedPosition,
        terminal: PositionStatus,
    ) -> Vec<(String, &'static str)> {
        let mut orders = Vec::new();
        if terminal != PositionStatus::StoppedOut {
            if let Some(id) = record.stop_order_id.clone() {
                orders.push((id, "stop"));
            }
        }
        if terminal != PositionStatus::Closed {
            if let Some(id) = record.take_profit_order_id.clone() {
                orders.push((id, "take-profit"));
            }
        }
        if let Some(plan) = &record.partial_exit {
            for id in &plan.order_ids {
                orders.push((id.clone(), "partial-exit"));
            }
        }
        orders
    }

    /// Fail a record after an internal invariant violation. Live protective
    /// orders are retired best-effort first so nothing keeps working at the
    /// broker for a record the engine has abandoned.
    async fn fail_record(&self, record: &mut ManagedPosition, diagnostic: &str) -> DaemonResult<()> {
        error!(position_id = %record.id, diagnostic, "failing record");

        if let Some(id) = record.stop_order_id.clone() {
            self.cancel_best_effort(&id, "stop").await;
        }
        if let Some(id) = record.take_profit_order_id.clone() {
            self.cancel_best_effort(&id, "take-profit").await;
        }
        if let Some(plan) = record.partial_exit.clone() {
            for id in plan.order_ids {
                self.cancel_best_effort(&id, "partial-exit").await;
            }
        }

        let mut next = record.clone();
        next.append_note(diagnostic);
        next.transition(PositionStatus::Failed)?;
        self.commit(record, next).await
    }

    // =========================================================================
    // Manual close
    // =========================================================================

    /// Manually close a position: best-effort cancel of every engine order,
    /// a market exit for any remaining exposure, then `Closed`.
    ///
    /// Cancellation and exit-submission failures are logged (and noted on
    /// the record) but never block the terminal transition.
    pub async fn close(&self, position_id: PositionId) -> DaemonResult<()> {
        let slot = {
            let working = self.working.read().await;
            working.get(&position_id).cloned()
        };

        match slot {
            Some(slot) => {
                let mut slot = slot.lock().await;
                self.close_record(&mut slot.record).await
            }
            None => {
                // Not under management: either already terminal, or a
                // Pending record the planner could not submit.
                let mut record = self
                    .store
                    .get(position_id)
                    .await?
                    .ok_or(DaemonError::PositionNotFound(position_id))?;
                if record.is_terminal() {
                    return Ok(());
                }
                self.close_record(&mut record).await
            }
        }
    }

    async fn close_record(&self, record: &mut ManagedPosition) -> DaemonResult<()> {
        if record.is_terminal() {
            return Ok(());
        }

        if record.status == PositionStatus::Pending {
            if let Some(id) = record.entry_order_id.clone() {
                self.cancel_best_effort(&id, "entry").await;
            }
        }
        if let Some(id) = record.stop_order_id.clone() {
            self.cancel_best_effort(&id, "stop").await;
        }
        if let Some(id) = record.take_profit_order_id.clone() {
            self.cancel_best_effort(&id, "take-profit").await;
        }
        if let Some(plan) = record.partial_exit.clone() {
            for id in plan.order_ids {
                self.cancel_best_effort(&id, "partial-exit").await;
            }
        }

        let mut next = record.clone();

        let open_exposure = matches!(
            record.status,
            PositionStatus::Active | PositionStatus::Partial
        ) && !record.remaining_quantity.is_zero();

        if open_exposure {
            let request = OrderRequest::market(
                record.symbol.clone(),
                record.side.exit_action(),
                record.remaining_quantity,
                TimeInForce::Day,
            );
            match self.place_order(&request).await {
                Ok(ack) => {
                    info!(
                        position_id = %record.id,
                        order_id = %ack.order_id,
                        qty = %record.remaining_quantity,
                        "market exit submitted for manual close"
                    );
                }
                Err(e) => {
                    // The record still closes; the broker may report
                    // residual exposure until the operator intervenes.
                    error!(position_id = %record.id, error = %e, "manual-close exit order failed");
                    next.append_note(&format!("manual-close exit order failed: {e}"));
                }
            }
        } else if record.status == PositionStatus::Pending {
            info!(position_id = %record.id, "closed pending position, entry never filled");
        }

        next.append_note("manually closed");
        next.transition(PositionStatus::Closed)?;
        self.commit(record, next).await?;

        info!(position_id = %record.id, "position manually closed");
        Ok(())
    }

    // =========================================================================
    // Port wrappers
    // =========================================================================

    async fn commit(
        &self,
        record: &mut ManagedPosition,
        next: ManagedPosition,
    ) -> DaemonResult<()> {
        match tokio::time::timeout(self.config.store_timeout(), self.store.upsert(&next)).await {
            Ok(Ok(())) => {
                *record = next;
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(warden_store::StoreError::Connection(
                "upsert timed out".to_string(),
            )
            .into()),
        }
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError> {
        match tokio::time::timeout(self.config.broker_timeout(), self.broker.place_order(request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Transient("place_order timed out".to_string())),
        }
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, BrokerError> {
        match tokio::time::timeout(self.config.broker_timeout(), self.broker.get_order(order_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Transient(format!("get_order {order_id} timed out"))),
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelOutcome, BrokerError> {
        match tokio::time::timeout(
            self.config.broker_timeout(),
            self.broker.cancel_order(order_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Transient(format!("cancel_order {order_id} timed out"))),
        }
    }

    async fn latest_quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        match tokio::time::timeout(self.config.broker_timeout(), self.broker.latest_quote(symbol))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Transient(format!("latest_quote {symbol} timed out"))),
        }
    }

    async fn cancel_best_effort(&self, order_id: &str, label: &str) {
        match self.cancel_order(order_id).await {
            Ok(outcome) => {
                debug!(order_id, label, ?outcome, "order retired");
            }
            Err(e) => {
                // The next pass observes whatever the broker actually holds.
                warn!(order_id, label, error = %e, "best-effort cancel failed");
            }
        }
    }
}

/// Result of polling one protective order.
enum ProtectivePoll {
    /// Order filled; the position exits
    Filled(OrderSnapshot),
    /// Order ended without filling (cancelled out-of-band, rejected,
    /// expired, or unknown); it must be re-placed
    Retired,
    /// Order still working
    Working,
}
