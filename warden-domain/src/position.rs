//! The managed-position entity and its status machine.
//!
//! A `ManagedPosition` is the single core record of the engine: the planned
//! bracket, the broker order ids it owns, and its lifecycle status. The
//! supervisor is the only writer once the record is under management; this
//! module gives it transition and mutation helpers that keep the record's
//! invariants intact.

use crate::risk;
use crate::value_objects::{DomainError, Price, Quantity, Side, Symbol};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a managed position.
///
/// UUIDv7 ids are monotonic with respect to creation time.
pub type PositionId = Uuid;

// =============================================================================
// Status machine
// =============================================================================

/// Lifecycle status of a managed position.
///
/// Statuses move along a DAG and terminal statuses are sinks:
///
/// ```text
/// Pending ──► Active ──► Partial ──► Closed | StoppedOut
///    │           │          │  ▲──┘ (repeat partial fills)
///    │           └──► Closed | StoppedOut
///    └──► Failed | Closed (manual close before fill)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    /// Entry order submitted (or about to be), not yet filled
    Pending,
    /// Entry filled; protective orders live at full size
    Active,
    /// One or more partial exits filled; protective orders resized
    Partial,
    /// Exited via take-profit or manual close
    Closed,
    /// Exited via stop-loss
    StoppedOut,
    /// Entry rejected/cancelled before fill, or record invariant violated
    Failed,
}

impl PositionStatus {
    /// Wire name of the status.
    pub fn name(&self) -> &'static str {
        match self {
            PositionStatus::Pending => "PENDING",
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Partial => "PARTIAL",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::StoppedOut => "STOPPED_OUT",
            PositionStatus::Failed => "FAILED",
        }
    }

    /// Whether this status has no outbound transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionStatus::Closed | PositionStatus::StoppedOut | PositionStatus::Failed
        )
    }

    /// Whether the lifecycle DAG permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        match (self, next) {
            (Pending, Active) | (Pending, Failed) | (Pending, Closed) => true,
            (Active, Partial) | (Active, Closed) | (Active, StoppedOut) | (Active, Failed) => true,
            (Partial, Partial)
            | (Partial, Closed)
            | (Partial, StoppedOut)
            | (Partial, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PositionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(PositionStatus::Pending),
            "ACTIVE" => Ok(PositionStatus::Active),
            "PARTIAL" => Ok(PositionStatus::Partial),
            "CLOSED" => Ok(PositionStatus::Closed),
            "STOPPED_OUT" => Ok(PositionStatus::StoppedOut),
            "FAILED" => Ok(PositionStatus::Failed),
            other => Err(DomainError::InvalidRequest(format!("unknown status: {other}"))),
        }
    }
}

// =============================================================================
// Entry kind
// =============================================================================

/// How the entry order is priced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Market entry at the prevailing price
    #[default]
    Market,
    /// Limit entry at an explicit price
    Limit,
}

// =============================================================================
// Partial exit
// =============================================================================

/// Partial profit-taking plan attached to a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialExit {
    /// Fraction of the planned quantity to exit, in (0, 1)
    pub fraction: Decimal,
    /// Gain percentage that triggers the exit; `Some` iff the trigger was
    /// requested as a percentage and must re-bind to the actual fill
    pub trigger_percent: Option<Decimal>,
    /// Resolved trigger price
    pub trigger_price: Price,
    /// Broker order ids still working for this plan, oldest first
    #[serde(default)]
    pub order_ids: Vec<String>,
    /// Order ids whose fills have already been applied to the remaining
    /// quantity; kept so a re-observed fill is not applied twice
    #[serde(default)]
    pub filled_order_ids: Vec<String>,
}

// =============================================================================
// Managed position
// =============================================================================

/// A brokerage position under automated lifecycle management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedPosition {
    /// Engine-assigned id, monotonic with creation time
    pub id: PositionId,
    /// Ticker under management
    pub symbol: Symbol,
    /// Position direction
    pub side: Side,
    /// Opaque strategy label supplied by the caller
    #[serde(default)]
    pub strategy_tag: String,

    /// Total size as planned at entry
    pub quantity: Quantity,
    /// Size still exposed; decreases on partial fills, zero at terminal
    pub remaining_quantity: Quantity,
    /// Currency amount the sizing was derived from
    pub allocation: Decimal,

    /// Broker id of the entry order, absent until submission succeeds
    pub entry_order_id: Option<String>,
    /// Market or limit entry
    pub entry_order_type: EntryKind,
    /// Planned entry price; replaced by the broker fill average on fill
    pub entry_price: Price,

    /// Current stop price
    pub stop_price: Price,
    /// `Some` iff the stop was requested as a percentage of entry
    pub stop_percent: Option<Decimal>,
    /// Broker id of the live stop order
    pub stop_order_id: Option<String>,

    /// Whether the stop trails the mark
    pub trailing_enabled: bool,
    /// Trail distance as a percentage of the mark
    pub trailing_percent: Option<Decimal>,

    /// Current take-profit price
    pub take_profit_price: Price,
    /// `Some` iff the take-profit was requested as a percentage of entry
    pub take_profit_percent: Option<Decimal>,
    /// Broker id of the live take-profit order
    pub take_profit_order_id: Option<String>,

    /// Optional partial-exit plan
    pub partial_exit: Option<PartialExit>,

    /// Lifecycle status
    pub status: PositionStatus,
    /// Latest observed mark; advisory only
    pub current_price: Option<Price>,
    /// Unrealized profit/loss at the latest mark
    pub unrealized_pl: Decimal,
    /// Unrealized profit/loss as a percentage of entry
    pub unrealized_pl_pct: Decimal,

    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated
    pub updated_at: DateTime<Utc>,
    /// When the record reached a terminal status
    pub closed_at: Option<DateTime<Utc>>,

    /// Free-form operator notes; failure diagnostics are appended here
    #[serde(default)]
    pub notes: String,
    /// Free-form labels
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ManagedPosition {
    /// Create a new record in `Pending` with the resolved bracket prices.
    ///
    /// Optional attributes (percent sources, trailing, partial exit, notes,
    /// tags) default to empty and are set by the planner afterwards.
    pub fn new(
        symbol: Symbol,
        side: Side,
        quantity: Quantity,
        allocation: Decimal,
        entry_price: Price,
        stop_price: Price,
        take_profit_price: Price,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            symbol,
            side,
            strategy_tag: String::new(),
            quantity,
            remaining_quantity: quantity,
            allocation,
            entry_order_id: None,
            entry_order_type: EntryKind::Market,
            entry_price,
            stop_price,
            stop_percent: None,
            stop_order_id: None,
            trailing_enabled: false,
            trailing_percent: None,
            take_profit_price,
            take_profit_percent: None,
            take_profit_order_id: None,
            partial_exit: None,
            status: PositionStatus::Pending,
            current_price: None,
            unrealized_pl: Decimal::ZERO,
            unrealized_pl_pct: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            closed_at: None,
            notes: String::new(),
            tags: Vec::new(),
        }
    }

    /// Whether the record is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the record to `next`, enforcing the lifecycle DAG.
    ///
    /// Terminal transitions stamp `closed_at` and zero the remaining
    /// quantity; terminal statuses themselves are sinks and never change.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTransition` when the DAG forbids the
    /// move.
    pub fn transition(&mut self, next: PositionStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.name(),
                to: next.name(),
            });
        }

        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.closed_at = Some(self.updated_at);
            self.remaining_quantity = Quantity::zero();
        }
        Ok(())
    }

    /// Adopt the broker-reported entry fill and go `Active`.
    ///
    /// The fill average supersedes the planned entry price, and protective
    /// prices that were requested as percentages are re-bound to the actual
    /// fill so the bracket geometry matches what was really paid.
    pub fn apply_entry_fill(&mut self, fill: Price) -> Result<(), DomainError> {
        let side = self.side;
        self.entry_price = fill;

        if let Some(pct) = self.stop_percent {
            self.stop_price = Price::new(risk::stop_from_percent(fill, pct, side))?;
        }
        if let Some(pct) = self.take_profit_percent {
            self.take_profit_price = Price::new(risk::take_from_percent(fill, pct, side))?;
        }
        if let Some(partial) = self.partial_exit.as_mut() {
            if let Some(pct) = partial.trigger_percent {
                partial.trigger_price =
                    Price::new(risk::partial_trigger_from_percent(fill, pct, side))?;
            }
        }

        self.transition(PositionStatus::Active)
    }

    /// Reduce the remaining size by a partial-exit fill and go `Partial`.
    ///
    /// # Errors
    /// Returns `DomainError::InvariantViolated` if the fill exceeds the
    /// remaining size; the caller fails the record in that case.
    pub fn apply_partial_fill(&mut self, filled: Quantity) -> Result<(), DomainError> {
        self.remaining_quantity = self.remaining_quantity.checked_sub(filled)?;
        self.transition(PositionStatus::Partial)
    }

    /// Refresh the advisory mark and unrealized P&L fields.
    pub fn set_mark(&mut self, mark: Price) {
        let entry = self.entry_price.as_decimal();
        let per_share = match self.side {
            Side::Long => mark.as_decimal() - entry,
            Side::Short => entry - mark.as_decimal(),
        };

        self.current_price = Some(mark);
        self.unrealized_pl = per_share * self.remaining_quantity.as_decimal();
        self.unrealized_pl_pct = per_share / entry * Decimal::ONE_HUNDRED;
        self.updated_at = Utc::now();
    }

    /// Whether this is a `Pending` record older than the freshness window.
    ///
    /// Stale records are hidden from default list views but stay under
    /// management.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status == PositionStatus::Pending && now - self.created_at > window
    }

    /// Append an operator-visible diagnostic to the notes field.
    pub fn append_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push_str("; ");
        }
        self.notes.push_str(note);
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Tests
// =============================================================================
