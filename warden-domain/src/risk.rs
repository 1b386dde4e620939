//! Risk calculator: pure pricing and sizing math.
//!
//! Every function here is a pure function over decimals. The supervisor and
//! planner own all I/O; this module owns none.

use crate::value_objects::{Price, Side};
use rust_decimal::Decimal;

/// Number of whole shares purchasable with `allocation` at `price`.
///
/// Fractional shares are not issued, so the result is floored.
pub fn share_quantity(allocation: Decimal, price: Price) -> Decimal {
    (allocation / price.as_decimal()).floor()
}

/// Stop price derived from a percentage distance below (long) or above
/// (short) the entry price.
pub fn stop_from_percent(entry: Price, pct: Decimal, side: Side) -> Decimal {
    let ratio = pct / Decimal::ONE_HUNDRED;
    match side {
        Side::Long => entry.as_decimal() * (Decimal::ONE - ratio),
        Side::Short => entry.as_decimal() * (Decimal::ONE + ratio),
    }
}

/// Take-profit price derived from a percentage gain target.
pub fn take_from_percent(entry: Price, pct: Decimal, side: Side) -> Decimal {
    let ratio = pct / Decimal::ONE_HUNDRED;
    match side {
        Side::Long => entry.as_decimal() * (Decimal::ONE + ratio),
        Side::Short => entry.as_decimal() * (Decimal::ONE - ratio),
    }
}

/// Partial-exit trigger price; same geometry as a take-profit target.
pub fn partial_trigger_from_percent(entry: Price, pct: Decimal, side: Side) -> Decimal {
    take_from_percent(entry, pct, side)
}

/// Trailing-stop candidate for the given mark, before the ratchet check.
pub fn trailing_stop_candidate(mark: Price, pct: Decimal, side: Side) -> Decimal {
    let ratio = pct / Decimal::ONE_HUNDRED;
    match side {
        Side::Long => mark.as_decimal() * (Decimal::ONE - ratio),
        Side::Short => mark.as_decimal() * (Decimal::ONE + ratio),
    }
}

/// Trailing-stop ratchet: the new stop implied by `mark`, adopted only when
/// it is strictly better than `current` (higher for longs, lower for
/// shorts). Returns `None` when the current stop should be kept.
///
/// This is the sole write path for a position's stop price once it is
/// active; the stop never loosens, even when the mark reverses.
pub fn trailing_stop_new(
    mark: Price,
    pct: Decimal,
    side: Side,
    current: Price,
) -> Option<Decimal> {
    let candidate = trailing_stop_candidate(mark, pct, side);
    let improves = match side {
        Side::Long => candidate > current.as_decimal(),
        Side::Short => candidate < current.as_decimal(),
    };
    improves.then_some(candidate)
}

// =============================================================================
// Tests
// =============================================================================
