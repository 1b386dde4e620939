//! The open-position request shape and its validation rules.

use crate::position::EntryKind;
use crate::value_objects::{DomainError, Side};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Request to open a managed position.
///
/// Shape rules (enforced by [`OpenPositionRequest::validate`]):
/// - `allocation` must be positive.
/// - `entry_price` is required for limit entries and rejected for market
///   entries.
/// - Exactly one of `stop_price` / `stop_percent`, and exactly one of
///   `take_profit_price` / `take_profit_percent`.
/// - `trailing_percent` is required iff `trailing_enabled`.
/// - A partial-exit fraction must lie strictly between 0 and 1.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenPositionRequest {
    /// Ticker to trade
    pub symbol: String,
    /// Position direction
    pub side: Side,
    /// Opaque strategy label
    #[serde(default)]
    pub strategy_tag: String,
    /// Currency amount to allocate
    pub allocation: Decimal,

    /// Entry pricing strategy; defaults to market
    #[serde(default)]
    pub entry_strategy: EntryKind,
    /// Explicit entry price, required iff `entry_strategy` is limit
    pub entry_price: Option<Decimal>,

    /// Absolute stop price
    pub stop_price: Option<Decimal>,
    /// Stop distance as a percentage of entry
    pub stop_percent: Option<Decimal>,

    /// Absolute take-profit price
    pub take_profit_price: Option<Decimal>,
    /// Take-profit distance as a percentage of entry
    pub take_profit_percent: Option<Decimal>,

    /// Whether the stop trails the mark after activation
    #[serde(default)]
    pub trailing_enabled: bool,
    /// Trail distance as a percentage of the mark
    pub trailing_percent: Option<Decimal>,

    /// Optional partial profit-taking plan
    pub partial_exit: Option<PartialExitRequest>,

    /// Free-form operator notes
    #[serde(default)]
    pub notes: String,
    /// Free-form labels
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial-exit plan as requested by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct PartialExitRequest {
    /// Fraction of the position to exit, in (0, 1)
    pub fraction: Decimal,
    /// Gain percentage that triggers the exit
    pub trigger_percent: Decimal,
}

impl OpenPositionRequest {
    /// Enforce the request shape rules.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRequest` describing the first violation
    /// found.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.allocation <= Decimal::ZERO {
            return Err(invalid("allocation must be positive"));
        }

        match self.entry_strategy {
            EntryKind::Limit => match self.entry_price {
                None => return Err(invalid("entry_price is required for limit entries")),
                Some(price) if price <= Decimal::ZERO => {
                    return Err(invalid("entry_price must be positive"));
                }
                Some(_) => {}
            },
            EntryKind::Market => {
                if self.entry_price.is_some() {
                    return Err(invalid("entry_price is only valid for limit entries"));
                }
            }
        }

        exactly_one("stop_price", self.stop_price, "stop_percent", self.stop_percent)?;
        exactly_one(
            "take_profit_price",
            self.take_profit_price,
            "take_profit_percent",
            self.take_profit_percent,
        )?;

        if let Some(pct) = self.stop_percent {
            if pct >= Decimal::ONE_HUNDRED {
                return Err(invalid("stop_percent must be below 100"));
            }
        }

        match (self.trailing_enabled, self.trailing_percent) {
            (true, None) => {
                return Err(invalid("trailing_percent is required when trailing is enabled"));
            }
            (true, Some(pct)) if pct <= Decimal::ZERO || pct >= Decimal::ONE_HUNDRED => {
                return Err(invalid("trailing_percent must be between 0 and 100"));
            }
            (false, Some(_)) => {
                return Err(invalid("trailing_percent is only valid when trailing is enabled"));
            }
            _ => {}
        }

        if let Some(partial) = &self.partial_exit {
            if partial.fraction <= Decimal::ZERO || partial.fraction >= Decimal::ONE {
                return Err(invalid("partial_exit.fraction must be strictly between 0 and 1"));
            }
            if partial.trigger_percent <= Decimal::ZERO {
                return Err(invalid("partial_exit.trigger_percent must be positive"));
            }
        }

        Ok(())
    }
}

fn invalid(message: &str) -> DomainError {
    DomainError::InvalidRequest(message.to_string())
}

/// Require exactly one of two mutually exclusive positive values.
fn exactly_one(
    price_name: &str,
    price: Option<Decimal>,
    percent_name: &str,
    percent: Option<Decimal>,
) -> Result<(), DomainError> {
    match (price, percent) {
        (None, None) => Err(invalid(&format!("either {price_name} or {percent_name} is required"))),
        (Some(_), Some(_)) => {
            Err(invalid(&format!("{price_name} and {percent_name} are mutually exclusive")))
        }
        (Some(value), None) if value <= Decimal::ZERO => {
            Err(invalid(&format!("{price_name} must be positive")))
        }
        (None, Some(value)) if value <= Decimal::ZERO => {
            Err(invalid(&format!("{percent_name} must be positive")))
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_request() -> OpenPositionRequest {
        OpenPositionRequest {
            symbol: "SPY".to_string(),
            side: Side::Long,
            strategy_tag: String::new(),
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

    #[test]
    fn test_valid_percent_request() {
        assert!(base_request().validate().is_ok());
    }

    #[test]
    fn test_allocation_must_be_positive() {
        let mut req = base_request();
        req.allocation = dec!(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_limit_requires_entry_price() {
        let mut req = base_request();
        req.entry_strategy = EntryKind::Limit;
        assert!(req.validate().is_err());

        req.entry_price = Some(dec!(100));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_market_rejects_entry_price() {
        let mut req = base_request();
        req.entry_price = Some(dec!(100));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_exactly_one_stop_source() {
        let mut req = base_request();
        req.stop_price = Some(dec!(95));
        assert!(req.validate().is_err(), "both sources should be rejected");

        req.stop_percent = None;
        assert!(req.validate().is_ok(), "absolute price alone is fine");

        req.stop_price = None;
        assert!(req.validate().is_err(), "neither source should be rejected");
    }

    #[test]
    fn test_exactly_one_take_source() {
        let mut req = base_request();
        req.take_profit_price = Some(dec!(110));
        assert!(req.validate().is_err());

        req.take_profit_percent = None;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let mut req = base_request();
        req.stop_percent = Some(dec!(-5));
        assert!(req.validate().is_err());

        let mut req = base_request();
        req.stop_percent = Some(dec!(100));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_trailing_requires_percent() {
        let mut req = base_request();
        req.trailing_enabled = true;
        assert!(req.validate().is_err());

        req.trailing_percent = Some(dec!(5));
        assert!(req.validate().is_ok());

        req.trailing_enabled = false;
        assert!(req.validate().is_err(), "percent without enabled flag is a shape error");
    }

    #[test]
    fn test_partial_exit_fraction_bounds() {
        for fraction in [dec!(0), dec!(1), dec!(1.5), dec!(-0.25)] {
            let mut req = base_request();
            req.partial_exit =
                Some(PartialExitRequest { fraction, trigger_percent: dec!(5) });
            assert!(req.validate().is_err(), "fraction {fraction} should be rejected");
        }

        let mut req = base_request();
        req.partial_exit =
            Some(PartialExitRequest { fraction: dec!(0.5), trigger_percent: dec!(5) });
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_deserializes_from_gateway_json() {
        let json = r#"{
            "symbol": "SPY",
            "side": "long",
            "allocation": "1000",
            "stop_percent": "5",
            "take_profit_percent": "10",
            "partial_exit": {"fraction": "0.5", "trigger_percent": "5"},
            "tags": ["swing"]
        }"#;

        let req: OpenPositionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.entry_strategy, EntryKind::Market);
        assert_eq!(req.allocation, dec!(1000));
        assert!(req.validate().is_ok());
    }
}
