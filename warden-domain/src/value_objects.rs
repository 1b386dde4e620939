//! Validated domain primitives.
//!
//! All value objects enforce their invariants at construction time, so
//! everything downstream can rely on a `Price` being positive and a
//! `Quantity` being non-negative without re-checking.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain-level errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be non-negative
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Symbol must be a plausible ticker
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Open-position request failed shape validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Status transition not allowed by the lifecycle DAG
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Status before the attempted transition
        from: &'static str,
        /// Status the transition attempted to reach
        to: &'static str,
    },

    /// A record invariant was violated; the record must be failed
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}

// =============================================================================
// Price
// =============================================================================

/// A strictly positive decimal price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a new price.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if `value <= 0`.
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!(
                "price must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// The underlying decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A non-negative share quantity.
///
/// Zero is allowed: a fully exited position has a remaining quantity of
/// zero. Negative quantities are rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new quantity.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if `value < 0`.
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value < Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!(
                "quantity must be non-negative, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// A zero quantity.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// The underlying decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether this quantity is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtract `other`, failing if the result would go negative.
    ///
    /// # Errors
    /// Returns `DomainError::InvariantViolated` on underflow; the caller is
    /// expected to fail the owning record rather than clamp.
    pub fn checked_sub(&self, other: Quantity) -> Result<Quantity, DomainError> {
        let result = self.0 - other.0;
        if result < Decimal::ZERO {
            return Err(DomainError::InvariantViolated(format!(
                "quantity underflow: {} - {} < 0",
                self.0, other.0
            )));
        }
        Ok(Quantity(result))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// An equity ticker symbol, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol from a ticker string.
    ///
    /// # Examples
    /// ```
    /// # use warden_domain::Symbol;
    /// let symbol = Symbol::new("spy").unwrap();
    /// assert_eq!(symbol.as_str(), "SPY");
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` for empty or non-ticker input.
    pub fn new(ticker: &str) -> Result<Self, DomainError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() || ticker.len() > 12 {
            return Err(DomainError::InvalidSymbol(format!(
                "ticker must be 1-12 characters, got {:?}",
                ticker
            )));
        }
        if !ticker.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
            return Err(DomainError::InvalidSymbol(format!(
                "ticker contains invalid characters: {ticker:?}"
            )));
        }
        Ok(Self(ticker))
    }

    /// The ticker as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Side
// =============================================================================

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Long position (profit when price rises)
    Long,
    /// Short position (profit when price falls)
    Short,
}

impl Side {
    /// Order side that opens a position of this direction.
    pub fn entry_action(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position of this direction.
    pub fn exit_action(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Order direction on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
