//! Daemon error types.

use rust_decimal::Decimal;
use thiserror::Error;
use warden_broker::BrokerError;
use warden_domain::{DomainError, PositionId};
use warden_store::StoreError;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error (validation, invariants, transitions)
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Broker port error
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Sizing produced zero shares
    #[error("allocation {allocation} buys zero shares at {price}")]
    AllocationBelowPrice {
        /// Requested allocation
        allocation: Decimal,
        /// Resolved entry price
        price: Decimal,
    },

    /// No managed position with this id
    #[error("position not found: {0}")]
    PositionNotFound(PositionId),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
