//! Broker port error taxonomy.

use thiserror::Error;

/// Errors surfaced by a broker port implementation.
///
/// The split matters to the supervisor: `Rejected` is permanent and may
/// promote a record to a terminal status; `Transient` never does, and the
/// affected record is simply retried on the next pass.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Permanent refusal; the broker will not accept this order
    #[error("rejected by broker: {reason}")]
    Rejected {
        /// Broker-supplied refusal reason
        reason: String,
    },

    /// Network failure, timeout, or venue-side 5xx; safe to retry
    #[error("transient broker failure: {0}")]
    Transient(String),

    /// The broker does not know the referenced order
    #[error("order not found: {0}")]
    NotFound(String),
}

impl BrokerError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transient(_))
    }
}
