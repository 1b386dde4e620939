//! Warden Broker Port
//!
//! The abstract boundary to the external venue: place, cancel, and query
//! orders, and fetch quotes. The engine treats every call through this port
//! as slow and failure-prone, and treats the broker as the authoritative
//! source of truth for order state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ports;
pub mod stub;

pub use error::BrokerError;
pub use ports::{
    BrokerPort, CancelOutcome, OrderAck, OrderKind, OrderRequest, OrderSnapshot, OrderStatus,
    Quote, TimeInForce,
};
pub use stub::ScriptedBroker;
