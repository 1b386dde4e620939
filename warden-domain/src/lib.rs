//! Warden Domain Layer
//!
//! Pure domain logic with zero I/O dependencies: validated value objects,
//! the managed-position entity with its status machine, the risk
//! calculator, and the open-position request shape.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod position;
pub mod request;
pub mod risk;
pub mod value_objects;

pub use position::{EntryKind, ManagedPosition, PartialExit, PositionId, PositionStatus};
pub use request::{OpenPositionRequest, PartialExitRequest};
pub use value_objects::{DomainError, OrderSide, Price, Quantity, Side, Symbol};
