//! Warden Position Store
//!
//! Durable persistence of managed-position records. The store owns bytes on
//! disk and nothing else: the supervisor is the only writer, and it writes
//! through on every observed transition. After `upsert` returns, a
//! subsequent process start observes the written value.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod repository;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::PositionStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
