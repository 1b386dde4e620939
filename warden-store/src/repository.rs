//! Store trait definition (port).
//!
//! Implementations can be in-memory (tests, development) or SQLite
//! (production). Concurrent upserts to the same id are serialized by the
//! backend; last-writer-wins is acceptable because only the supervisor
//! writes, and it does so under a per-position lock.

use async_trait::async_trait;
use warden_domain::{ManagedPosition, PositionId, PositionStatus};

use crate::error::StoreError;

/// Durable persistence of managed-position records.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Insert or replace a record, keyed by its id. Idempotent.
    async fn upsert(&self, position: &ManagedPosition) -> Result<(), StoreError>;

    /// Load a record by id.
    async fn get(&self, id: PositionId) -> Result<Option<ManagedPosition>, StoreError>;

    /// List records, newest first, optionally filtered by status.
    ///
    /// `None` returns everything; recovery uses that and drops terminals
    /// itself.
    async fn list(
        &self,
        status: Option<PositionStatus>,
    ) -> Result<Vec<ManagedPosition>, StoreError>;
}
