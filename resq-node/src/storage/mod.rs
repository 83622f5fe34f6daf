//! Local store for request records and device settings.
//!
//! The store is the device's source of truth. It holds exactly one record per
//! request id and knows nothing about merging: the engine decides what to
//! write, the store writes it.

mod memory;
mod sqlite;

pub use memory::MemoryKeyValue;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use async_trait::async_trait;
use resq_types::{DisasterRequest, RequestId, StatusEntry};

/// Durable persistence of request records, keyed by id.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Create the schema if it does not exist.
    ///
    /// Idempotent and safe to call concurrently. Every other operation calls
    /// it first.
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert or fully replace the record with `record.id`.
    async fn upsert(&self, record: &DisasterRequest) -> Result<(), StoreError>;

    /// Fetch one record.
    async fn get(&self, id: &RequestId) -> Result<Option<DisasterRequest>, StoreError>;

    /// All records, newest creation time first.
    async fn list(&self) -> Result<Vec<DisasterRequest>, StoreError>;

    /// Append `entry` to the record's history and set its status.
    ///
    /// Concurrent appends on the same id never lose an entry.
    ///
    /// Returns the updated record, or [`StoreError::NotFound`].
    async fn append_status_history(
        &self,
        id: &RequestId,
        entry: StatusEntry,
    ) -> Result<DisasterRequest, StoreError>;

    /// Remove every record. Returns the number removed.
    async fn clear_all(&self) -> Result<u64, StoreError>;
}

/// Scalar settings persisted next to the records.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Write `value` only if `key` has no value yet, then return whatever is
    /// stored. Atomic across every handle on the same database.
    async fn set_value_if_absent(&self, key: &str, value: &str) -> Result<String, StoreError>;

    /// Delete a value. Missing keys are not an error.
    async fn remove_value(&self, key: &str) -> Result<(), StoreError>;
}
