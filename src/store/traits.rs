use crate::error::StoreError;
use crate::models::{PropertyRecord, RecordFilter, ValidationSummary};
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Common trait for all record stores
/// Mutations report how many rows they touched so callers can tell a no-op from a write
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch records matching the filter, in store order
    async fn fetch(&self, filter: &RecordFilter) -> StoreResult<Vec<PropertyRecord>>;

    /// Mark every id as validated by `validator`; all-or-nothing per call
    async fn update_validation(&self, ids: &[String], validator: &str) -> StoreResult<u64>;

    /// Remove a record by id
    async fn delete(&self, property_id: &str) -> StoreResult<u64>;

    /// Table-wide validation counts
    async fn fetch_summary(&self) -> StoreResult<ValidationSummary>;

    /// Append new records
    async fn insert(&self, records: &[PropertyRecord]) -> StoreResult<u64>;

    /// Create the backing table if it does not exist yet
    async fn ensure_table(&self) -> StoreResult<()>;

    /// Get the name of the store backend
    fn store_name(&self) -> &'static str;
}
