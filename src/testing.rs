// Test doubles for the record store.
//
// FlakyStore is a stateful in-memory store whose fetch/update/delete can be
// switched to fail, with call counters so tests can assert the store was (or
// was not) consulted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::models::{PropertyRecord, RecordFilter, ValidationSummary};
use crate::store::{RecordStore, StoreResult};

/// Unvalidated records with the given ids, in order
pub fn records(ids: &[&str]) -> Vec<PropertyRecord> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| PropertyRecord {
            price: Some(100_000.0 + i as f64 * 1_000.0),
            rooms: Some(1 + i as i64 % 4),
            property_type: Some("House".to_string()),
            listing_urls: Some(format!("https://listings.example.com/{}", id)),
            ..PropertyRecord::new(*id)
        })
        .collect()
}

#[derive(Default)]
pub struct FlakyStore {
    rows: Mutex<Vec<PropertyRecord>>,
    fail_fetch: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
    fetch_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(rows: Vec<PropertyRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Drop a row without going through the queue, as another session would
    pub fn remove_behind_queue(&self, id: &str) {
        self.rows().retain(|r| r.property_id != id);
    }

    pub fn validated_by(&self, id: &str) -> Option<String> {
        self.rows()
            .iter()
            .find(|r| r.property_id == id)
            .and_then(|r| r.validated_by.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows().iter().any(|r| r.property_id == id)
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<PropertyRecord>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn injected(op: &str) -> StoreError {
    StoreError::Network(format!("injected {} failure", op))
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn fetch(&self, filter: &RecordFilter) -> StoreResult<Vec<PropertyRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(injected("fetch"));
        }
        Ok(self
            .rows()
            .iter()
            .filter(|r| filter.matches(r))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_validation(&self, ids: &[String], validator: &str) -> StoreResult<u64> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(injected("update"));
        }
        let mut touched = 0;
        for row in self.rows().iter_mut().filter(|r| ids.contains(&r.property_id)) {
            row.is_validated = true;
            row.validated_by = Some(validator.to_string());
            row.validation_timestamp = Some(Utc::now());
            touched += 1;
        }
        Ok(touched)
    }

    async fn delete(&self, property_id: &str) -> StoreResult<u64> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        let mut rows = self.rows();
        let before = rows.len();
        rows.retain(|r| r.property_id != property_id);
        Ok((before - rows.len()) as u64)
    }

    async fn fetch_summary(&self) -> StoreResult<ValidationSummary> {
        let rows = self.rows();
        let validated = rows.iter().filter(|r| r.is_validated).count() as u64;
        Ok(ValidationSummary {
            total: rows.len() as u64,
            validated,
            unvalidated: rows.len() as u64 - validated,
        })
    }

    async fn insert(&self, records: &[PropertyRecord]) -> StoreResult<u64> {
        self.rows().extend(records.iter().cloned());
        Ok(records.len() as u64)
    }

    async fn ensure_table(&self) -> StoreResult<()> {
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "flaky"
    }
}
