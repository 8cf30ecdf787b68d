//! Session-scoped validation worklist.
//!
//! The queue is a view over "not yet processed in this session". The store's
//! `is_validated` flag stays authoritative; the two are only reconciled on a
//! fresh load. Every store-backed operation mutates local state strictly
//! after the store confirms, so a failed call leaves the queue untouched.

use crate::error::{QueueError, StoreError};
use crate::models::{PropertyRecord, RecordFilter};
use crate::store::RecordStore;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long a loaded snapshot is reused before `load` fetches again
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Whether `load` hit the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Snapshot was still fresh; nothing was fetched
    Cached,
    /// Snapshot was replaced with this many records
    Fetched(usize),
}

/// Records processed so far out of the original load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub validated: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.validated as f64 / self.total as f64
        }
    }
}

/// Ordered worklist of unprocessed record ids plus the snapshot backing it
#[derive(Debug)]
pub struct ValidationQueue {
    queue: VecDeque<String>,
    snapshot: HashMap<String, PropertyRecord>,
    selection: Option<String>,
    total: usize,
    loaded: Option<(RecordFilter, Instant)>,
    ttl: Duration,
}

impl ValidationQueue {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            snapshot: HashMap::new(),
            selection: None,
            total: 0,
            loaded: None,
            ttl,
        }
    }

    /// Populate from the store unless a fresh snapshot for `filter` is already held
    pub async fn load<S>(&mut self, store: &S, filter: RecordFilter) -> QueueResult<LoadOutcome>
    where
        S: RecordStore + ?Sized,
    {
        if let Some((loaded_filter, at)) = &self.loaded {
            if *loaded_filter == filter && at.elapsed() < self.ttl {
                debug!("Queue snapshot still fresh, skipping fetch");
                return Ok(LoadOutcome::Cached);
            }
        }
        self.reload(store, filter).await
    }

    /// Fetch unconditionally, replacing queue and snapshot on success
    pub async fn reload<S>(&mut self, store: &S, filter: RecordFilter) -> QueueResult<LoadOutcome>
    where
        S: RecordStore + ?Sized,
    {
        let records = store
            .fetch(&filter)
            .await
            .map_err(QueueError::StoreUnavailable)?;

        let mut seen = HashSet::new();
        let mut queue = VecDeque::with_capacity(records.len());
        let mut snapshot = HashMap::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.property_id.clone()) {
                warn!("Duplicate property_id {} in fetch, keeping first", record.property_id);
                continue;
            }
            queue.push_back(record.property_id.clone());
            snapshot.insert(record.property_id.clone(), record);
        }

        let count = queue.len();
        self.queue = queue;
        self.snapshot = snapshot;
        self.total = count;
        self.selection = None;
        self.loaded = Some((filter, Instant::now()));

        info!("Loaded {} records into validation queue from {}", count, store.store_name());
        Ok(LoadOutcome::Fetched(count))
    }

    /// Drop queue, snapshot and selection; the next `load` always fetches
    pub fn reset(&mut self) {
        self.queue.clear();
        self.snapshot.clear();
        self.selection = None;
        self.total = 0;
        self.loaded = None;
    }

    pub fn select(&mut self, id: &str) -> QueueResult<()> {
        self.require_queued(id)?;
        self.selection = Some(id.to_string());
        Ok(())
    }

    /// Mark `id` validated in the store, then drop it from the queue
    pub async fn validate<S>(&mut self, store: &S, id: &str, validator: &str) -> QueueResult<()>
    where
        S: RecordStore + ?Sized,
    {
        self.require_queued(id)?;
        let validator = validator.trim();
        if validator.is_empty() {
            return Err(QueueError::PreconditionViolation(
                "validator name must not be empty".to_string(),
            ));
        }

        let ids = [id.to_string()];
        match store.update_validation(&ids, validator).await {
            Ok(0) => {
                warn!("Store updated no rows validating {}", id);
                Err(QueueError::UpdateFailed {
                    id: id.to_string(),
                    source: StoreError::NoMatch(id.to_string()),
                })
            }
            Ok(_) => {
                self.remove_from_queue(id);
                info!("✅ {} validated by {}", id, validator);
                Ok(())
            }
            Err(source) => {
                warn!("Validation of {} failed: {}", id, source);
                Err(QueueError::UpdateFailed {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }

    /// Move `id` to the tail of the queue
    pub fn skip(&mut self, id: &str) -> QueueResult<()> {
        let pos = self.position(id).ok_or_else(|| not_queued(id))?;
        if let Some(skipped) = self.queue.remove(pos) {
            self.queue.push_back(skipped);
        }
        debug!("Skipped {}", id);
        Ok(())
    }

    /// Delete `id` from the store, then from queue and snapshot
    pub async fn delete<S>(&mut self, store: &S, id: &str) -> QueueResult<()>
    where
        S: RecordStore + ?Sized,
    {
        self.require_queued(id)?;

        match store.delete(id).await {
            Ok(affected) => {
                if affected == 0 {
                    warn!("Store had no row for {}; treating as already deleted", id);
                }
                self.remove_from_queue(id);
                self.snapshot.remove(id);
                info!("🗑️ {} deleted", id);
                Ok(())
            }
            Err(source) => {
                warn!("Delete of {} failed: {}", id, source);
                Err(QueueError::DeleteFailed {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            validated: self.total - self.queue.len(),
            total: self.total,
        }
    }

    /// Queued ids in work order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    pub fn record(&self, id: &str) -> Option<&PropertyRecord> {
        self.snapshot.get(id)
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    /// Selected record if any, otherwise the head of the queue
    pub fn current(&self) -> Option<&str> {
        self.selection().or_else(|| self.queue.front().map(String::as_str))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// True when nothing is loaded or the snapshot has outlived the TTL
    pub fn is_stale(&self) -> bool {
        match &self.loaded {
            Some((_, at)) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.queue.iter().position(|queued| queued == id)
    }

    fn require_queued(&self, id: &str) -> QueueResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(not_queued(id))
        }
    }

    fn remove_from_queue(&mut self, id: &str) {
        if let Some(pos) = self.position(id) {
            self.queue.remove(pos);
        }
        if self.selection.as_deref() == Some(id) {
            self.selection = None;
        }
    }
}

impl Default for ValidationQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn not_queued(id: &str) -> QueueError {
    QueueError::PreconditionViolation(format!("{} is not in the validation queue", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{records, FlakyStore};

    async fn loaded(ids: &[&str]) -> (ValidationQueue, FlakyStore) {
        let store = FlakyStore::new(records(ids));
        let mut queue = ValidationQueue::new();
        queue.load(&store, RecordFilter::default()).await.unwrap();
        (queue, store)
    }

    fn ids(queue: &ValidationQueue) -> Vec<&str> {
        queue.ids().collect()
    }

    #[tokio::test]
    async fn load_keeps_fetch_order() {
        let (queue, _) = loaded(&["A", "B", "C"]).await;
        assert_eq!(ids(&queue), vec!["A", "B", "C"]);
        assert_eq!(queue.progress(), Progress { validated: 0, total: 3 });
        assert!(queue.record("B").is_some());
    }

    #[tokio::test]
    async fn load_within_ttl_is_cached() {
        let (mut queue, store) = loaded(&["A", "B"]).await;
        let outcome = queue.load(&store, RecordFilter::default()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Cached);
        assert_eq!(store.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn expired_snapshot_is_refetched() {
        let store = FlakyStore::new(records(&["A", "B"]));
        let mut queue = ValidationQueue::with_ttl(Duration::ZERO);
        queue.load(&store, RecordFilter::default()).await.unwrap();
        queue.skip("A").unwrap();

        let outcome = queue.load(&store, RecordFilter::default()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Fetched(2));
        assert_eq!(ids(&queue), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn failed_load_leaves_queue_unchanged() {
        let (mut queue, store) = loaded(&["A", "B"]).await;
        queue.select("B").unwrap();
        store.fail_fetch(true);

        let err = queue
            .reload(&store, RecordFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::StoreUnavailable(_)));
        assert_eq!(ids(&queue), vec!["A", "B"]);
        assert_eq!(queue.selection(), Some("B"));
    }

    #[tokio::test]
    async fn duplicate_ids_keep_first_occurrence() {
        let store = FlakyStore::new(records(&["A", "B", "A"]));
        let mut queue = ValidationQueue::new();
        queue.load(&store, RecordFilter::default()).await.unwrap();
        assert_eq!(ids(&queue), vec!["A", "B"]);
        assert_eq!(queue.progress().total, 2);
    }

    #[tokio::test]
    async fn select_requires_queued_id() {
        let (mut queue, _) = loaded(&["A"]).await;
        assert!(matches!(
            queue.select("Z"),
            Err(QueueError::PreconditionViolation(_))
        ));
        queue.select("A").unwrap();
        assert_eq!(queue.selection(), Some("A"));
    }

    #[tokio::test]
    async fn skip_moves_to_tail() {
        let (mut queue, _) = loaded(&["A", "B", "C", "D"]).await;
        queue.skip("B").unwrap();
        assert_eq!(ids(&queue), vec!["A", "C", "D", "B"]);
    }

    #[tokio::test]
    async fn skip_single_element_is_noop() {
        let (mut queue, _) = loaded(&["A"]).await;
        queue.skip("A").unwrap();
        assert_eq!(ids(&queue), vec!["A"]);
    }

    #[tokio::test]
    async fn validate_removes_and_clears_selection() {
        let (mut queue, store) = loaded(&["A", "B"]).await;
        queue.select("A").unwrap();
        queue.validate(&store, "A", "alice").await.unwrap();

        assert_eq!(ids(&queue), vec!["B"]);
        assert_eq!(queue.selection(), None);
        assert_eq!(queue.progress(), Progress { validated: 1, total: 2 });
        assert_eq!(store.validated_by("A").as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn validate_rejects_blank_validator_without_store_call() {
        let (mut queue, store) = loaded(&["A"]).await;
        let err = queue.validate(&store, "A", "  ").await.unwrap_err();
        assert!(matches!(err, QueueError::PreconditionViolation(_)));
        assert!(!err.is_store_failure());
        assert_eq!(store.update_calls(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn failed_validate_keeps_position_and_progress() {
        let (mut queue, store) = loaded(&["A", "B", "C"]).await;
        store.fail_update(true);

        let err = queue.validate(&store, "B", "alice").await.unwrap_err();
        assert!(matches!(err, QueueError::UpdateFailed { ref id, .. } if id == "B"));
        assert_eq!(ids(&queue), vec!["A", "B", "C"]);
        assert_eq!(queue.progress(), Progress { validated: 0, total: 3 });
    }

    #[tokio::test]
    async fn validate_of_vanished_row_is_not_confirmed() {
        let (mut queue, store) = loaded(&["A", "B"]).await;
        store.remove_behind_queue("A");

        let err = queue.validate(&store, "A", "alice").await.unwrap_err();
        assert!(matches!(err, QueueError::UpdateFailed { .. }));
        assert!(queue.contains("A"));
    }

    #[tokio::test]
    async fn delete_removes_from_queue_and_snapshot() {
        let (mut queue, store) = loaded(&["A", "B"]).await;
        queue.delete(&store, "A").await.unwrap();
        assert_eq!(ids(&queue), vec!["B"]);
        assert!(queue.record("A").is_none());
        assert_eq!(queue.progress(), Progress { validated: 1, total: 2 });
    }

    #[tokio::test]
    async fn failed_delete_keeps_everything() {
        let (mut queue, store) = loaded(&["A", "B"]).await;
        store.fail_delete(true);
        let err = queue.delete(&store, "A").await.unwrap_err();
        assert!(matches!(err, QueueError::DeleteFailed { .. }));
        assert_eq!(ids(&queue), vec!["A", "B"]);
        assert!(queue.record("A").is_some());
    }

    #[tokio::test]
    async fn current_prefers_selection_over_head() {
        let (mut queue, _) = loaded(&["A", "B"]).await;
        assert_eq!(queue.current(), Some("A"));
        queue.select("B").unwrap();
        assert_eq!(queue.current(), Some("B"));
    }

    #[tokio::test]
    async fn reset_forces_next_load_to_fetch() {
        let (mut queue, store) = loaded(&["A"]).await;
        queue.reset();
        assert!(queue.is_empty());
        assert!(queue.is_stale());
        let outcome = queue.load(&store, RecordFilter::default()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Fetched(1));
        assert_eq!(store.fetch_calls(), 2);
    }
}
