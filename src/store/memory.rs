use crate::models::{PropertyRecord, RecordFilter, ValidationSummary};
use crate::store::traits::{RecordStore, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-process record store
/// Keeps insertion order so fetches behave like an unordered warehouse scan
pub struct MemoryStore {
    records: RwLock<Vec<PropertyRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<PropertyRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Store seeded with a handful of Kingston listings for demo sessions
    pub fn demo() -> Self {
        info!("📋 Seeding in-memory store with demo listings");
        Self::with_records(demo_records())
    }

    pub async fn get(&self, property_id: &str) -> Option<PropertyRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.property_id == property_id)
            .cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, filter: &RecordFilter) -> StoreResult<Vec<PropertyRecord>> {
        let records = self.records.read().await;
        let limit = filter.limit.unwrap_or(usize::MAX);
        let rows: Vec<_> = records
            .iter()
            .filter(|r| filter.matches(r))
            .take(limit)
            .cloned()
            .collect();
        debug!("Memory fetch returned {} rows", rows.len());
        Ok(rows)
    }

    async fn update_validation(&self, ids: &[String], validator: &str) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut records = self.records.write().await;
        let mut touched = 0;
        for record in records.iter_mut().filter(|r| ids.contains(&r.property_id)) {
            record.is_validated = true;
            record.validated_by = Some(validator.to_string());
            record.validation_timestamp = Some(now);
            touched += 1;
        }
        Ok(touched)
    }

    async fn delete(&self, property_id: &str) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.property_id != property_id);
        Ok((before - records.len()) as u64)
    }

    async fn fetch_summary(&self) -> StoreResult<ValidationSummary> {
        let records = self.records.read().await;
        let validated = records.iter().filter(|r| r.is_validated).count() as u64;
        let total = records.len() as u64;
        Ok(ValidationSummary {
            total,
            validated,
            unvalidated: total - validated,
        })
    }

    async fn insert(&self, new_records: &[PropertyRecord]) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        records.extend(new_records.iter().cloned());
        Ok(new_records.len() as u64)
    }

    async fn ensure_table(&self) -> StoreResult<()> {
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

fn demo_records() -> Vec<PropertyRecord> {
    let listing = |id: &str,
                   property_type: &str,
                   price: f64,
                   sqft: f64,
                   rooms: i64,
                   bathroom: f64,
                   (latitude, longitude): (f64, f64),
                   community: &str| PropertyRecord {
        property_id: id.to_string(),
        price: Some(price),
        sqft: Some(sqft),
        rooms: Some(rooms),
        bathroom: Some(bathroom),
        latitude: Some(latitude),
        longitude: Some(longitude),
        aes_score: None,
        property_type: Some(property_type.to_string()),
        listing_urls: Some(format!("https://listings.example.com/{}", id)),
        community: Some(community.to_string()),
        is_validated: false,
        validated_by: None,
        validation_timestamp: None,
    };

    vec![
        listing("kgn-001", "House", 48_500_000.0, 2_400.0, 4, 3.0, (18.0179, -76.8099), "Barbican"),
        listing("kgn-002", "Apartment", 26_000_000.0, 1_150.0, 2, 2.0, (18.0112, -76.7837), "New Kingston"),
        listing("kgn-003", "Townhouse", 35_750_000.0, 1_700.0, 3, 2.5, (18.0326, -76.7688), "Mona Heights"),
        listing("kgn-004", "House", 72_000_000.0, 3_900.0, 5, 4.0, (18.0423, -76.7921), "Jacks Hill"),
        listing("kgn-005", "Apartment", 19_900_000.0, 850.0, 1, 1.0, (18.0061, -76.7925), "Half Way Tree"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_respects_predicate_and_limit() {
        let store = MemoryStore::demo();
        store
            .update_validation(&["kgn-001".to_string()], "alice")
            .await
            .unwrap();

        let rows = store.fetch(&RecordFilter::unvalidated(2)).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.property_id.as_str()).collect();
        assert_eq!(ids, vec!["kgn-002", "kgn-003"]);

        let all = store.fetch(&RecordFilter::all()).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn update_validation_stamps_audit_fields() {
        let store = MemoryStore::demo();
        let touched = store
            .update_validation(&["kgn-002".to_string(), "missing".to_string()], "bob")
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let record = store.get("kgn-002").await.unwrap();
        assert!(record.is_validated);
        assert_eq!(record.validated_by.as_deref(), Some("bob"));
        assert!(record.validation_timestamp.is_some());
    }

    #[tokio::test]
    async fn delete_and_summary() {
        let store = MemoryStore::demo();
        assert_eq!(store.delete("kgn-005").await.unwrap(), 1);
        assert_eq!(store.delete("kgn-005").await.unwrap(), 0);
        store
            .update_validation(&["kgn-001".to_string()], "alice")
            .await
            .unwrap();

        let summary = store.fetch_summary().await.unwrap();
        assert_eq!(
            summary,
            ValidationSummary {
                total: 4,
                validated: 1,
                unvalidated: 3
            }
        );
    }
}
