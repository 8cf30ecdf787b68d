use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default cap on how many records a validation load pulls from the store
pub const DEFAULT_LOAD_LIMIT: usize = 100;

/// A property listing row as stored in the records table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PropertyRecord {
    pub property_id: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sqft: Option<f64>,
    #[serde(default)]
    pub rooms: Option<i64>,
    #[serde(default)]
    pub bathroom: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub aes_score: Option<f64>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub listing_urls: Option<String>,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub is_validated: bool,
    #[serde(default)]
    pub validated_by: Option<String>,
    #[serde(default)]
    pub validation_timestamp: Option<DateTime<Utc>>,
}

impl PropertyRecord {
    pub fn new(property_id: impl Into<String>) -> Self {
        Self {
            property_id: property_id.into(),
            ..Default::default()
        }
    }

    /// Both coordinates, if the record has a usable location
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Which rows a fetch should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordPredicate {
    Unvalidated,
    All,
}

/// Predicate plus row cap for a store fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub predicate: RecordPredicate,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn unvalidated(limit: usize) -> Self {
        Self {
            predicate: RecordPredicate::Unvalidated,
            limit: Some(limit),
        }
    }

    pub fn all() -> Self {
        Self {
            predicate: RecordPredicate::All,
            limit: None,
        }
    }

    pub fn matches(&self, record: &PropertyRecord) -> bool {
        match self.predicate {
            RecordPredicate::Unvalidated => !record.is_validated,
            RecordPredicate::All => true,
        }
    }
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::unvalidated(DEFAULT_LOAD_LIMIT)
    }
}

/// Table-wide validation counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: u64,
    pub validated: u64,
    pub unvalidated: u64,
}

impl ValidationSummary {
    pub fn validated_pct(&self) -> f64 {
        percent(self.validated, self.total)
    }

    pub fn unvalidated_pct(&self) -> f64 {
        percent(self.unvalidated, self.total)
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Structured fields read off a listing screenshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedListing {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sqft: Option<f64>,
    #[serde(default)]
    pub rooms: Option<i64>,
    #[serde(default)]
    pub bathroom: Option<f64>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub aes_score: Option<f64>,
}

impl ExtractedListing {
    /// Turn the extraction into a fresh, unvalidated row for `url`
    pub fn into_record(self, property_id: String, url: &str) -> PropertyRecord {
        PropertyRecord {
            property_id,
            price: self.price,
            sqft: self.sqft,
            rooms: self.rooms,
            bathroom: self.bathroom,
            latitude: self.latitude,
            longitude: self.longitude,
            aes_score: self.aes_score,
            property_type: self.property_type,
            listing_urls: Some(url.to_string()),
            community: self.community,
            is_validated: false,
            validated_by: None,
            validation_timestamp: None,
        }
    }
}
