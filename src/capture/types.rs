use crate::models::ExtractedListing;
use serde::{Deserialize, Serialize};

/// A search result that may point at a listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
}

/// Rendered page contents
#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub url: String,
    /// PNG bytes
    pub screenshot: Vec<u8>,
    pub html: String,
}

/// Where a URL fell out of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureStage {
    Screenshot,
    Extraction,
}

#[derive(Debug, Clone, Serialize)]
pub enum CaptureStatus {
    Captured {
        #[serde(skip)]
        screenshot: Vec<u8>,
        listing: ExtractedListing,
    },
    Failed {
        stage: CaptureStage,
        reason: String,
    },
}

/// Per-URL result of a capture run
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub url: String,
    pub status: CaptureStatus,
}

impl CaptureOutcome {
    pub fn listing(&self) -> Option<&ExtractedListing> {
        match &self.status {
            CaptureStatus::Captured { listing, .. } => Some(listing),
            CaptureStatus::Failed { .. } => None,
        }
    }

    pub fn is_captured(&self) -> bool {
        self.listing().is_some()
    }
}
