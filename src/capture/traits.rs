use crate::capture::types::CapturedPage;
use crate::models::ExtractedListing;
use anyhow::Result;
use async_trait::async_trait;

/// Renders a listing page and returns its screenshot and markup
/// Implementations may block; the pipeline runs them off the async runtime
pub trait PageCapturer: Send + Sync {
    fn capture(&self, url: &str) -> Result<CapturedPage>;

    fn capturer_name(&self) -> &'static str;
}

/// Reads structured listing fields off a captured page
#[async_trait]
pub trait ListingExtractor: Send + Sync {
    async fn extract(&self, page: &CapturedPage) -> Result<ExtractedListing>;

    fn extractor_name(&self) -> &'static str;
}
