use crate::capture::page_hints::PageHints;
use crate::capture::traits::{ListingExtractor, PageCapturer};
use crate::capture::types::{CaptureOutcome, CaptureStage, CaptureStatus};
use crate::store::RecordStore;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Screenshot-then-extract loop over a list of listing URLs
pub struct CapturePipeline {
    capturer: Arc<dyn PageCapturer>,
    extractor: Arc<dyn ListingExtractor>,
    output_dir: Option<PathBuf>,
}

impl CapturePipeline {
    pub fn new(capturer: Arc<dyn PageCapturer>, extractor: Arc<dyn ListingExtractor>) -> Self {
        Self {
            capturer,
            extractor,
            output_dir: None,
        }
    }

    /// Also write each screenshot to `dir/screenshot_<n>.png`
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Process URLs one at a time; a failing URL is recorded and the batch moves on
    pub async fn run(&self, urls: &[String]) -> Result<Vec<CaptureOutcome>> {
        if let Some(dir) = &self.output_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        info!(
            "Capturing {} pages with {} + {}",
            urls.len(),
            self.capturer.capturer_name(),
            self.extractor.extractor_name()
        );

        let mut outcomes = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            let status = self.process(i, url).await;
            if let CaptureStatus::Failed { stage, reason } = &status {
                warn!("❌ {} failed at {:?}: {}", url, stage, reason);
            }
            outcomes.push(CaptureOutcome {
                url: url.clone(),
                status,
            });
        }

        let captured = outcomes.iter().filter(|o| o.is_captured()).count();
        info!("Capture run finished: {}/{} succeeded", captured, outcomes.len());
        Ok(outcomes)
    }

    async fn process(&self, index: usize, url: &str) -> CaptureStatus {
        let capturer = Arc::clone(&self.capturer);
        let target = url.to_string();
        let page = match tokio::task::spawn_blocking(move || capturer.capture(&target)).await {
            Ok(Ok(page)) => page,
            Ok(Err(err)) => return failed(CaptureStage::Screenshot, format!("{:#}", err)),
            Err(join_err) => return failed(CaptureStage::Screenshot, join_err.to_string()),
        };

        if let Some(dir) = &self.output_dir {
            let path = dir.join(format!("screenshot_{}.png", index + 1));
            if let Err(err) = tokio::fs::write(&path, &page.screenshot).await {
                warn!("Could not save {}: {}", path.display(), err);
            } else {
                info!("💾 Saved screenshot to {}", path.display());
            }
        }

        match self.extractor.extract(&page).await {
            Ok(mut listing) => {
                let hints = PageHints::from_html(&page.html);
                hints.fill(&mut listing);
                CaptureStatus::Captured {
                    screenshot: page.screenshot,
                    listing,
                }
            }
            Err(err) => failed(CaptureStage::Extraction, format!("{:#}", err)),
        }
    }

    /// Insert every successful outcome as a new unvalidated record
    pub async fn save<S>(store: &S, outcomes: &[CaptureOutcome]) -> Result<u64>
    where
        S: RecordStore + ?Sized,
    {
        let records: Vec<_> = outcomes
            .iter()
            .filter_map(|o| {
                o.listing()
                    .map(|l| l.clone().into_record(Uuid::new_v4().to_string(), &o.url))
            })
            .collect();
        if records.is_empty() {
            info!("Nothing to save");
            return Ok(0);
        }

        store
            .ensure_table()
            .await
            .context("Failed to ensure records table exists")?;
        let inserted = store
            .insert(&records)
            .await
            .context("Failed to insert captured records")?;

        info!("💾 Saved {} captured listings to {}", inserted, store.store_name());
        Ok(inserted)
    }
}

fn failed(stage: CaptureStage, reason: String) -> CaptureStatus {
    CaptureStatus::Failed { stage, reason }
}
