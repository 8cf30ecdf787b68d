pub mod browser;
pub mod page_hints;
pub mod pipeline;
pub mod search;
pub mod traits;
pub mod types;
pub mod vision;

pub use browser::ChromeCapturer;
pub use page_hints::PageHints;
pub use pipeline::CapturePipeline;
pub use search::ListingSearch;
pub use traits::{ListingExtractor, PageCapturer};
pub use types::{CaptureOutcome, CaptureStage, CaptureStatus, CapturedPage, SearchHit};
pub use vision::VisionExtractor;
