pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod explore;
pub mod models;
pub mod queue;
pub mod session;
pub mod store;
pub mod testing;

pub use error::{QueueError, StoreError};
pub use models::{PropertyRecord, RecordFilter, ValidationSummary};
pub use queue::{LoadOutcome, Progress, ValidationQueue};
pub use store::RecordStore;
