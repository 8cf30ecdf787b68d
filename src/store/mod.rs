pub mod bigquery;
pub mod memory;
pub mod traits;

pub use bigquery::BigQueryStore;
pub use memory::MemoryStore;
pub use traits::{RecordStore, StoreResult};
