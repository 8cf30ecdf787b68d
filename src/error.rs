use thiserror::Error;

/// Failures talking to the record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Could not decode store response: {0}")]
    Decode(String),

    #[error("No record matched {0}")]
    NoMatch(String),

    #[error("Query did not complete before the store timed out")]
    Incomplete,

    #[error("Store configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Failures of validation-queue operations.
///
/// Store-backed variants guarantee the queue was left exactly as it was
/// before the call.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Failed to validate {id}: {source}")]
    UpdateFailed {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to delete {id}: {source}")]
    DeleteFailed {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),
}

impl QueueError {
    /// True for errors that came back from the store rather than from a bad call
    pub fn is_store_failure(&self) -> bool {
        !matches!(self, QueueError::PreconditionViolation(_))
    }
}
