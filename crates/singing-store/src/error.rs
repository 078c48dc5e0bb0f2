use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("subscription not found: {id}")]
    NotFound { id: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for singing_scheduler::SchedulerError {
    fn from(e: StoreError) -> Self {
        singing_scheduler::SchedulerError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
