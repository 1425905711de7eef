use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] stash_store::StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] stash_queue::QueueError),
}

impl SdkError {
    /// Returns `true` if the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
