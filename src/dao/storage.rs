use std::error::Error;
use thiserror::Error;

/// Result alias for remote store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by document store backends regardless of the underlying database.
///
/// Subscription-level failures travel through the live streams as `Err` items;
/// mutation failures are returned to the caller unchanged.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{backend} store unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(
        backend: &'static str,
        message: String,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            backend,
            message,
            source: Box::new(source),
        }
    }

    /// Name of the backend that produced the error.
    pub fn backend(&self) -> &'static str {
        match self {
            StorageError::Unavailable { backend, .. } => backend,
        }
    }
}
