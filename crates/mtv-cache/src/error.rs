//! Cache error types.

use mtv_query::QueryError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The element query behind a snapshot failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The cache was created outside a tokio runtime.
    #[error("Drawn element cache requires a tokio runtime")]
    NoRuntime,

    #[error("Drawn element cache has been disposed")]
    Disposed,
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
