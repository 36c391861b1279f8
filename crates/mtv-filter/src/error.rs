//! Filtered tree error types.

use mtv_query::QueryError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// A filter path identifier whose class matches none of the known base
    /// classes. The filter path does not belong to this hierarchy.
    #[error("Cannot resolve filter path segment {id} of class '{class_name}'")]
    UnresolvableSegment { class_name: String, id: String },

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Result type alias for filtered tree operations.
pub type Result<T> = std::result::Result<T, FilterError>;
