//! Query error types.

use thiserror::Error;

/// Error raised while running a hierarchy query.
///
/// Messages are stored as strings so a failed query can be replayed to every
/// caller that shared it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// A newer query with the same restart token cancelled this one.
    ///
    /// Never surfaces from [`QueryProvider`](crate::QueryProvider); it is treated
    /// as "no results".
    #[error("Query was interrupted by a newer query")]
    Interrupted,

    /// The data source failed.
    #[error("Query '{query}' failed: {message}")]
    Failed {
        /// Name of the query shape.
        query: &'static str,
        /// Description reported by the source.
        message: String,
    },

    /// A row did not have the expected shape.
    #[error("Failed to decode '{query}' row: {message}")]
    Decode {
        /// Name of the query shape.
        query: &'static str,
        /// Decoder message.
        message: String,
    },
}

impl QueryError {
    pub fn failed(query: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            query,
            message: message.into(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
