//! Visibility error types.
//!
//! Errors carry a user-facing message and, where one exists, a hint on how to
//! resolve them.

use mtv_cache::CacheError;
use mtv_filter::FilterError;
use mtv_model::EntityKind;
use mtv_query::QueryError;
use thiserror::Error;

/// Visibility handler error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisibilityError {
    /// A hierarchy query failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The filtered tree could not be built.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A node lacks data its kind requires.
    #[error("{kind} node is missing its {field}")]
    MissingNodeData {
        kind: EntityKind,
        field: &'static str,
    },

    /// The handler was created outside a tokio runtime.
    #[error("Visibility handler requires a tokio runtime")]
    NoRuntime,

    /// The handler has been disposed.
    #[error("Visibility handler has been disposed")]
    Disposed,
}

/// Cache failures surface as the underlying condition.
impl From<CacheError> for VisibilityError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Query(err) => Self::Query(err),
            CacheError::NoRuntime => Self::NoRuntime,
            CacheError::Disposed => Self::Disposed,
        }
    }
}

impl VisibilityError {
    pub(crate) fn missing(kind: EntityKind, field: &'static str) -> Self {
        Self::MissingNodeData { kind, field }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Query(err) => !matches!(err, QueryError::Decode { .. }),
            Self::Filter(FilterError::Query(_)) => true,
            Self::Filter(_) | Self::MissingNodeData { .. } | Self::NoRuntime | Self::Disposed => {
                false
            }
        }
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Query(_) => {
                Some("Request the visibility again once the data source is available.".into())
            }
            Self::Filter(FilterError::UnresolvableSegment { .. }) => Some(
                "Make sure the filter paths were produced for the hierarchy shown by this tree."
                    .into(),
            ),
            Self::Filter(_) => None,
            Self::MissingNodeData { kind, field } => Some(format!(
                "Provide the {field} when building {kind} nodes of the hierarchy."
            )),
            Self::NoRuntime => {
                Some("Create the handler from within a tokio runtime context.".into())
            }
            Self::Disposed => Some("Create a new handler for the viewport.".into()),
        }
    }
}

/// Result type alias for visibility operations.
pub type Result<T> = std::result::Result<T, VisibilityError>;
