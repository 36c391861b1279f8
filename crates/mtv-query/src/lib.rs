//! Hierarchy queries for the model tree visibility engine.
//!
//! # Layers
//!
//! - [`QuerySource`] / [`ClassInspector`] - capabilities consumed from the
//!   data store: an opaque row producer and class-hierarchy inspection
//! - [`QueryProvider`] - runs the known query shapes and decodes rows,
//!   swallowing "query interrupted" conditions
//! - [`CachingQueryProvider`] - memoizes per-key results, shares in-flight
//!   queries between concurrent callers and derives id lookups (subject to
//!   models, container to categories, ...)
//! - [`MemoryQuerySource`] - in-memory source over [`SceneData`]
//!
//! # Example
//!
//! ```ignore
//! let source = Arc::new(MemoryQuerySource::new(scene));
//! let ids = CachingQueryProvider::new(QueryProvider::new(source));
//! let categories = ids.model_categories(&"0x10".to_string()).await?;
//! ```

mod caching;
mod error;
mod memory;
mod provider;
mod query;
mod rows;

pub use caching::CachingQueryProvider;
pub use error::{QueryError, Result};
pub use memory::{MemoryQuerySource, SceneData, SceneElement};
pub use provider::QueryProvider;
pub use query::{ClassInspector, Query, QueryOptions, QuerySource, Row, RowStream};
pub use rows::{
    CategoryRow, ClassificationCategoryRow, ClassificationRow, DefinitionContainerRow,
    ElementInfoRow, ElementRow, IdRow, ModelRow, SubCategoryRow, SubjectRow,
};
