//! Hierarchy visibility for a model tree.
//!
//! [`HierarchyVisibilityHandler`] is the entry point: it answers whether a
//! hierarchy node is visible, hidden or partially visible in a viewport, turns
//! nodes on and off, and tells its listeners when visibility may have changed.
//!
//! - [`VisibilityAggregator`] computes statuses per entity kind from viewport
//!   state, the always/never-drawn cache and hierarchy id lookups
//! - [`ChangePlan`] holds the viewport writes implementing one change
//! - [`HandlerConfig`] carries debounce windows and class resolution
//!
//! # Example
//!
//! ```ignore
//! let handler = HierarchyVisibilityHandler::new(HandlerProps {
//!     viewport,
//!     query_source: source.clone(),
//!     class_inspector: source,
//!     ids_cache: None,
//!     config: HandlerConfig::default(),
//! })?;
//! handler.change_visibility(&node, true).await?;
//! let status = handler.get_visibility_status(&node).await?;
//! ```

mod change;
mod config;
mod error;
mod handler;
mod request;
mod status;

pub use change::{ChangePlan, ViewportWrite};
pub use config::HandlerConfig;
pub use error::{Result, VisibilityError};
pub use handler::{HandlerProps, HandlerSuppression, HierarchyVisibilityHandler};
pub use request::RequestTag;
pub use status::VisibilityAggregator;
