//! Data model shared by the model tree visibility crates.
//!
//! This crate holds the plain types every other crate speaks:
//!
//! - **Identity** (`ids`): element ids, instance keys and entity kinds
//! - **Hierarchy** (`node`): hierarchy nodes handed in by the tree, filter paths
//! - **Status** (`status`): tri-state visibility and its merge law
//! - **Targets** (`targets`): type-partitioned ids collected from a filtered subtree
//! - **Overrides** (`overrides`): per-model category overrides and override set types
//!
//! # Merge law
//!
//! ```
//! use mtv_model::VisibilityState;
//!
//! assert_eq!(VisibilityState::Visible.merge(VisibilityState::Visible), VisibilityState::Visible);
//! assert_eq!(VisibilityState::Visible.merge(VisibilityState::Hidden), VisibilityState::Partial);
//! ```

pub mod ids;
pub mod node;
pub mod overrides;
pub mod status;
pub mod targets;

pub use ids::{EntityKind, Id, InstanceKey};
pub use node::{FilterPath, HierarchyNode, NodeFiltering, NodeKey, PathSegment};
pub use overrides::{CategoryOverride, SetType};
pub use status::{StatusMerger, VisibilityState, VisibilityStatus};
pub use targets::FilterTargets;
