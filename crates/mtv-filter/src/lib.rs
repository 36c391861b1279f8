//! Filtered hierarchy trie.
//!
//! When the tree shows only the paths leading to filter matches, the
//! visibility of a node on such a path is defined by the matched nodes below
//! it rather than by everything the node contains. [`FilteredTree`] records
//! those paths and answers which ids stand in for a given node.

mod error;
mod resolution;
mod tree;

pub use error::{FilterError, Result};
pub use resolution::{ClassPriority, ClassResolution};
pub use tree::{FilteredTree, FilteredTreeNode};
