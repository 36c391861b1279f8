//! Viewport display state for the model tree visibility engine.
//!
//! [`Viewport`] is the capability the engine reads display state from and
//! writes visibility changes to. [`MemoryViewport`] keeps that state in memory.

mod memory;
mod viewport;

pub use memory::{MemoryViewport, ViewState};
pub use viewport::{PerModelCategoryOverride, Viewport, ViewportEvents};
