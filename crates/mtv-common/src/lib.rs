//! Shared utilities for the model tree visibility crates.
//!
//! - [`Event`] - listener registry with explicit add/remove
//! - [`SuppressionCounter`] - nesting counter with scoped guards
//! - [`Debouncer`] - generation-tagged debounce windows
//! - [`logging`] - `tracing-subscriber` setup

mod debounce;
mod event;
pub mod logging;
mod suppression;

pub use debounce::Debouncer;
pub use event::{Event, ListenerId};
pub use suppression::{SuppressionCounter, SuppressionGuard};

/// Locks a mutex, recovering the data if a previous holder panicked.
pub fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
