//! Always/never-drawn element cache.
//!
//! A viewport keeps two element override sets: elements drawn regardless of
//! model and category display, and elements never drawn. Visibility
//! computations need them grouped by model and category, which takes a query.
//! [`AlwaysAndNeverDrawnElementCache`] runs that query once per burst of set
//! changes and serves the resulting [`CacheEntry`] snapshots.

mod cache;
mod config;
mod entry;
mod error;

pub use cache::{AlwaysAndNeverDrawnElementCache, CacheSuppression};
pub use config::{DEFAULT_DEBOUNCE_MS, DrawnCacheConfig};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
