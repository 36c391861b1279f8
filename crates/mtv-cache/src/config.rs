//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 20;

/// Settings for the always/never-drawn element cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DrawnCacheConfig {
    /// Quiet period after the last set change before the set is re-queried.
    pub debounce_ms: u64,
}

impl Default for DrawnCacheConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl DrawnCacheConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
