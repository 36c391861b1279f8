//! Handler configuration.

use std::time::Duration;

use mtv_cache::DrawnCacheConfig;
use mtv_filter::ClassResolution;
use serde::{Deserialize, Serialize};

/// Settings for a [`HierarchyVisibilityHandler`](crate::HierarchyVisibilityHandler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HandlerConfig {
    /// Window for coalescing viewport events into one visibility change
    /// notification. Zero means the next scheduler tick.
    pub change_event_debounce_ms: u64,
    pub drawn_cache: DrawnCacheConfig,
    pub class_resolution: ClassResolution,
    /// Report subjects and models as hidden and disabled in views that do not
    /// show spatial models.
    pub disable_in_non_spatial_views: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            change_event_debounce_ms: 0,
            drawn_cache: DrawnCacheConfig::default(),
            class_resolution: ClassResolution::default(),
            disable_in_non_spatial_views: true,
        }
    }
}

impl HandlerConfig {
    /// Parses a configuration from JSON, filling in defaults for missing fields.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn change_event_debounce(&self) -> Duration {
        Duration::from_millis(self.change_event_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        // Unknown fields are ignored.
        let config = HandlerConfig::from_json(r#"{ "drawn_cache": { "debounceMs": 5 } }"#).unwrap();
        assert_eq!(config, HandlerConfig::default());

        let config = HandlerConfig::from_json(r#"{ "drawnCache": { "debounceMs": 5 } }"#).unwrap();
        assert_eq!(config.drawn_cache.debounce_ms, 5);
        assert!(config.disable_in_non_spatial_views);
        assert_eq!(config.change_event_debounce(), Duration::ZERO);
    }

    #[test]
    fn nested_settings_share_one_casing() {
        let config = HandlerConfig::from_json(
            r#"{
                "changeEventDebounceMs": 30,
                "disableInNonSpatialViews": false,
                "drawnCache": { "debounceMs": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.change_event_debounce(), Duration::from_millis(30));
        assert!(!config.disable_in_non_spatial_views);

        let json = serde_json::to_value(HandlerConfig::default()).unwrap();
        assert!(json.get("drawnCache").is_some());
        assert!(json.get("classResolution").is_some());
        assert!(json["drawnCache"].get("debounceMs").is_some());
    }
}
