//! Viewport-level display overrides.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-model category override stored by a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryOverride {
    /// No override, the category's own display state applies.
    #[default]
    None,
    Show,
    Hide,
}

/// Which element override set is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetType {
    /// Elements drawn regardless of model and category state.
    Always,
    /// Elements never drawn.
    Never,
}

impl SetType {
    pub const BOTH: [SetType; 2] = [SetType::Always, SetType::Never];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-drawn", self.as_str())
    }
}
