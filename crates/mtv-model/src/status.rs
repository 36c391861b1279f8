//! Tri-state visibility.

use serde::{Deserialize, Serialize};

/// Whether an entity is displayed.
///
/// `Partial` means some, but not all, of the relevant descendants are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityState {
    Visible,
    Hidden,
    Partial,
}

impl VisibilityState {
    /// Merges two sibling states.
    ///
    /// Commutative and associative; `Partial` absorbs everything and a
    /// `Visible`/`Hidden` mix yields `Partial`.
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Partial
        }
    }

    /// Merges all states; `None` when there are none.
    pub fn merge_all(states: impl IntoIterator<Item = Self>) -> Option<Self> {
        let mut merger = StatusMerger::new();
        for state in states {
            if merger.push(state).is_partial() {
                break;
            }
        }
        merger.state()
    }

    pub fn from_displayed(displayed: bool) -> Self {
        if displayed {
            Self::Visible
        } else {
            Self::Hidden
        }
    }
}

/// Visibility of one hierarchy node as reported to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityStatus {
    pub state: VisibilityState,
    /// The node's checkbox cannot be toggled.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_disabled: bool,
}

impl VisibilityStatus {
    pub fn new(state: VisibilityState) -> Self {
        Self {
            state,
            is_disabled: false,
        }
    }

    pub fn visible() -> Self {
        Self::new(VisibilityState::Visible)
    }

    pub fn hidden() -> Self {
        Self::new(VisibilityState::Hidden)
    }

    pub fn partial() -> Self {
        Self::new(VisibilityState::Partial)
    }

    /// Status reported when a computation completed without producing a value.
    pub fn fallback() -> Self {
        Self::hidden().disabled()
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.is_disabled = true;
        self
    }

    /// Merges two statuses. The result is disabled only if both are.
    pub fn merge(self, other: Self) -> Self {
        Self {
            state: self.state.merge(other.state),
            is_disabled: self.is_disabled && other.is_disabled,
        }
    }
}

impl From<VisibilityState> for VisibilityStatus {
    fn from(state: VisibilityState) -> Self {
        Self::new(state)
    }
}

/// Incremental merge of sibling states with early partial detection.
///
/// ```
/// use mtv_model::{StatusMerger, VisibilityState};
///
/// let mut merger = StatusMerger::new();
/// merger.push(VisibilityState::Visible);
/// assert!(!merger.is_partial());
/// merger.push(VisibilityState::Hidden);
/// assert!(merger.is_partial());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusMerger {
    state: Option<VisibilityState>,
}

impl StatusMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one contributor.
    pub fn push(&mut self, state: VisibilityState) -> &mut Self {
        self.state = Some(match self.state {
            Some(current) => current.merge(state),
            None => state,
        });
        self
    }

    /// Further contributors can no longer change the result.
    pub fn is_partial(&self) -> bool {
        self.state == Some(VisibilityState::Partial)
    }

    /// Merged state, `None` if nothing was pushed.
    pub fn state(&self) -> Option<VisibilityState> {
        self.state
    }

    /// Merged state, `default` if nothing was pushed.
    pub fn state_or(&self, default: VisibilityState) -> VisibilityState {
        self.state.unwrap_or(default)
    }
}
