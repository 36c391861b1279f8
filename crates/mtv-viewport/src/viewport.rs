//! The viewport capability consumed by the visibility engine.

use std::collections::BTreeSet;

use mtv_common::Event;
use mtv_model::{CategoryOverride, Id, SetType};
use serde::{Deserialize, Serialize};

/// A per-model category override entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerModelCategoryOverride {
    pub model_id: Id,
    pub category_id: Id,
    /// `true` for show, `false` for hide.
    pub visible: bool,
}

impl PerModelCategoryOverride {
    pub fn value(&self) -> CategoryOverride {
        if self.visible {
            CategoryOverride::Show
        } else {
            CategoryOverride::Hide
        }
    }
}

/// Change events raised by a viewport.
///
/// Each event is raised after the corresponding state change has been applied.
#[derive(Debug, Default)]
pub struct ViewportEvents {
    pub always_drawn_changed: Event<()>,
    pub never_drawn_changed: Event<()>,
    /// Sub-category display or other display style properties changed.
    pub display_style_changed: Event<()>,
    pub viewed_categories_changed: Event<()>,
    pub viewed_categories_per_model_changed: Event<()>,
    pub viewed_models_changed: Event<()>,
}

impl ViewportEvents {
    /// Event raised when the given override set changes.
    pub fn drawn_changed(&self, set_type: SetType) -> &Event<()> {
        match set_type {
            SetType::Always => &self.always_drawn_changed,
            SetType::Never => &self.never_drawn_changed,
        }
    }

    /// Events affecting model, category or sub-category display.
    pub fn display_events(&self) -> [&Event<()>; 4] {
        [
            &self.display_style_changed,
            &self.viewed_categories_changed,
            &self.viewed_categories_per_model_changed,
            &self.viewed_models_changed,
        ]
    }

    /// Every event this viewport raises.
    pub fn all(&self) -> [&Event<()>; 6] {
        [
            &self.always_drawn_changed,
            &self.never_drawn_changed,
            &self.display_style_changed,
            &self.viewed_categories_changed,
            &self.viewed_categories_per_model_changed,
            &self.viewed_models_changed,
        ]
    }
}

/// Display state of a 3D view.
///
/// Precedence among the settings, most authoritative first: model display,
/// never-drawn membership, always-drawn membership, per-model category
/// override, category and sub-category display.
///
/// Implementations use interior mutability and raise the matching
/// [`ViewportEvents`] event after every write.
pub trait Viewport: Send + Sync {
    /// Elements drawn regardless of model and category display. `None` when
    /// the viewport has no such set.
    fn always_drawn(&self) -> Option<BTreeSet<Id>>;

    /// Elements never drawn. `None` when the viewport has no such set.
    fn never_drawn(&self) -> Option<BTreeSet<Id>>;

    fn per_model_category_override(&self, model_id: &Id, category_id: &Id) -> CategoryOverride;

    fn per_model_category_overrides(&self) -> Vec<PerModelCategoryOverride>;

    fn views_model(&self, model_id: &Id) -> bool;

    fn views_category(&self, category_id: &Id) -> bool;

    fn views_sub_category(&self, sub_category_id: &Id) -> bool;

    /// Whether the view shows spatial (3D) models.
    fn is_spatial_view(&self) -> bool;

    fn change_model_display(&self, model_ids: &BTreeSet<Id>, on: bool);

    /// Changes category display. With `enable_all_sub_categories`, turning a
    /// category on also turns on all of its sub-categories.
    fn change_category_display(
        &self,
        category_ids: &BTreeSet<Id>,
        on: bool,
        enable_all_sub_categories: bool,
    );

    fn change_sub_category_display(&self, sub_category_id: &Id, on: bool);

    fn set_always_drawn(&self, element_ids: BTreeSet<Id>);

    fn clear_always_drawn(&self);

    fn set_never_drawn(&self, element_ids: BTreeSet<Id>);

    fn clear_never_drawn(&self);

    /// Sets the override for every (model, category) pair. Setting
    /// [`CategoryOverride::None`] removes the entries.
    fn set_per_model_category_override(
        &self,
        model_ids: &BTreeSet<Id>,
        category_ids: &BTreeSet<Id>,
        value: CategoryOverride,
    );

    /// Removes all overrides of the given models, or of every model.
    fn clear_per_model_category_overrides(&self, model_ids: Option<&BTreeSet<Id>>);

    fn events(&self) -> &ViewportEvents;

    /// Current contents of an override set, empty when the set is absent.
    fn drawn(&self, set_type: SetType) -> BTreeSet<Id> {
        match set_type {
            SetType::Always => self.always_drawn(),
            SetType::Never => self.never_drawn(),
        }
        .unwrap_or_default()
    }

    fn set_drawn(&self, set_type: SetType, element_ids: BTreeSet<Id>) {
        match set_type {
            SetType::Always => self.set_always_drawn(element_ids),
            SetType::Never => self.set_never_drawn(element_ids),
        }
    }

    fn clear_drawn(&self, set_type: SetType) {
        match set_type {
            SetType::Always => self.clear_always_drawn(),
            SetType::Never => self.clear_never_drawn(),
        }
    }
}
