//! In-memory viewport.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use mtv_common::{Event, lock};
use mtv_model::{CategoryOverride, Id};
use serde::{Deserialize, Serialize};

use crate::viewport::{PerModelCategoryOverride, Viewport, ViewportEvents};

/// Display state held by a [`MemoryViewport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewState {
    pub viewed_models: BTreeSet<Id>,
    pub viewed_categories: BTreeSet<Id>,
    pub hidden_sub_categories: BTreeSet<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_drawn: Option<BTreeSet<Id>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub never_drawn: Option<BTreeSet<Id>>,
    /// (model, category) -> shown.
    #[serde(with = "override_list")]
    pub overrides: BTreeMap<(Id, Id), bool>,
    pub spatial: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            viewed_models: BTreeSet::new(),
            viewed_categories: BTreeSet::new(),
            hidden_sub_categories: BTreeSet::new(),
            always_drawn: None,
            never_drawn: None,
            overrides: BTreeMap::new(),
            spatial: true,
        }
    }
}

/// JSON has no tuple keys, so overrides travel as a list.
mod override_list {
    use std::collections::BTreeMap;

    use mtv_model::Id;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::viewport::PerModelCategoryOverride;

    pub fn serialize<S: Serializer>(
        overrides: &BTreeMap<(Id, Id), bool>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<PerModelCategoryOverride> = overrides
            .iter()
            .map(|((model_id, category_id), visible)| PerModelCategoryOverride {
                model_id: model_id.clone(),
                category_id: category_id.clone(),
                visible: *visible,
            })
            .collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<(Id, Id), bool>, D::Error> {
        let list = Vec::<PerModelCategoryOverride>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|entry| ((entry.model_id, entry.category_id), entry.visible))
            .collect())
    }
}

#[derive(Debug, Default)]
struct Inner {
    view: ViewState,
    /// category -> sub-categories, needed to enable all of a category's
    /// sub-categories at once.
    sub_categories: BTreeMap<Id, BTreeSet<Id>>,
}

/// [`Viewport`] over a [`ViewState`] kept in memory.
///
/// Every write raises its event once the state lock has been released, so
/// listeners may read the viewport.
#[derive(Debug, Default)]
pub struct MemoryViewport {
    inner: Mutex<Inner>,
    events: ViewportEvents,
}

impl MemoryViewport {
    pub fn new(view: ViewState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                view,
                sub_categories: BTreeMap::new(),
            }),
            events: ViewportEvents::default(),
        }
    }

    /// Tells the viewport which sub-categories belong to a category.
    pub fn register_sub_categories(
        &self,
        category_id: impl Into<Id>,
        sub_category_ids: impl IntoIterator<Item = Id>,
    ) {
        lock(&self.inner)
            .sub_categories
            .entry(category_id.into())
            .or_default()
            .extend(sub_category_ids);
    }

    /// Copy of the current state.
    pub fn view_state(&self) -> ViewState {
        lock(&self.inner).view.clone()
    }

    pub fn set_spatial(&self, spatial: bool) {
        lock(&self.inner).view.spatial = spatial;
        self.events.display_style_changed.raise(&());
    }

    fn write<R>(&self, event: &Event<()>, apply: impl FnOnce(&mut Inner) -> R) -> R {
        let result = apply(&mut lock(&self.inner));
        event.raise(&());
        result
    }
}

impl Viewport for MemoryViewport {
    fn always_drawn(&self) -> Option<BTreeSet<Id>> {
        lock(&self.inner).view.always_drawn.clone()
    }

    fn never_drawn(&self) -> Option<BTreeSet<Id>> {
        lock(&self.inner).view.never_drawn.clone()
    }

    fn per_model_category_override(&self, model_id: &Id, category_id: &Id) -> CategoryOverride {
        let inner = lock(&self.inner);
        match inner
            .view
            .overrides
            .get(&(model_id.clone(), category_id.clone()))
        {
            Some(true) => CategoryOverride::Show,
            Some(false) => CategoryOverride::Hide,
            None => CategoryOverride::None,
        }
    }

    fn per_model_category_overrides(&self) -> Vec<PerModelCategoryOverride> {
        lock(&self.inner)
            .view
            .overrides
            .iter()
            .map(|((model_id, category_id), visible)| PerModelCategoryOverride {
                model_id: model_id.clone(),
                category_id: category_id.clone(),
                visible: *visible,
            })
            .collect()
    }

    fn views_model(&self, model_id: &Id) -> bool {
        lock(&self.inner).view.viewed_models.contains(model_id)
    }

    fn views_category(&self, category_id: &Id) -> bool {
        lock(&self.inner).view.viewed_categories.contains(category_id)
    }

    fn views_sub_category(&self, sub_category_id: &Id) -> bool {
        !lock(&self.inner)
            .view
            .hidden_sub_categories
            .contains(sub_category_id)
    }

    fn is_spatial_view(&self) -> bool {
        lock(&self.inner).view.spatial
    }

    fn change_model_display(&self, model_ids: &BTreeSet<Id>, on: bool) {
        tracing::trace!(count = model_ids.len(), on, "change model display");
        self.write(&self.events.viewed_models_changed, |inner| {
            let viewed = &mut inner.view.viewed_models;
            if on {
                viewed.extend(model_ids.iter().cloned());
            } else {
                viewed.retain(|id| !model_ids.contains(id));
            }
        });
    }

    fn change_category_display(
        &self,
        category_ids: &BTreeSet<Id>,
        on: bool,
        enable_all_sub_categories: bool,
    ) {
        tracing::trace!(count = category_ids.len(), on, "change category display");
        let sub_categories_changed = self.write(&self.events.viewed_categories_changed, |inner| {
            if !on {
                inner
                    .view
                    .viewed_categories
                    .retain(|id| !category_ids.contains(id));
                return false;
            }
            inner.view.viewed_categories.extend(category_ids.iter().cloned());
            if !enable_all_sub_categories {
                return false;
            }
            let before = inner.view.hidden_sub_categories.len();
            for category_id in category_ids {
                if let Some(subs) = inner.sub_categories.get(category_id) {
                    inner
                        .view
                        .hidden_sub_categories
                        .retain(|id| !subs.contains(id));
                }
            }
            inner.view.hidden_sub_categories.len() != before
        });
        if sub_categories_changed {
            self.events.display_style_changed.raise(&());
        }
    }

    fn change_sub_category_display(&self, sub_category_id: &Id, on: bool) {
        self.write(&self.events.display_style_changed, |inner| {
            let hidden = &mut inner.view.hidden_sub_categories;
            if on {
                hidden.remove(sub_category_id);
            } else {
                hidden.insert(sub_category_id.clone());
            }
        });
    }

    fn set_always_drawn(&self, element_ids: BTreeSet<Id>) {
        tracing::trace!(count = element_ids.len(), "set always-drawn");
        self.write(&self.events.always_drawn_changed, |inner| {
            inner.view.always_drawn = Some(element_ids);
        });
    }

    fn clear_always_drawn(&self) {
        self.write(&self.events.always_drawn_changed, |inner| {
            inner.view.always_drawn = None;
        });
    }

    fn set_never_drawn(&self, element_ids: BTreeSet<Id>) {
        tracing::trace!(count = element_ids.len(), "set never-drawn");
        self.write(&self.events.never_drawn_changed, |inner| {
            inner.view.never_drawn = Some(element_ids);
        });
    }

    fn clear_never_drawn(&self) {
        self.write(&self.events.never_drawn_changed, |inner| {
            inner.view.never_drawn = None;
        });
    }

    fn set_per_model_category_override(
        &self,
        model_ids: &BTreeSet<Id>,
        category_ids: &BTreeSet<Id>,
        value: CategoryOverride,
    ) {
        self.write(&self.events.viewed_categories_per_model_changed, |inner| {
            for model_id in model_ids {
                for category_id in category_ids {
                    let key = (model_id.clone(), category_id.clone());
                    match value {
                        CategoryOverride::Show => inner.view.overrides.insert(key, true),
                        CategoryOverride::Hide => inner.view.overrides.insert(key, false),
                        CategoryOverride::None => inner.view.overrides.remove(&key),
                    };
                }
            }
        });
    }

    fn clear_per_model_category_overrides(&self, model_ids: Option<&BTreeSet<Id>>) {
        self.write(&self.events.viewed_categories_per_model_changed, |inner| {
            match model_ids {
                Some(model_ids) => inner
                    .view
                    .overrides
                    .retain(|(model_id, _), _| !model_ids.contains(model_id)),
                None => inner.view.overrides.clear(),
            }
        });
    }

    fn events(&self) -> &ViewportEvents {
        &self.events
    }
}
