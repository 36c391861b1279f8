//! Visibility changes, planned against a consistent read and applied in one go.

use std::collections::{BTreeMap, BTreeSet};

use mtv_model::{CategoryOverride, EntityKind, FilterTargets, HierarchyNode, Id, SetType};
use mtv_viewport::Viewport;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisibilityError};
use crate::status::{VisibilityAggregator, element_context};

/// One mutation of viewport display state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ViewportWrite {
    ChangeModelDisplay {
        model_ids: BTreeSet<Id>,
        on: bool,
    },
    ChangeCategoryDisplay {
        category_ids: BTreeSet<Id>,
        on: bool,
        enable_all_sub_categories: bool,
    },
    ChangeSubCategoryDisplay {
        sub_category_id: Id,
        on: bool,
    },
    SetPerModelCategoryOverride {
        model_ids: BTreeSet<Id>,
        category_ids: BTreeSet<Id>,
        value: CategoryOverride,
    },
    ClearPerModelCategoryOverrides {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_ids: Option<BTreeSet<Id>>,
    },
    /// Adds elements to an override set, keeping its other members.
    AddToDrawn {
        set_type: SetType,
        element_ids: BTreeSet<Id>,
    },
    /// Removes elements from an override set, keeping its other members.
    RemoveFromDrawn {
        set_type: SetType,
        element_ids: BTreeSet<Id>,
    },
}

impl ViewportWrite {
    /// Applies the write. Returns `false` when it would not change anything.
    pub fn apply(&self, viewport: &dyn Viewport) -> bool {
        match self {
            Self::ChangeModelDisplay { model_ids, on } => {
                if model_ids.iter().all(|id| viewport.views_model(id) == *on) {
                    return false;
                }
                viewport.change_model_display(model_ids, *on);
            }
            Self::ChangeCategoryDisplay {
                category_ids,
                on,
                enable_all_sub_categories,
            } => {
                let unchanged = category_ids.iter().all(|id| viewport.views_category(id) == *on);
                if category_ids.is_empty() || (unchanged && !(*on && *enable_all_sub_categories)) {
                    return false;
                }
                viewport.change_category_display(category_ids, *on, *enable_all_sub_categories);
            }
            Self::ChangeSubCategoryDisplay {
                sub_category_id,
                on,
            } => {
                if viewport.views_sub_category(sub_category_id) == *on {
                    return false;
                }
                viewport.change_sub_category_display(sub_category_id, *on);
            }
            Self::SetPerModelCategoryOverride {
                model_ids,
                category_ids,
                value,
            } => {
                let unchanged = model_ids.iter().all(|model_id| {
                    category_ids.iter().all(|category_id| {
                        viewport.per_model_category_override(model_id, category_id) == *value
                    })
                });
                if unchanged {
                    return false;
                }
                viewport.set_per_model_category_override(model_ids, category_ids, *value);
            }
            Self::ClearPerModelCategoryOverrides { model_ids } => {
                let any = viewport
                    .per_model_category_overrides()
                    .iter()
                    .any(|entry| {
                        model_ids
                            .as_ref()
                            .is_none_or(|ids| ids.contains(&entry.model_id))
                    });
                if !any {
                    return false;
                }
                viewport.clear_per_model_category_overrides(model_ids.as_ref());
            }
            Self::AddToDrawn {
                set_type,
                element_ids,
            } => {
                let mut current = viewport.drawn(*set_type);
                if element_ids.is_subset(&current) {
                    return false;
                }
                current.extend(element_ids.iter().cloned());
                viewport.set_drawn(*set_type, current);
            }
            Self::RemoveFromDrawn {
                set_type,
                element_ids,
            } => {
                let current = viewport.drawn(*set_type);
                if current.is_disjoint(element_ids) {
                    return false;
                }
                viewport.set_drawn(*set_type, current.difference(element_ids).cloned().collect());
            }
        }
        true
    }
}

/// Ordered viewport writes implementing one visibility change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangePlan {
    writes: Vec<ViewportWrite>,
}

impl ChangePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: ViewportWrite) {
        self.writes.push(write);
    }

    pub fn extend(&mut self, other: ChangePlan) {
        self.writes.extend(other.writes);
    }

    pub fn writes(&self) -> &[ViewportWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Applies all writes in order and returns how many changed the viewport.
    pub fn apply(&self, viewport: &dyn Viewport) -> usize {
        let mut applied = 0;
        for write in &self.writes {
            if write.apply(viewport) {
                applied += 1;
            } else {
                tracing::trace!(?write, "skipping no-op write");
            }
        }
        applied
    }

    fn push_drawn_removal(&mut self, set_type: SetType, element_ids: BTreeSet<Id>) {
        if !element_ids.is_empty() {
            self.push(ViewportWrite::RemoveFromDrawn {
                set_type,
                element_ids,
            });
        }
    }

    fn push_override(
        &mut self,
        model_ids: BTreeSet<Id>,
        category_ids: BTreeSet<Id>,
        value: CategoryOverride,
    ) {
        if !model_ids.is_empty() && !category_ids.is_empty() {
            self.push(ViewportWrite::SetPerModelCategoryOverride {
                model_ids,
                category_ids,
                value,
            });
        }
    }
}

impl VisibilityAggregator {
    /// Plans turning a hierarchy node on or off.
    pub async fn plan_node_change(&self, node: &HierarchyNode, on: bool) -> Result<ChangePlan> {
        let ids: BTreeSet<Id> = node.ids().into_iter().collect();
        if ids.is_empty() {
            return Ok(ChangePlan::new());
        }
        tracing::trace!(kind = %node.kind, ids = ids.len(), on, "planning node change");
        match node.kind {
            EntityKind::Subject => {
                let models = self.ids.subject_models(&ids).await?;
                self.plan_models(&models, on).await
            }
            EntityKind::Model => self.plan_models(&ids, on).await,
            EntityKind::Category => match &node.model_id {
                Some(model_id) => self.plan_model_categories(model_id, &ids, on).await,
                None => self.plan_categories(&ids, on).await,
            },
            EntityKind::SubCategory => {
                let category_id = node
                    .category_id
                    .as_ref()
                    .ok_or_else(|| VisibilityError::missing(node.kind, "category id"))?;
                self.plan_sub_categories(category_id, &ids, on).await
            }
            EntityKind::Element => {
                let (model_id, category_id) = element_context(node)?;
                self.plan_elements(model_id, category_id, &ids, on, &BTreeSet::new())
                    .await
            }
            EntityKind::DefinitionContainer => {
                let categories = self.ids.definition_container_categories(&ids).await?;
                self.plan_categories(&categories, on).await
            }
            EntityKind::Classification | EntityKind::ClassificationTable => {
                let categories = self.ids.classification_categories_of(&ids).await?;
                self.plan_categories(&categories, on).await
            }
        }
    }

    /// Plans a change of everything a filtered node stands for.
    pub async fn plan_filter_targets_change(
        &self,
        targets: &FilterTargets,
        on: bool,
    ) -> Result<ChangePlan> {
        let mut plan = ChangePlan::new();
        if !targets.subject_ids.is_empty() {
            let models = self.ids.subject_models(&targets.subject_ids).await?;
            plan.extend(self.plan_models(&models, on).await?);
        }
        if !targets.model_ids.is_empty() {
            plan.extend(self.plan_models(&targets.model_ids, on).await?);
        }
        if !targets.categories.is_empty() {
            plan.extend(self.plan_categories(&targets.categories, on).await?);
        }
        for (model_id, category_ids) in &targets.model_categories {
            plan.extend(self.plan_model_categories(model_id, category_ids, on).await?);
        }
        for (category_id, sub_category_ids) in &targets.sub_categories {
            plan.extend(self.plan_sub_categories(category_id, sub_category_ids, on).await?);
        }
        if !targets.definition_containers.is_empty() {
            let categories = self
                .ids
                .definition_container_categories(&targets.definition_containers)
                .await?;
            plan.extend(self.plan_categories(&categories, on).await?);
        }
        let classification_ids: BTreeSet<Id> = targets
            .classification_tables
            .union(&targets.classifications)
            .cloned()
            .collect();
        if !classification_ids.is_empty() {
            let categories = self.ids.classification_categories_of(&classification_ids).await?;
            plan.extend(self.plan_categories(&categories, on).await?);
        }
        for (model_id, categories) in &targets.elements {
            // Groups of one model must not evict each other's always-drawn members.
            let model_elements: BTreeSet<Id> = categories.values().flatten().cloned().collect();
            for (category_id, element_ids) in categories {
                plan.extend(
                    self.plan_elements(model_id, category_id, element_ids, on, &model_elements)
                        .await?,
                );
            }
        }
        Ok(plan)
    }

    /// Models on: overrides cleared, model and its categories displayed.
    /// Models off: display off, overrides cleared. Either way the models'
    /// always/never-drawn elements are released.
    pub async fn plan_models(&self, model_ids: &BTreeSet<Id>, on: bool) -> Result<ChangePlan> {
        let mut plan = ChangePlan::new();
        if model_ids.is_empty() {
            return Ok(plan);
        }
        if on {
            plan.push(ViewportWrite::ClearPerModelCategoryOverrides {
                model_ids: Some(model_ids.clone()),
            });
            plan.push(ViewportWrite::ChangeModelDisplay {
                model_ids: model_ids.clone(),
                on: true,
            });
            let mut categories = BTreeSet::new();
            for model_id in model_ids {
                categories.extend(self.ids.model_categories(model_id).await?.iter().cloned());
            }
            if !categories.is_empty() {
                plan.push(ViewportWrite::ChangeCategoryDisplay {
                    category_ids: categories,
                    on: true,
                    enable_all_sub_categories: true,
                });
            }
        } else {
            plan.push(ViewportWrite::ChangeModelDisplay {
                model_ids: model_ids.clone(),
                on: false,
            });
            plan.push(ViewportWrite::ClearPerModelCategoryOverrides {
                model_ids: Some(model_ids.clone()),
            });
        }
        for set_type in SetType::BOTH {
            let mut elements = BTreeSet::new();
            for model_id in model_ids {
                elements.extend(self.drawn.get_elements(set_type, Some(model_id), None).await?);
            }
            plan.push_drawn_removal(set_type, elements);
        }
        Ok(plan)
    }

    /// Categories of one model, changed through per-model overrides.
    pub async fn plan_model_categories(
        &self,
        model_id: &Id,
        category_ids: &BTreeSet<Id>,
        on: bool,
    ) -> Result<ChangePlan> {
        let mut plan = ChangePlan::new();
        if category_ids.is_empty() {
            return Ok(plan);
        }
        let models = BTreeSet::from([model_id.clone()]);
        if on {
            if !self.viewport.views_model(model_id) {
                let others: BTreeSet<Id> = self
                    .ids
                    .model_categories(model_id)
                    .await?
                    .iter()
                    .filter(|id| !category_ids.contains(*id))
                    .cloned()
                    .collect();
                plan.extend(
                    self.plan_show_model_exclusively(model_id, others, &BTreeSet::new())
                        .await?,
                );
            }
            plan.push_override(models, category_ids.clone(), CategoryOverride::Show);
            plan.push_drawn_removal(
                SetType::Never,
                self.drawn
                    .get_elements(SetType::Never, Some(model_id), Some(category_ids))
                    .await?,
            );
        } else {
            plan.push_override(models, category_ids.clone(), CategoryOverride::Hide);
            plan.push_drawn_removal(
                SetType::Always,
                self.drawn
                    .get_elements(SetType::Always, Some(model_id), Some(category_ids))
                    .await?,
            );
        }
        Ok(plan)
    }

    /// Categories across every model containing them.
    pub async fn plan_categories(
        &self,
        category_ids: &BTreeSet<Id>,
        on: bool,
    ) -> Result<ChangePlan> {
        let mut plan = ChangePlan::new();
        if category_ids.is_empty() {
            return Ok(plan);
        }
        let mut models = BTreeSet::new();
        for category_id in category_ids {
            models.extend(self.ids.category_models(category_id).await?);
        }
        if on {
            for model_id in &models {
                if self.viewport.views_model(model_id) {
                    continue;
                }
                let others: BTreeSet<Id> = self
                    .ids
                    .model_categories(model_id)
                    .await?
                    .iter()
                    .filter(|id| !category_ids.contains(*id))
                    .cloned()
                    .collect();
                plan.extend(
                    self.plan_show_model_exclusively(model_id, others, &BTreeSet::new())
                        .await?,
                );
            }
        }
        plan.push(ViewportWrite::ChangeCategoryDisplay {
            category_ids: category_ids.clone(),
            on,
            enable_all_sub_categories: on,
        });
        plan.push_override(models, category_ids.clone(), CategoryOverride::None);
        let released = if on { SetType::Never } else { SetType::Always };
        plan.push_drawn_removal(
            released,
            self.drawn
                .get_elements(released, None, Some(category_ids))
                .await?,
        );
        Ok(plan)
    }

    pub async fn plan_sub_categories(
        &self,
        category_id: &Id,
        sub_category_ids: &BTreeSet<Id>,
        on: bool,
    ) -> Result<ChangePlan> {
        let mut plan = ChangePlan::new();
        if on {
            let categories = BTreeSet::from([category_id.clone()]);
            if !self.viewport.views_category(category_id) {
                plan.push(ViewportWrite::ChangeCategoryDisplay {
                    category_ids: categories.clone(),
                    on: true,
                    enable_all_sub_categories: false,
                });
            }
            let hidden_in: BTreeSet<Id> = self
                .ids
                .category_models(category_id)
                .await?
                .into_iter()
                .filter(|model_id| {
                    self.viewport.per_model_category_override(model_id, category_id)
                        == CategoryOverride::Hide
                })
                .collect();
            plan.push_override(hidden_in, categories, CategoryOverride::None);
        }
        for sub_category_id in sub_category_ids {
            plan.push(ViewportWrite::ChangeSubCategoryDisplay {
                sub_category_id: sub_category_id.clone(),
                on,
            });
        }
        Ok(plan)
    }

    /// Elements of one model and category, with their child elements.
    ///
    /// Turning elements on that their category would not display puts them in
    /// the always-drawn set. A hidden model is displayed with all of its
    /// categories hidden, and a hidden category is displayed with per-model
    /// hide overrides, so only the requested elements appear. Members of
    /// `keep` survive the eviction of the model's other always-drawn elements.
    pub async fn plan_elements(
        &self,
        model_id: &Id,
        category_id: &Id,
        element_ids: &BTreeSet<Id>,
        on: bool,
        keep: &BTreeSet<Id>,
    ) -> Result<ChangePlan> {
        let mut plan = ChangePlan::new();
        if element_ids.is_empty() {
            return Ok(plan);
        }
        let model_viewed = self.viewport.views_model(model_id);
        let mut elements = element_ids.clone();
        // Elements their own category shows without an override.
        let mut displayed = BTreeSet::new();
        if model_viewed && self.category_displays_elements(model_id, category_id).await? {
            displayed.extend(element_ids.iter().cloned());
        }
        let children = self.ids.element_descendants(element_ids).await?;
        let mut category_displays = BTreeMap::new();
        for child in children.iter() {
            elements.insert(child.id.clone());
            if !model_viewed {
                continue;
            }
            let shown = match category_displays.get(&child.category_id) {
                Some(shown) => *shown,
                None => {
                    let shown = self
                        .category_displays_elements(model_id, &child.category_id)
                        .await?;
                    category_displays.insert(child.category_id.clone(), shown);
                    shown
                }
            };
            if shown {
                displayed.insert(child.id.clone());
            }
        }

        if on {
            if !model_viewed {
                let mut hide: BTreeSet<Id> =
                    self.ids.model_categories(model_id).await?.iter().cloned().collect();
                hide.insert(category_id.clone());
                let keep: BTreeSet<Id> = keep.union(&elements).cloned().collect();
                plan.extend(self.plan_show_model_exclusively(model_id, hide, &keep).await?);
            }
            if !self.viewport.views_category(category_id) {
                let categories = BTreeSet::from([category_id.clone()]);
                plan.push(ViewportWrite::ChangeCategoryDisplay {
                    category_ids: categories.clone(),
                    on: true,
                    enable_all_sub_categories: false,
                });
                let mut models = self.ids.category_models(category_id).await?;
                models.insert(model_id.clone());
                let unset: BTreeSet<Id> = models
                    .into_iter()
                    .filter(|id| {
                        self.viewport.per_model_category_override(id, category_id)
                            == CategoryOverride::None
                    })
                    .collect();
                plan.push_override(unset, categories, CategoryOverride::Hide);
            }
            let hidden: BTreeSet<Id> = elements.difference(&displayed).cloned().collect();
            if !hidden.is_empty() {
                plan.push(ViewportWrite::AddToDrawn {
                    set_type: SetType::Always,
                    element_ids: hidden,
                });
            }
            let never = self
                .drawn
                .get_elements(SetType::Never, Some(model_id), None)
                .await?;
            plan.push_drawn_removal(
                SetType::Never,
                never.intersection(&elements).cloned().collect(),
            );
        } else {
            let always = self
                .drawn
                .get_elements(SetType::Always, Some(model_id), None)
                .await?;
            plan.push_drawn_removal(
                SetType::Always,
                always.intersection(&elements).cloned().collect(),
            );
            if !displayed.is_empty() {
                plan.push(ViewportWrite::AddToDrawn {
                    set_type: SetType::Never,
                    element_ids: displayed,
                });
            }
        }
        Ok(plan)
    }

    /// Displays a hidden model with the given categories hidden and their
    /// always-drawn elements, other than `keep`, released.
    async fn plan_show_model_exclusively(
        &self,
        model_id: &Id,
        hide_categories: BTreeSet<Id>,
        keep: &BTreeSet<Id>,
    ) -> Result<ChangePlan> {
        let mut plan = ChangePlan::new();
        let models = BTreeSet::from([model_id.clone()]);
        plan.push(ViewportWrite::ChangeModelDisplay {
            model_ids: models.clone(),
            on: true,
        });
        if hide_categories.is_empty() {
            return Ok(plan);
        }
        let always = self
            .drawn
            .get_elements(SetType::Always, Some(model_id), Some(&hide_categories))
            .await?;
        plan.push_override(models, hide_categories, CategoryOverride::Hide);
        plan.push_drawn_removal(SetType::Always, always.difference(keep).cloned().collect());
        Ok(plan)
    }
}
