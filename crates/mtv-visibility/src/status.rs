//! Tri-state visibility aggregation per entity kind.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mtv_cache::AlwaysAndNeverDrawnElementCache;
use mtv_model::{
    CategoryOverride, EntityKind, FilterTargets, HierarchyNode, Id, SetType, StatusMerger,
    VisibilityState, VisibilityStatus,
};
use mtv_query::CachingQueryProvider;
use mtv_viewport::Viewport;

use crate::error::{Result, VisibilityError};

/// Override set contents of one model.
#[derive(Debug, Default)]
pub(crate) struct DrawnSets {
    pub(crate) always: BTreeSet<Id>,
    pub(crate) never: BTreeSet<Id>,
}

/// Computes visibility statuses from viewport state, the always/never-drawn
/// cache and hierarchy id lookups.
///
/// Precedence, most authoritative first: model display, never-drawn
/// membership, always-drawn membership, per-model category override,
/// category and sub-category display. Merging stops at the first `Partial`.
pub struct VisibilityAggregator {
    pub(crate) viewport: Arc<dyn Viewport>,
    pub(crate) ids: Arc<CachingQueryProvider>,
    pub(crate) drawn: Arc<AlwaysAndNeverDrawnElementCache>,
    disable_in_non_spatial_views: bool,
}

impl std::fmt::Debug for VisibilityAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityAggregator")
            .field("disable_in_non_spatial_views", &self.disable_in_non_spatial_views)
            .finish_non_exhaustive()
    }
}

impl VisibilityAggregator {
    pub fn new(
        viewport: Arc<dyn Viewport>,
        ids: Arc<CachingQueryProvider>,
        drawn: Arc<AlwaysAndNeverDrawnElementCache>,
        disable_in_non_spatial_views: bool,
    ) -> Self {
        Self {
            viewport,
            ids,
            drawn,
            disable_in_non_spatial_views,
        }
    }

    /// Status of a hierarchy node, by kind.
    pub async fn node_status(&self, node: &HierarchyNode) -> Result<VisibilityStatus> {
        let ids: BTreeSet<Id> = node.ids().into_iter().collect();
        if ids.is_empty() {
            return Ok(VisibilityStatus::hidden());
        }
        tracing::trace!(kind = %node.kind, ids = ids.len(), "computing node status");
        match node.kind {
            EntityKind::Subject => self.subject_status(&ids).await,
            EntityKind::Model => self.model_status(&ids).await,
            EntityKind::Category => {
                let models = node.model_id.clone().map(|model_id| BTreeSet::from([model_id]));
                self.category_status(&ids, models.as_ref()).await
            }
            EntityKind::SubCategory => {
                let category_id = node
                    .category_id
                    .as_ref()
                    .ok_or_else(|| VisibilityError::missing(node.kind, "category id"))?;
                self.sub_category_status(category_id, &ids).await
            }
            EntityKind::Element => {
                let (model_id, category_id) = element_context(node)?;
                self.element_status(model_id, category_id, &ids, true).await
            }
            EntityKind::DefinitionContainer => self.definition_container_status(&ids).await,
            EntityKind::Classification | EntityKind::ClassificationTable => {
                self.classification_status(&ids).await
            }
        }
    }

    /// Subjects are shown when the models beneath them are.
    pub async fn subject_status(&self, subject_ids: &BTreeSet<Id>) -> Result<VisibilityStatus> {
        if self.is_disabled_view() {
            return Ok(VisibilityStatus::fallback());
        }
        Ok(self.subject_state(subject_ids).await?.into())
    }

    pub async fn model_status(&self, model_ids: &BTreeSet<Id>) -> Result<VisibilityStatus> {
        if self.is_disabled_view() {
            return Ok(VisibilityStatus::fallback());
        }
        let mut merger = StatusMerger::new();
        for model_id in model_ids {
            if merger.push(self.model_state(model_id).await?).is_partial() {
                break;
            }
        }
        Ok(merger.state_or(VisibilityState::Hidden).into())
    }

    /// Categories across the given models, or across every model containing
    /// them when `model_ids` is `None`.
    pub async fn category_status(
        &self,
        category_ids: &BTreeSet<Id>,
        model_ids: Option<&BTreeSet<Id>>,
    ) -> Result<VisibilityStatus> {
        Ok(self
            .category_state(category_ids, model_ids)
            .await?
            .unwrap_or(VisibilityState::Hidden)
            .into())
    }

    pub async fn sub_category_status(
        &self,
        category_id: &Id,
        sub_category_ids: &BTreeSet<Id>,
    ) -> Result<VisibilityStatus> {
        let models = self.ids.category_models(category_id).await?;
        let category_viewed = self.viewport.views_category(category_id);
        let mut merger = StatusMerger::new();
        for sub_category_id in sub_category_ids {
            let sub_category_viewed = self.viewport.views_sub_category(sub_category_id);
            if models.is_empty() {
                merger.push(VisibilityState::from_displayed(
                    category_viewed && sub_category_viewed,
                ));
            }
            for model_id in &models {
                let displayed = self.viewport.views_model(model_id)
                    && match self.viewport.per_model_category_override(model_id, category_id) {
                        CategoryOverride::Show => sub_category_viewed,
                        CategoryOverride::Hide => false,
                        CategoryOverride::None => category_viewed && sub_category_viewed,
                    };
                if merger.push(VisibilityState::from_displayed(displayed)).is_partial() {
                    return Ok(VisibilityStatus::partial());
                }
            }
            if merger.is_partial() {
                break;
            }
        }
        Ok(merger.state_or(VisibilityState::Hidden).into())
    }

    /// Elements of one model and category, child elements included when
    /// `with_children` is set.
    pub async fn element_status(
        &self,
        model_id: &Id,
        category_id: &Id,
        element_ids: &BTreeSet<Id>,
        with_children: bool,
    ) -> Result<VisibilityStatus> {
        if !self.viewport.views_model(model_id) {
            return Ok(VisibilityStatus::hidden());
        }
        let drawn = self.drawn_sets(model_id).await?;
        let displays = self.category_displays_elements(model_id, category_id).await?;

        let mut merger = StatusMerger::new();
        for element_id in element_ids {
            if merger
                .push(element_state(true, &drawn, element_id, displays))
                .is_partial()
            {
                return Ok(VisibilityStatus::partial());
            }
        }

        if with_children {
            let children = self.ids.element_descendants(element_ids).await?;
            let mut category_displays: BTreeMap<Id, bool> = BTreeMap::new();
            category_displays.insert(category_id.clone(), displays);
            for child in children.iter() {
                let displays = match category_displays.get(&child.category_id) {
                    Some(displays) => *displays,
                    None => {
                        let displays = self
                            .category_displays_elements(model_id, &child.category_id)
                            .await?;
                        category_displays.insert(child.category_id.clone(), displays);
                        displays
                    }
                };
                if merger
                    .push(element_state(true, &drawn, &child.id, displays))
                    .is_partial()
                {
                    break;
                }
            }
        }
        Ok(merger.state_or(VisibilityState::Hidden).into())
    }

    pub async fn definition_container_status(
        &self,
        container_ids: &BTreeSet<Id>,
    ) -> Result<VisibilityStatus> {
        let categories = self.ids.definition_container_categories(container_ids).await?;
        self.category_status(&categories, None).await
    }

    /// Classification tables or classifications, through their related
    /// categories.
    pub async fn classification_status(&self, ids: &BTreeSet<Id>) -> Result<VisibilityStatus> {
        let categories = self.ids.classification_categories_of(ids).await?;
        self.category_status(&categories, None).await
    }

    /// Merged status of everything a filtered node stands for.
    pub async fn filter_targets_status(&self, targets: &FilterTargets) -> Result<VisibilityStatus> {
        let mut merger = StatusMerger::new();
        macro_rules! push {
            ($state:expr) => {
                if let Some(state) = $state {
                    if merger.push(state).is_partial() {
                        return Ok(VisibilityStatus::partial());
                    }
                }
            };
        }

        if !targets.subject_ids.is_empty() {
            push!(Some(self.subject_status(&targets.subject_ids).await?.state));
        }
        if !targets.model_ids.is_empty() {
            push!(Some(self.model_status(&targets.model_ids).await?.state));
        }
        if !targets.categories.is_empty() {
            push!(self.category_state(&targets.categories, None).await?);
        }
        for (model_id, category_ids) in &targets.model_categories {
            let models = BTreeSet::from([model_id.clone()]);
            push!(self.category_state(category_ids, Some(&models)).await?);
        }
        for (category_id, sub_category_ids) in &targets.sub_categories {
            push!(Some(
                self.sub_category_status(category_id, sub_category_ids)
                    .await?
                    .state
            ));
        }
        if !targets.definition_containers.is_empty() {
            let categories = self
                .ids
                .definition_container_categories(&targets.definition_containers)
                .await?;
            push!(self.category_state(&categories, None).await?);
        }
        let classification_ids: BTreeSet<Id> = targets
            .classification_tables
            .union(&targets.classifications)
            .cloned()
            .collect();
        if !classification_ids.is_empty() {
            let categories = self.ids.classification_categories_of(&classification_ids).await?;
            push!(self.category_state(&categories, None).await?);
        }
        for (model_id, categories) in &targets.elements {
            for (category_id, element_ids) in categories {
                push!(Some(
                    self.element_status(model_id, category_id, element_ids, true)
                        .await?
                        .state
                ));
            }
        }
        Ok(merger.state_or(VisibilityState::Hidden).into())
    }

    // ========== Building blocks ==========

    fn is_disabled_view(&self) -> bool {
        self.disable_in_non_spatial_views && !self.viewport.is_spatial_view()
    }

    pub(crate) async fn drawn_sets(&self, model_id: &Id) -> Result<DrawnSets> {
        Ok(DrawnSets {
            always: self
                .drawn
                .get_elements(SetType::Always, Some(model_id), None)
                .await?,
            never: self
                .drawn
                .get_elements(SetType::Never, Some(model_id), None)
                .await?,
        })
    }

    /// Whether the category shows its elements in a displayed model, before
    /// always/never-drawn overrides.
    pub(crate) async fn category_displays_elements(
        &self,
        model_id: &Id,
        category_id: &Id,
    ) -> Result<bool> {
        match self.viewport.per_model_category_override(model_id, category_id) {
            CategoryOverride::Show => Ok(true),
            CategoryOverride::Hide => Ok(false),
            CategoryOverride::None => {
                if !self.viewport.views_category(category_id) {
                    return Ok(false);
                }
                Ok(match self.ids.default_sub_category(category_id).await? {
                    Some(sub_category_id) => self.viewport.views_sub_category(&sub_category_id),
                    None => true,
                })
            }
        }
    }

    /// Category display state merged over its sub-categories, ignoring
    /// models and overrides.
    async fn category_display_state(&self, category_id: &Id) -> Result<VisibilityState> {
        if !self.viewport.views_category(category_id) {
            return Ok(VisibilityState::Hidden);
        }
        let sub_categories = self.ids.sub_categories(category_id).await?;
        Ok(
            VisibilityState::merge_all(sub_categories.iter().map(|sub_category| {
                VisibilityState::from_displayed(self.viewport.views_sub_category(&sub_category.id))
            }))
            .unwrap_or(VisibilityState::Visible),
        )
    }

    pub(crate) async fn category_in_model_state(
        &self,
        model_id: &Id,
        category_id: &Id,
    ) -> Result<VisibilityState> {
        if !self.viewport.views_model(model_id) {
            return Ok(VisibilityState::Hidden);
        }
        let state = match self.viewport.per_model_category_override(model_id, category_id) {
            CategoryOverride::Show => VisibilityState::Visible,
            CategoryOverride::Hide => VisibilityState::Hidden,
            CategoryOverride::None => self.category_display_state(category_id).await?,
        };
        let opposing = match state {
            VisibilityState::Visible => SetType::Never,
            VisibilityState::Hidden => SetType::Always,
            VisibilityState::Partial => return Ok(state),
        };
        let categories = BTreeSet::from([category_id.clone()]);
        let overridden = self
            .drawn
            .get_elements(opposing, Some(model_id), Some(&categories))
            .await?;
        Ok(if overridden.is_empty() {
            state
        } else {
            VisibilityState::Partial
        })
    }

    async fn category_state(
        &self,
        category_ids: &BTreeSet<Id>,
        model_ids: Option<&BTreeSet<Id>>,
    ) -> Result<Option<VisibilityState>> {
        let mut merger = StatusMerger::new();
        for category_id in category_ids {
            let models = match model_ids {
                Some(model_ids) => model_ids.clone(),
                None => self.ids.category_models(category_id).await?,
            };
            if models.is_empty() {
                merger.push(self.category_display_state(category_id).await?);
            }
            for model_id in &models {
                if merger
                    .push(self.category_in_model_state(model_id, category_id).await?)
                    .is_partial()
                {
                    return Ok(merger.state());
                }
            }
            if merger.is_partial() {
                break;
            }
        }
        Ok(merger.state())
    }

    async fn model_state(&self, model_id: &Id) -> Result<VisibilityState> {
        if !self.viewport.views_model(model_id) {
            return Ok(VisibilityState::Hidden);
        }
        let categories = self.ids.model_categories(model_id).await?;
        let mut merger = StatusMerger::new();
        for category_id in categories.iter() {
            if merger
                .push(self.category_in_model_state(model_id, category_id).await?)
                .is_partial()
            {
                break;
            }
        }
        Ok(merger.state_or(VisibilityState::Visible))
    }

    async fn subject_state(&self, subject_ids: &BTreeSet<Id>) -> Result<VisibilityState> {
        let models = self.ids.subject_models(subject_ids).await?;
        let mut merger = StatusMerger::new();
        for model_id in &models {
            if merger.push(self.model_state(model_id).await?).is_partial() {
                break;
            }
        }
        Ok(merger.state_or(VisibilityState::Hidden))
    }
}

/// Model and category ids an element node must carry.
pub(crate) fn element_context(node: &HierarchyNode) -> Result<(&Id, &Id)> {
    let model_id = node
        .model_id
        .as_ref()
        .ok_or_else(|| VisibilityError::missing(node.kind, "model id"))?;
    let category_id = node
        .category_id
        .as_ref()
        .ok_or_else(|| VisibilityError::missing(node.kind, "category id"))?;
    Ok((model_id, category_id))
}

/// State of one element given its model's display, the override sets and
/// whether its category shows it.
pub(crate) fn element_state(
    model_displayed: bool,
    drawn: &DrawnSets,
    element_id: &Id,
    category_displays: bool,
) -> VisibilityState {
    if !model_displayed || drawn.never.contains(element_id) {
        return VisibilityState::Hidden;
    }
    if drawn.always.contains(element_id) {
        return VisibilityState::Visible;
    }
    VisibilityState::from_displayed(category_displays)
}
