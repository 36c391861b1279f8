//! Published cache snapshots.

use std::collections::{BTreeMap, BTreeSet};

use mtv_model::Id;
use mtv_query::ElementInfoRow;

/// Elements of one (model, category) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CategoryElements {
    all: BTreeSet<Id>,
    /// Assembly parent (`None` for root elements) -> elements.
    by_parent: BTreeMap<Option<Id>, BTreeSet<Id>>,
}

/// An override set resolved to `model -> category -> elements`.
///
/// The category is the one of each element's top-most ancestor. A snapshot is
/// complete for the set contents it was built from and never changes once
/// published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    models: BTreeMap<Id, BTreeMap<Id, CategoryElements>>,
}

impl CacheEntry {
    pub fn from_rows(rows: impl IntoIterator<Item = ElementInfoRow>) -> Self {
        let mut entry = Self::default();
        for row in rows {
            let category = entry
                .models
                .entry(row.model_id)
                .or_default()
                .entry(row.category_id)
                .or_default();
            category.all.insert(row.id.clone());
            category.by_parent.entry(row.parent_id).or_default().insert(row.id);
        }
        entry
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &Id> {
        self.models.keys()
    }

    /// Elements, optionally restricted to a model and to categories.
    pub fn elements(
        &self,
        model_id: Option<&Id>,
        category_ids: Option<&BTreeSet<Id>>,
    ) -> BTreeSet<Id> {
        let models: Vec<&BTreeMap<Id, CategoryElements>> = match model_id {
            Some(model_id) => self.models.get(model_id).into_iter().collect(),
            None => self.models.values().collect(),
        };
        models
            .into_iter()
            .flat_map(|categories| categories.iter())
            .filter(|(category_id, _)| category_ids.is_none_or(|ids| ids.contains(*category_id)))
            .flat_map(|(_, elements)| elements.all.iter().cloned())
            .collect()
    }

    /// Elements of a (model, category) pair whose assembly parent is `parent_id`.
    /// `None` selects root elements.
    pub fn child_elements(
        &self,
        model_id: &Id,
        category_id: &Id,
        parent_id: Option<&Id>,
    ) -> BTreeSet<Id> {
        self.models
            .get(model_id)
            .and_then(|categories| categories.get(category_id))
            .and_then(|elements| elements.by_parent.get(&parent_id.cloned()))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether any element exists for the (model, category) pair.
    pub fn has_elements(&self, model_id: &Id, category_id: &Id) -> bool {
        self.models
            .get(model_id)
            .and_then(|categories| categories.get(category_id))
            .is_some_and(|elements| !elements.all.is_empty())
    }
}
