//! Filter targets collected from a filtered subtree.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::ids::Id;

/// Type-partitioned ids whose visibility stands in for a filtered node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTargets {
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub subject_ids: BTreeSet<Id>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub model_ids: BTreeSet<Id>,
    /// Categories not scoped to a model.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub categories: BTreeSet<Id>,
    /// model id -> categories shown under that model.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub model_categories: BTreeMap<Id, BTreeSet<Id>>,
    /// category id -> sub-categories.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_categories: BTreeMap<Id, BTreeSet<Id>>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub definition_containers: BTreeSet<Id>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub classification_tables: BTreeSet<Id>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub classifications: BTreeSet<Id>,
    /// model id -> category id -> elements.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub elements: BTreeMap<Id, BTreeMap<Id, BTreeSet<Id>>>,
}

impl FilterTargets {
    pub fn is_empty(&self) -> bool {
        self.subject_ids.is_empty()
            && self.model_ids.is_empty()
            && self.categories.is_empty()
            && self.model_categories.is_empty()
            && self.sub_categories.is_empty()
            && self.definition_containers.is_empty()
            && self.classification_tables.is_empty()
            && self.classifications.is_empty()
            && self.elements.is_empty()
    }

    pub fn add_category(&mut self, model_id: Option<&Id>, category_id: Id) {
        match model_id {
            Some(model_id) => {
                self.model_categories
                    .entry(model_id.clone())
                    .or_default()
                    .insert(category_id);
            }
            None => {
                self.categories.insert(category_id);
            }
        }
    }

    pub fn add_sub_category(&mut self, category_id: Id, sub_category_id: Id) {
        self.sub_categories
            .entry(category_id)
            .or_default()
            .insert(sub_category_id);
    }

    pub fn add_element(&mut self, model_id: Id, category_id: Id, element_id: Id) {
        self.elements
            .entry(model_id)
            .or_default()
            .entry(category_id)
            .or_default()
            .insert(element_id);
    }

    /// Total number of target ids across all groups.
    pub fn len(&self) -> usize {
        let nested =
            |map: &BTreeMap<Id, BTreeSet<Id>>| map.values().map(BTreeSet::len).sum::<usize>();
        self.subject_ids.len()
            + self.model_ids.len()
            + self.categories.len()
            + nested(&self.model_categories)
            + nested(&self.sub_categories)
            + self.definition_containers.len()
            + self.classification_tables.len()
            + self.classifications.len()
            + self.elements.values().map(nested).sum::<usize>()
    }
}
