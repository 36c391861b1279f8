//! In-memory query source.
//!
//! Answers every [`Query`] shape from a [`SceneData`] snapshot. Besides serving
//! offline hierarchies it is instrumented for tests: it counts executed
//! queries per shape, can hold queries behind a gate and can fail chosen
//! shapes.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use mtv_common::lock;
use mtv_model::Id;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{QueryError, Result};
use crate::query::{ClassInspector, Query, QueryOptions, QuerySource, Row, RowStream};
use crate::rows::{
    CategoryRow, ClassificationCategoryRow, ClassificationRow, DefinitionContainerRow,
    ElementInfoRow, ElementRow, IdRow, ModelRow, SubCategoryRow, SubjectRow,
};

/// Name under which class inspections are counted.
const CLASS_DERIVES_FROM: &str = "ClassDerivesFrom";

/// A geometric element of the scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneElement {
    pub id: Id,
    pub model_id: Id,
    pub category_id: Id,
    /// Assembly parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Id>,
}

/// Everything the in-memory source knows about a scene.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneData {
    pub subjects: Vec<SubjectRow>,
    pub models: Vec<ModelRow>,
    pub categories: Vec<CategoryRow>,
    pub sub_categories: Vec<SubCategoryRow>,
    pub definition_containers: Vec<DefinitionContainerRow>,
    pub classifications: Vec<ClassificationRow>,
    pub classification_categories: Vec<ClassificationCategoryRow>,
    pub elements: Vec<SceneElement>,
    /// class name -> direct base classes.
    pub classes: BTreeMap<String, Vec<String>>,
}

impl SceneData {
    /// Parses a scene from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn element(&self, id: &str) -> Option<&SceneElement> {
        self.elements.iter().find(|element| element.id == id)
    }

    fn element_info(&self, id: &str) -> Option<ElementInfoRow> {
        let element = self.element(id)?;
        let mut root = element;
        let mut hops = 0;
        while let Some(parent) = root.parent_id.as_deref().and_then(|parent| self.element(parent)) {
            hops += 1;
            if hops > self.elements.len() {
                break;
            }
            root = parent;
        }
        Some(ElementInfoRow {
            id: element.id.clone(),
            model_id: element.model_id.clone(),
            category_id: root.category_id.clone(),
            parent_id: element.parent_id.clone(),
        })
    }

    fn derives_from(&self, candidate: &str, base: &str) -> bool {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([candidate]);
        while let Some(class) = queue.pop_front() {
            if class == base {
                return true;
            }
            if !seen.insert(class) {
                continue;
            }
            if let Some(bases) = self.classes.get(class) {
                queue.extend(bases.iter().map(String::as_str));
            }
        }
        false
    }

    fn evaluate(&self, query: &Query) -> Result<Vec<Row>> {
        match query {
            Query::Subjects => to_rows(query, &self.subjects),
            Query::Models => to_rows(query, &self.models),
            Query::Categories => to_rows(query, &self.categories),
            Query::DefinitionContainers => to_rows(query, &self.definition_containers),
            Query::Classifications => to_rows(query, &self.classifications),
            Query::ClassificationCategories => to_rows(query, &self.classification_categories),
            Query::ModelCategories { model_id } => {
                let categories: BTreeSet<&Id> = self
                    .elements
                    .iter()
                    .filter(|element| element.model_id == *model_id && element.parent_id.is_none())
                    .map(|element| &element.category_id)
                    .collect();
                let rows: Vec<IdRow> = categories
                    .into_iter()
                    .map(|id| IdRow { id: id.clone() })
                    .collect();
                to_rows(query, &rows)
            }
            Query::CategoryElements {
                model_id,
                category_id,
            } => {
                let rows: Vec<ElementRow> = self
                    .elements
                    .iter()
                    .filter(|element| {
                        element.model_id == *model_id
                            && element.category_id == *category_id
                            && element.parent_id.is_none()
                    })
                    .map(element_row)
                    .collect();
                to_rows(query, &rows)
            }
            Query::ElementChildren { element_id } => {
                let rows: Vec<ElementRow> = self
                    .elements
                    .iter()
                    .filter(|element| element.parent_id.as_ref() == Some(element_id))
                    .map(element_row)
                    .collect();
                to_rows(query, &rows)
            }
            Query::SubCategories { category_id } => {
                let rows: Vec<&SubCategoryRow> = self
                    .sub_categories
                    .iter()
                    .filter(|sub_category| sub_category.category_id == *category_id)
                    .collect();
                to_rows(query, &rows)
            }
            Query::ElementCategoryInfo { element_ids } => {
                let rows: Vec<ElementInfoRow> = element_ids
                    .iter()
                    .filter_map(|id| self.element_info(id))
                    .collect();
                to_rows(query, &rows)
            }
        }
    }
}

fn element_row(element: &SceneElement) -> ElementRow {
    ElementRow {
        id: element.id.clone(),
        category_id: element.category_id.clone(),
        parent_id: element.parent_id.clone(),
    }
}

fn to_rows<T: Serialize>(query: &Query, records: &[T]) -> Result<Vec<Row>> {
    records
        .iter()
        .map(|record| match serde_json::to_value(record) {
            Ok(serde_json::Value::Object(row)) => Ok(row),
            Ok(other) => Err(QueryError::failed(
                query.name(),
                format!("record is not an object: {other}"),
            )),
            Err(err) => Err(QueryError::failed(query.name(), err.to_string())),
        })
        .collect()
}

struct MemoryInner {
    scene: RwLock<SceneData>,
    counts: Mutex<BTreeMap<&'static str, usize>>,
    failing: Mutex<BTreeSet<&'static str>>,
    /// `true` while queries may run.
    gate: watch::Sender<bool>,
    restarts: Mutex<HashMap<String, u64>>,
}

impl MemoryInner {
    fn record(&self, name: &'static str) {
        *lock(&self.counts).entry(name).or_default() += 1;
    }

    fn scene(&self) -> std::sync::RwLockReadGuard<'_, SceneData> {
        self.scene
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn wait_for_gate(&self) {
        let mut rx = self.gate.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }

    fn run(&self, query: &Query, restart: Option<(String, u64)>) -> Vec<Result<Row>> {
        if let Some((token, ticket)) = restart
            && lock(&self.restarts).get(&token) != Some(&ticket)
        {
            return vec![Err(QueryError::Interrupted)];
        }
        self.record(query.name());
        if lock(&self.failing).contains(query.name()) {
            return vec![Err(QueryError::failed(query.name(), "injected failure"))];
        }
        match self.scene().evaluate(query) {
            Ok(rows) => rows.into_iter().map(Ok).collect(),
            Err(err) => vec![Err(err)],
        }
    }
}

/// In-memory [`QuerySource`] and [`ClassInspector`].
#[derive(Clone)]
pub struct MemoryQuerySource {
    inner: Arc<MemoryInner>,
}

impl std::fmt::Debug for MemoryQuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryQuerySource")
            .field("counts", &*lock(&self.inner.counts))
            .finish_non_exhaustive()
    }
}

impl MemoryQuerySource {
    pub fn new(scene: SceneData) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                scene: RwLock::new(scene),
                counts: Mutex::new(BTreeMap::new()),
                failing: Mutex::new(BTreeSet::new()),
                gate: watch::Sender::new(true),
                restarts: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Applies `update` to the scene. Already cached results are not affected.
    pub fn update_scene(&self, update: impl FnOnce(&mut SceneData)) {
        let mut scene = self
            .inner
            .scene
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        update(&mut scene);
    }

    /// Number of executed queries of the given shape name.
    pub fn query_count(&self, name: &str) -> usize {
        lock(&self.inner.counts).get(name).copied().unwrap_or(0)
    }

    /// Number of executed queries of all shapes, class inspections excluded.
    pub fn total_queries(&self) -> usize {
        lock(&self.inner.counts)
            .iter()
            .filter(|(name, _)| **name != CLASS_DERIVES_FROM)
            .map(|(_, count)| count)
            .sum()
    }

    /// Number of class inspections performed.
    pub fn class_inspections(&self) -> usize {
        self.query_count(CLASS_DERIVES_FROM)
    }

    pub fn reset_counts(&self) {
        lock(&self.inner.counts).clear();
    }

    /// Makes every query of the given shape fail.
    pub fn fail_queries(&self, name: &'static str) {
        lock(&self.inner.failing).insert(name);
    }

    pub fn clear_failures(&self) {
        lock(&self.inner.failing).clear();
    }

    /// Holds all queries until [`release_queries`](Self::release_queries).
    pub fn hold_queries(&self) {
        self.inner.gate.send_replace(false);
    }

    pub fn release_queries(&self) {
        self.inner.gate.send_replace(true);
    }
}

impl QuerySource for MemoryQuerySource {
    fn create_query_reader(&self, query: &Query, options: &QueryOptions) -> RowStream {
        let restart = options.restart_token.as_ref().map(|token| {
            let mut restarts = lock(&self.inner.restarts);
            let ticket = restarts.get(token).map_or(1, |ticket| ticket + 1);
            restarts.insert(token.clone(), ticket);
            (token.clone(), ticket)
        });
        let inner = Arc::clone(&self.inner);
        let query = query.clone();
        stream::once(async move {
            inner.wait_for_gate().await;
            inner.run(&query, restart)
        })
        .flat_map(stream::iter)
        .boxed()
    }
}

#[async_trait]
impl ClassInspector for MemoryQuerySource {
    async fn class_derives_from(&self, candidate_class: &str, base_class: &str) -> Result<bool> {
        self.inner.wait_for_gate().await;
        self.inner.record(CLASS_DERIVES_FROM);
        Ok(self.inner.scene().derives_from(candidate_class, base_class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SceneData {
        SceneData::from_json(
            r#"{
                "elements": [
                    { "id": "0x30", "modelId": "0x10", "categoryId": "0x20" },
                    { "id": "0x31", "modelId": "0x10", "categoryId": "0x21", "parentId": "0x30" },
                    { "id": "0x32", "modelId": "0x10", "categoryId": "0x22", "parentId": "0x31" }
                ],
                "classes": {
                    "Generic.PhysicalObject": ["BisCore.PhysicalElement"],
                    "BisCore.PhysicalElement": ["BisCore.GeometricElement3d"],
                    "BisCore.GeometricElement3d": ["BisCore.GeometricElement"]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn element_info_takes_root_category() {
        let info = scene().element_info("0x32").unwrap();
        assert_eq!(info.category_id, "0x20");
        assert_eq!(info.parent_id.as_deref(), Some("0x31"));
    }

    #[test]
    fn model_categories_only_consider_root_elements() {
        let rows = scene()
            .evaluate(&Query::ModelCategories {
                model_id: "0x10".into(),
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "0x20");
    }

    #[test]
    fn transitive_derivation() {
        let scene = scene();
        assert!(scene.derives_from("Generic.PhysicalObject", "BisCore.GeometricElement"));
        assert!(scene.derives_from("BisCore.Subject", "BisCore.Subject"));
        assert!(!scene.derives_from("BisCore.PhysicalElement", "BisCore.Category"));
    }

    #[tokio::test]
    async fn newer_query_with_same_token_interrupts_older() {
        let source = MemoryQuerySource::new(scene());
        let options = QueryOptions::with_restart_token("token");
        let query = Query::ElementCategoryInfo {
            element_ids: vec!["0x30".into()],
        };

        let older = source.create_query_reader(&query, &options);
        let newer = source.create_query_reader(&query, &options);

        let older: Vec<_> = older.collect().await;
        let newer: Vec<_> = newer.collect().await;
        assert_eq!(older, vec![Err(QueryError::Interrupted)]);
        assert_eq!(newer.len(), 1);
        assert_eq!(source.query_count("ElementCategoryInfo"), 1);
    }

    #[tokio::test]
    async fn failures_are_injected_per_shape() {
        let source = MemoryQuerySource::new(scene());
        source.fail_queries("Models");
        let rows: Vec<_> = source
            .create_query_reader(&Query::Models, &QueryOptions::default())
            .collect()
            .await;
        assert!(matches!(rows.as_slice(), [Err(QueryError::Failed { .. })]));
    }
}
