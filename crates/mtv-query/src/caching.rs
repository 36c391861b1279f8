//! Memoizing query provider, also serving as the hierarchy ids cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use mtv_common::lock;
use mtv_model::Id;

use crate::error::Result;
use crate::provider::QueryProvider;
use crate::rows::{
    CategoryRow, ClassificationCategoryRow, ClassificationRow, DefinitionContainerRow, ElementRow,
    ModelRow, SubCategoryRow, SubjectRow,
};

type SharedQuery<T> = Shared<BoxFuture<'static, Result<Arc<T>>>>;

/// Memoized query results keyed by `K`.
///
/// Callers asking for a key while its query is still running share that query.
/// Failed results are evicted so the next caller retries.
struct KeyedMemo<K, T> {
    name: &'static str,
    entries: Mutex<HashMap<K, (u64, SharedQuery<T>)>>,
    next_token: AtomicU64,
}

impl<K, T> KeyedMemo<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Send + Sync + 'static,
{
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    async fn get<F>(&self, key: &K, start: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        let (token, shared) = {
            let mut entries = lock(&self.entries);
            match entries.get(key) {
                Some((token, shared)) => {
                    tracing::trace!(memo = self.name, ?key, "cache hit");
                    (*token, shared.clone())
                }
                None => {
                    tracing::trace!(memo = self.name, ?key, "cache miss");
                    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                    let shared = start().map(|result| result.map(Arc::new)).boxed().shared();
                    entries.insert(key.clone(), (token, shared.clone()));
                    (token, shared)
                }
            }
        };
        let result = shared.await;
        if let Err(err) = &result {
            tracing::debug!(memo = self.name, ?key, %err, "evicting failed query");
            let mut entries = lock(&self.entries);
            if entries.get(key).is_some_and(|(current, _)| *current == token) {
                entries.remove(key);
            }
        }
        result
    }

    fn invalidate(&self, key: Option<&K>) {
        let mut entries = lock(&self.entries);
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
        tracing::debug!(memo = self.name, ?key, "invalidated");
    }

    fn retain(&self, keep: impl Fn(&K) -> bool) {
        lock(&self.entries).retain(|key, _| keep(key));
    }
}

/// A single memoized value.
type Memo<T> = KeyedMemo<(), T>;

/// Wraps a [`QueryProvider`] with per-key memoization.
///
/// Whole-hierarchy queries hold one value each; per-entity queries are keyed by
/// the entity id. Nothing expires on its own: callers invalidate by key or
/// wholesale when the underlying data changes.
pub struct CachingQueryProvider {
    provider: Arc<QueryProvider>,
    subjects: Memo<Vec<SubjectRow>>,
    models: Memo<Vec<ModelRow>>,
    categories: Memo<Vec<CategoryRow>>,
    definition_containers: Memo<Vec<DefinitionContainerRow>>,
    classifications: Memo<Vec<ClassificationRow>>,
    classification_categories: Memo<Vec<ClassificationCategoryRow>>,
    model_categories: KeyedMemo<Id, Vec<Id>>,
    category_elements: KeyedMemo<(Id, Id), Vec<ElementRow>>,
    element_children: KeyedMemo<Id, Vec<ElementRow>>,
    sub_categories: KeyedMemo<Id, Vec<SubCategoryRow>>,
}

impl std::fmt::Debug for CachingQueryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingQueryProvider").finish_non_exhaustive()
    }
}

impl CachingQueryProvider {
    pub fn new(provider: QueryProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            subjects: Memo::new("subjects"),
            models: Memo::new("models"),
            categories: Memo::new("categories"),
            definition_containers: Memo::new("definition_containers"),
            classifications: Memo::new("classifications"),
            classification_categories: Memo::new("classification_categories"),
            model_categories: KeyedMemo::new("model_categories"),
            category_elements: KeyedMemo::new("category_elements"),
            element_children: KeyedMemo::new("element_children"),
            sub_categories: KeyedMemo::new("sub_categories"),
        }
    }

    /// The wrapped, non-caching provider.
    pub fn provider(&self) -> &QueryProvider {
        &self.provider
    }

    // ========== Whole-hierarchy queries ==========

    pub async fn subjects(&self) -> Result<Arc<Vec<SubjectRow>>> {
        let provider = Arc::clone(&self.provider);
        self.subjects
            .get(&(), move || async move { provider.query_subjects().await }.boxed())
            .await
    }

    pub async fn models(&self) -> Result<Arc<Vec<ModelRow>>> {
        let provider = Arc::clone(&self.provider);
        self.models
            .get(&(), move || async move { provider.query_models().await }.boxed())
            .await
    }

    pub async fn categories(&self) -> Result<Arc<Vec<CategoryRow>>> {
        let provider = Arc::clone(&self.provider);
        self.categories
            .get(&(), move || async move { provider.query_categories().await }.boxed())
            .await
    }

    pub async fn definition_containers(&self) -> Result<Arc<Vec<DefinitionContainerRow>>> {
        let provider = Arc::clone(&self.provider);
        self.definition_containers
            .get(&(), move || {
                async move { provider.query_definition_containers().await }.boxed()
            })
            .await
    }

    pub async fn classifications(&self) -> Result<Arc<Vec<ClassificationRow>>> {
        let provider = Arc::clone(&self.provider);
        self.classifications
            .get(&(), move || async move { provider.query_classifications().await }.boxed())
            .await
    }

    pub async fn classification_categories(&self) -> Result<Arc<Vec<ClassificationCategoryRow>>> {
        let provider = Arc::clone(&self.provider);
        self.classification_categories
            .get(&(), move || {
                async move { provider.query_classification_categories().await }.boxed()
            })
            .await
    }

    // ========== Per-entity queries ==========

    /// Categories of a model's root elements.
    pub async fn model_categories(&self, model_id: &Id) -> Result<Arc<Vec<Id>>> {
        let provider = Arc::clone(&self.provider);
        let key = model_id.clone();
        self.model_categories
            .get(model_id, move || {
                async move { provider.query_model_categories(&key).await }.boxed()
            })
            .await
    }

    /// Root elements of a model in one category.
    pub async fn category_elements(
        &self,
        model_id: &Id,
        category_id: &Id,
    ) -> Result<Arc<Vec<ElementRow>>> {
        let provider = Arc::clone(&self.provider);
        let key = (model_id.clone(), category_id.clone());
        let (model, category) = key.clone();
        self.category_elements
            .get(&key, move || {
                async move { provider.query_category_elements(&model, &category).await }.boxed()
            })
            .await
    }

    /// Direct children of an element.
    pub async fn element_children(&self, element_id: &Id) -> Result<Arc<Vec<ElementRow>>> {
        let provider = Arc::clone(&self.provider);
        let key = element_id.clone();
        self.element_children
            .get(element_id, move || {
                async move { provider.query_element_children(&key).await }.boxed()
            })
            .await
    }

    pub async fn sub_categories(&self, category_id: &Id) -> Result<Arc<Vec<SubCategoryRow>>> {
        let provider = Arc::clone(&self.provider);
        let key = category_id.clone();
        self.sub_categories
            .get(category_id, move || {
                async move { provider.query_sub_categories(&key).await }.boxed()
            })
            .await
    }

    // ========== Derived lookups ==========

    /// The sub-category flagged as default for a category, if any.
    pub async fn default_sub_category(&self, category_id: &Id) -> Result<Option<Id>> {
        let sub_categories = self.sub_categories(category_id).await?;
        Ok(sub_categories
            .iter()
            .find(|sub_category| sub_category.is_default)
            .map(|sub_category| sub_category.id.clone()))
    }

    /// Models under the given subjects, including child subjects and subjects
    /// standing for a single model.
    pub async fn subject_models(&self, subject_ids: &BTreeSet<Id>) -> Result<BTreeSet<Id>> {
        let subjects = self.subjects().await?;
        let models = self.models().await?;

        let mut children: BTreeMap<&Id, Vec<&SubjectRow>> = BTreeMap::new();
        for subject in subjects.iter() {
            if let Some(parent) = &subject.parent_id {
                children.entry(parent).or_default().push(subject);
            }
        }

        let mut reached: BTreeSet<&Id> = BTreeSet::new();
        let mut stack: Vec<&Id> = subject_ids.iter().collect();
        let mut model_ids = BTreeSet::new();
        while let Some(subject_id) = stack.pop() {
            if !reached.insert(subject_id) {
                continue;
            }
            for child in children.get(subject_id).into_iter().flatten() {
                if let Some(partition) = &child.target_partition_id {
                    model_ids.insert(partition.clone());
                }
                stack.push(&child.id);
            }
        }
        for subject in subjects.iter() {
            if subject_ids.contains(&subject.id)
                && let Some(partition) = &subject.target_partition_id
            {
                model_ids.insert(partition.clone());
            }
        }
        model_ids.extend(
            models
                .iter()
                .filter(|model| {
                    model
                        .parent_id
                        .as_ref()
                        .is_some_and(|parent| reached.contains(parent))
                })
                .map(|model| model.id.clone()),
        );
        Ok(model_ids)
    }

    /// Models containing root elements of the category.
    pub async fn category_models(&self, category_id: &Id) -> Result<BTreeSet<Id>> {
        let models = self.models().await?;
        let per_model = future::try_join_all(models.iter().map(|model| async move {
            let categories = self.model_categories(&model.id).await?;
            Ok::<_, crate::QueryError>(categories.contains(category_id).then(|| model.id.clone()))
        }))
        .await?;
        Ok(per_model.into_iter().flatten().collect())
    }

    /// Categories inside the given definition containers, nested ones included.
    pub async fn definition_container_categories(
        &self,
        container_ids: &BTreeSet<Id>,
    ) -> Result<BTreeSet<Id>> {
        let containers = self.definition_containers().await?;
        let categories = self.categories().await?;

        let mut children: BTreeMap<&Id, Vec<&Id>> = BTreeMap::new();
        for container in containers.iter() {
            if let Some(parent) = &container.parent_id {
                children.entry(parent).or_default().push(&container.id);
            }
        }
        let reached = walk(container_ids.iter().collect(), &children);
        Ok(categories
            .iter()
            .filter(|category| {
                category
                    .definition_container_id
                    .as_ref()
                    .is_some_and(|container| reached.contains(container))
            })
            .map(|category| category.id.clone())
            .collect())
    }

    /// Categories related to the given classification tables or
    /// classifications, child classifications included.
    pub async fn classification_categories_of(&self, ids: &BTreeSet<Id>) -> Result<BTreeSet<Id>> {
        let classifications = self.classifications().await?;
        let related = self.classification_categories().await?;

        let mut children: BTreeMap<&Id, Vec<&Id>> = BTreeMap::new();
        let mut roots: Vec<&Id> = Vec::new();
        for classification in classifications.iter() {
            if let Some(parent) = &classification.parent_id {
                children.entry(parent).or_default().push(&classification.id);
            }
            if ids.contains(&classification.id)
                || (classification.parent_id.is_none() && ids.contains(&classification.table_id))
            {
                roots.push(&classification.id);
            }
        }
        let reached = walk(roots, &children);
        Ok(related
            .iter()
            .filter(|relation| reached.contains(&relation.classification_id))
            .map(|relation| relation.category_id.clone())
            .collect())
    }

    /// All elements below the given ones, in breadth-first order.
    pub async fn element_descendants(&self, element_ids: &BTreeSet<Id>) -> Result<Vec<ElementRow>> {
        let mut descendants = Vec::new();
        let mut seen: BTreeSet<Id> = element_ids.clone();
        let mut frontier: Vec<Id> = element_ids.iter().cloned().collect();
        while !frontier.is_empty() {
            let batches =
                future::try_join_all(frontier.iter().map(|id| self.element_children(id))).await?;
            frontier = Vec::new();
            for child in batches.iter().flat_map(|children| children.iter()) {
                if seen.insert(child.id.clone()) {
                    frontier.push(child.id.clone());
                    descendants.push(child.clone());
                }
            }
        }
        Ok(descendants)
    }

    // ========== Invalidation ==========

    pub fn invalidate_subjects(&self) {
        self.subjects.invalidate(None);
    }

    pub fn invalidate_models(&self) {
        self.models.invalidate(None);
    }

    pub fn invalidate_categories(&self) {
        self.categories.invalidate(None);
    }

    pub fn invalidate_definition_containers(&self) {
        self.definition_containers.invalidate(None);
    }

    pub fn invalidate_classifications(&self) {
        self.classifications.invalidate(None);
        self.classification_categories.invalidate(None);
    }

    /// Evicts one model's categories, or all models' when `None`.
    pub fn invalidate_model_categories(&self, model_id: Option<&Id>) {
        self.model_categories.invalidate(model_id);
    }

    /// Evicts root elements of one model, or of all models when `None`.
    pub fn invalidate_category_elements(&self, model_id: Option<&Id>) {
        match model_id {
            Some(model_id) => self.category_elements.retain(|(model, _)| model != model_id),
            None => self.category_elements.invalidate(None),
        }
    }

    pub fn invalidate_element_children(&self, element_id: Option<&Id>) {
        self.element_children.invalidate(element_id);
    }

    pub fn invalidate_sub_categories(&self, category_id: Option<&Id>) {
        self.sub_categories.invalidate(category_id);
    }

    pub fn invalidate_all(&self) {
        self.invalidate_subjects();
        self.invalidate_models();
        self.invalidate_categories();
        self.invalidate_definition_containers();
        self.invalidate_classifications();
        self.invalidate_model_categories(None);
        self.invalidate_category_elements(None);
        self.invalidate_element_children(None);
        self.invalidate_sub_categories(None);
    }
}

/// Ids reachable from `roots` through `children`, roots included.
fn walk<'a>(roots: Vec<&'a Id>, children: &BTreeMap<&'a Id, Vec<&'a Id>>) -> BTreeSet<&'a Id> {
    let mut reached = BTreeSet::new();
    let mut stack = roots;
    while let Some(id) = stack.pop() {
        if reached.insert(id) {
            stack.extend(children.get(id).into_iter().flatten().copied());
        }
    }
    reached
}
