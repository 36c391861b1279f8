//! Query shapes and the capabilities consumed from the data store.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use mtv_model::Id;

use crate::error::Result;

/// One row: column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Lazy row sequence produced by a [`QuerySource`].
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Query shapes run against the data store. Each variant carries its bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// `{id, parentId?, targetPartitionId?}` for every subject.
    Subjects,
    /// `{id, parentId}` for every model, parent being the owning subject.
    Models,
    /// `{id, definitionContainerId?}` for every category.
    Categories,
    /// `{id, parentId?}` for every definition container.
    DefinitionContainers,
    /// `{id, tableId, parentId?}` for every classification.
    Classifications,
    /// `{classificationId, categoryId}` relationships.
    ClassificationCategories,
    /// `{id}` of the categories of a model's root elements.
    ModelCategories { model_id: Id },
    /// `{id, categoryId, parentId?}` of root elements in a model and category.
    CategoryElements { model_id: Id, category_id: Id },
    /// `{id, categoryId, parentId}` of an element's direct children.
    ElementChildren { element_id: Id },
    /// `{id, categoryId, isDefault}` of a category's sub-categories.
    SubCategories { category_id: Id },
    /// `{id, modelId, categoryId, parentId?}` of the given elements, with the
    /// category taken from the top-most ancestor of each element.
    ElementCategoryInfo { element_ids: Vec<Id> },
}

impl Query {
    /// Stable name of the query shape.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Subjects => "Subjects",
            Self::Models => "Models",
            Self::Categories => "Categories",
            Self::DefinitionContainers => "DefinitionContainers",
            Self::Classifications => "Classifications",
            Self::ClassificationCategories => "ClassificationCategories",
            Self::ModelCategories { .. } => "ModelCategories",
            Self::CategoryElements { .. } => "CategoryElements",
            Self::ElementChildren { .. } => "ElementChildren",
            Self::SubCategories { .. } => "SubCategories",
            Self::ElementCategoryInfo { .. } => "ElementCategoryInfo",
        }
    }
}

/// Options passed along with a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// A newer query carrying the same token interrupts an older one that is
    /// still running.
    pub restart_token: Option<String>,
}

impl QueryOptions {
    pub fn with_restart_token(token: impl Into<String>) -> Self {
        Self {
            restart_token: Some(token.into()),
        }
    }
}

/// Opaque row-producing data store.
pub trait QuerySource: Send + Sync {
    /// Creates a reader for `query`. Nothing runs until the stream is polled.
    fn create_query_reader(&self, query: &Query, options: &QueryOptions) -> RowStream;
}

/// Class-hierarchy inspection.
#[async_trait]
pub trait ClassInspector: Send + Sync {
    /// Whether `candidate_class` is `base_class` or derives from it.
    async fn class_derives_from(&self, candidate_class: &str, base_class: &str) -> Result<bool>;
}
