//! Leaf query provider.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::{StreamExt, future};
use mtv_model::Id;
use serde::de::DeserializeOwned;

use crate::error::{QueryError, Result};
use crate::query::{Query, QueryOptions, QuerySource, Row};
use crate::rows::{
    CategoryRow, ClassificationCategoryRow, ClassificationRow, DefinitionContainerRow,
    ElementInfoRow, ElementRow, IdRow, ModelRow, SubCategoryRow, SubjectRow,
};

/// Runs hierarchy queries against a [`QuerySource`]. No caching.
#[derive(Clone)]
pub struct QueryProvider {
    source: Arc<dyn QuerySource>,
}

impl std::fmt::Debug for QueryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryProvider").finish_non_exhaustive()
    }
}

impl QueryProvider {
    pub fn new(source: Arc<dyn QuerySource>) -> Self {
        Self { source }
    }

    /// Lazy sequence of decoded rows.
    ///
    /// Each call creates a fresh reader, so the sequence can be restarted by
    /// calling again. An interruption ends the sequence instead of failing it.
    pub fn rows<T>(&self, query: &Query, options: &QueryOptions) -> BoxStream<'static, Result<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let name = query.name();
        tracing::trace!(query = name, "creating query reader");
        self.source
            .create_query_reader(query, options)
            .take_while(move |row| {
                let interrupted = matches!(row, Err(QueryError::Interrupted));
                if interrupted {
                    tracing::debug!(query = name, "query interrupted, ending row sequence");
                }
                future::ready(!interrupted)
            })
            .map(move |row| row.and_then(|row| decode_row(name, row)))
            .boxed()
    }

    /// Collects all rows. An interrupted query yields no rows at all.
    pub async fn collect<T>(&self, query: &Query, options: &QueryOptions) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let name = query.name();
        let mut reader = self.source.create_query_reader(query, options);
        let mut rows = Vec::new();
        while let Some(row) = reader.next().await {
            match row {
                Ok(row) => rows.push(decode_row(name, row)?),
                Err(QueryError::Interrupted) => {
                    tracing::debug!(query = name, "query interrupted, treating as no results");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            }
        }
        tracing::trace!(query = name, rows = rows.len(), "query complete");
        Ok(rows)
    }

    pub async fn query_subjects(&self) -> Result<Vec<SubjectRow>> {
        self.collect(&Query::Subjects, &QueryOptions::default()).await
    }

    pub async fn query_models(&self) -> Result<Vec<ModelRow>> {
        self.collect(&Query::Models, &QueryOptions::default()).await
    }

    pub async fn query_categories(&self) -> Result<Vec<CategoryRow>> {
        self.collect(&Query::Categories, &QueryOptions::default()).await
    }

    pub async fn query_definition_containers(&self) -> Result<Vec<DefinitionContainerRow>> {
        self.collect(&Query::DefinitionContainers, &QueryOptions::default())
            .await
    }

    pub async fn query_classifications(&self) -> Result<Vec<ClassificationRow>> {
        self.collect(&Query::Classifications, &QueryOptions::default())
            .await
    }

    pub async fn query_classification_categories(&self) -> Result<Vec<ClassificationCategoryRow>> {
        self.collect(&Query::ClassificationCategories, &QueryOptions::default())
            .await
    }

    pub async fn query_model_categories(&self, model_id: &Id) -> Result<Vec<Id>> {
        let query = Query::ModelCategories {
            model_id: model_id.clone(),
        };
        let rows: Vec<IdRow> = self.collect(&query, &QueryOptions::default()).await?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    pub async fn query_category_elements(
        &self,
        model_id: &Id,
        category_id: &Id,
    ) -> Result<Vec<ElementRow>> {
        let query = Query::CategoryElements {
            model_id: model_id.clone(),
            category_id: category_id.clone(),
        };
        self.collect(&query, &QueryOptions::default()).await
    }

    pub async fn query_element_children(&self, element_id: &Id) -> Result<Vec<ElementRow>> {
        let query = Query::ElementChildren {
            element_id: element_id.clone(),
        };
        self.collect(&query, &QueryOptions::default()).await
    }

    pub async fn query_sub_categories(&self, category_id: &Id) -> Result<Vec<SubCategoryRow>> {
        let query = Query::SubCategories {
            category_id: category_id.clone(),
        };
        self.collect(&query, &QueryOptions::default()).await
    }

    /// Owning model and display category of each element, in one batch.
    ///
    /// Runs no query for an empty set.
    pub async fn query_element_category_info(
        &self,
        element_ids: &BTreeSet<Id>,
        options: &QueryOptions,
    ) -> Result<Vec<ElementInfoRow>> {
        if element_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::ElementCategoryInfo {
            element_ids: element_ids.iter().cloned().collect(),
        };
        self.collect(&query, options).await
    }
}

fn decode_row<T: DeserializeOwned>(query: &'static str, row: Row) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|err| QueryError::Decode {
        query,
        message: err.to_string(),
    })
}
