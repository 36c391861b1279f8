//! Arena-backed trie of filter paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use mtv_model::{EntityKind, FilterPath, FilterTargets, HierarchyNode, Id, NodeKey, PathSegment};
use mtv_query::{ClassInspector, QueryOptions, QueryProvider};
use serde::Serialize;

use crate::error::{FilterError, Result};
use crate::resolution::ClassResolution;

/// One matched identifier of the filtered hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredTreeNode {
    pub id: Id,
    pub kind: EntityKind,
    /// Last identifier of some filter path.
    pub is_filter_target: bool,
    /// Owning model of elements, and of categories listed under a model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<Id>,
    /// Category of elements and sub-categories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Id>,
    #[serde(skip)]
    children: BTreeMap<Id, usize>,
}

impl FilteredTreeNode {
    fn new(id: Id, kind: EntityKind, is_filter_target: bool) -> Self {
        Self {
            id,
            kind,
            is_filter_target,
            model_id: None,
            category_id: None,
            children: BTreeMap::new(),
        }
    }

    pub fn child_ids(&self) -> impl Iterator<Item = &Id> {
        self.children.keys()
    }
}

/// Trie mirroring the hierarchy paths that lead to filter matches.
///
/// Nodes live in one arena; a virtual root owns the top-level nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredTree {
    roots: BTreeMap<Id, usize>,
    nodes: Vec<FilteredTreeNode>,
}

impl FilteredTree {
    /// Builds the trie from filter paths.
    ///
    /// Identifier classes are resolved through `inspector` against the
    /// `resolution` priority list, once per class name. Elements get their
    /// model and category from one batched query after all paths are walked.
    pub async fn build(
        paths: &[FilterPath],
        inspector: &dyn ClassInspector,
        provider: &QueryProvider,
        resolution: &ClassResolution,
    ) -> Result<Self> {
        let mut builder = Builder {
            tree: Self::default(),
            inspector,
            resolution,
            kinds: HashMap::new(),
            pending_elements: Vec::new(),
        };
        for path in paths {
            builder.add_path(path).await?;
        }
        builder.resolve_elements(provider).await?;
        let tree = builder.tree;
        tracing::debug!(paths = paths.len(), nodes = tree.len(), "built filtered tree");
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level nodes.
    pub fn roots(&self) -> impl Iterator<Item = &FilteredTreeNode> {
        self.roots.values().map(|index| &self.nodes[*index])
    }

    /// Children of a node, in id order.
    pub fn children<'a>(
        &'a self,
        node: &'a FilteredTreeNode,
    ) -> impl Iterator<Item = &'a FilteredTreeNode> {
        node.children.values().map(|index| &self.nodes[*index])
    }

    /// Node reached by following `ids` from the virtual root.
    pub fn find(&self, ids: &[&str]) -> Option<&FilteredTreeNode> {
        let mut level = &self.roots;
        let mut found = None;
        for id in ids {
            let node = &self.nodes[*level.get(*id)?];
            level = &node.children;
            found = Some(node);
        }
        found
    }

    fn level(&self, parent: Option<usize>) -> &BTreeMap<Id, usize> {
        match parent {
            Some(index) => &self.nodes[index].children,
            None => &self.roots,
        }
    }

    /// Ids whose visibility stands in for a node of the filtered hierarchy.
    ///
    /// The node's ancestor keys are matched level by level. A key standing for
    /// several merged instances matches any of them, so several trie nodes may
    /// be carried to the next level. Grouping keys among the ancestors are
    /// skipped. Matched nodes contribute themselves when they are filter
    /// targets or elements, their target and element descendants otherwise.
    /// A node that is not part of the trie has no targets.
    pub fn get_visibility_change_targets(&self, node: &HierarchyNode) -> FilterTargets {
        let mut targets = FilterTargets::default();
        let mut level: Vec<Option<usize>> = vec![None];

        let keys = node
            .parent_keys
            .iter()
            .filter(|key| key.is_instances())
            .chain(std::iter::once(&node.key));
        for key in keys {
            if matches!(key, NodeKey::Generic { .. }) {
                return targets;
            }
            let ids = key.ids();
            level = level
                .iter()
                .flat_map(|parent| {
                    let children = self.level(*parent);
                    ids.iter().filter_map(move |id| children.get(*id).copied())
                })
                .map(Some)
                .collect();
            if level.is_empty() {
                tracing::trace!(key = ?node.key, "node is not part of the filtered tree");
                return targets;
            }
        }

        let mut stack: Vec<usize> = level.into_iter().flatten().collect();
        let mut visited = BTreeSet::new();
        while let Some(index) = stack.pop() {
            if !visited.insert(index) {
                continue;
            }
            let trie_node = &self.nodes[index];
            if trie_node.is_filter_target || trie_node.kind == EntityKind::Element {
                add_target(&mut targets, trie_node);
            } else {
                stack.extend(trie_node.children.values().copied());
            }
        }
        targets
    }
}

fn add_target(targets: &mut FilterTargets, node: &FilteredTreeNode) {
    let id = node.id.clone();
    match node.kind {
        EntityKind::Subject => {
            targets.subject_ids.insert(id);
        }
        EntityKind::Model => {
            targets.model_ids.insert(id);
        }
        EntityKind::Category => targets.add_category(node.model_id.as_ref(), id),
        EntityKind::SubCategory => match &node.category_id {
            Some(category_id) => targets.add_sub_category(category_id.clone(), id),
            None => tracing::warn!(%id, "sub-category target without a category"),
        },
        EntityKind::DefinitionContainer => {
            targets.definition_containers.insert(id);
        }
        EntityKind::ClassificationTable => {
            targets.classification_tables.insert(id);
        }
        EntityKind::Classification => {
            targets.classifications.insert(id);
        }
        EntityKind::Element => match (&node.model_id, &node.category_id) {
            (Some(model_id), Some(category_id)) => {
                targets.add_element(model_id.clone(), category_id.clone(), id);
            }
            _ => tracing::warn!(%id, "element target without a model or category"),
        },
    }
}

struct Builder<'a> {
    tree: FilteredTree,
    inspector: &'a dyn ClassInspector,
    resolution: &'a ClassResolution,
    /// class name -> kind, for this build.
    kinds: HashMap<String, EntityKind>,
    pending_elements: Vec<usize>,
}

impl Builder<'_> {
    async fn add_path(&mut self, path: &FilterPath) -> Result<()> {
        let mut parent: Option<usize> = None;
        for (position, segment) in path.iter().enumerate() {
            let PathSegment::Instance(key) = segment else {
                break;
            };
            let is_terminal = position + 1 == path.len();
            let index = match self.tree.level(parent).get(&key.id).copied() {
                Some(index) => {
                    if is_terminal {
                        self.tree.nodes[index].is_filter_target = true;
                    }
                    index
                }
                None => {
                    let kind = self.resolve_kind(&key.class_name, &key.id).await?;
                    self.insert(parent, FilteredTreeNode::new(key.id.clone(), kind, is_terminal))
                }
            };
            if self.tree.nodes[index].is_filter_target {
                break;
            }
            parent = Some(index);
        }
        Ok(())
    }

    fn insert(&mut self, parent: Option<usize>, mut node: FilteredTreeNode) -> usize {
        let index = self.tree.nodes.len();
        if let Some(parent) = parent.map(|parent| &self.tree.nodes[parent]) {
            match (node.kind, parent.kind) {
                (EntityKind::Category, EntityKind::Model) => {
                    node.model_id = Some(parent.id.clone());
                }
                (EntityKind::SubCategory, EntityKind::Category) => {
                    node.category_id = Some(parent.id.clone());
                }
                _ => {}
            }
        }
        if node.kind == EntityKind::Element {
            self.pending_elements.push(index);
        }
        let id = node.id.clone();
        self.tree.nodes.push(node);
        match parent {
            Some(parent) => self.tree.nodes[parent].children.insert(id, index),
            None => self.tree.roots.insert(id, index),
        };
        index
    }

    async fn resolve_kind(&mut self, class_name: &str, id: &str) -> Result<EntityKind> {
        if let Some(kind) = self.kinds.get(class_name) {
            return Ok(*kind);
        }
        let resolution = self.resolution;
        for priority in &resolution.priorities {
            if self
                .inspector
                .class_derives_from(class_name, &priority.base_class)
                .await?
            {
                tracing::trace!(class_name, kind = %priority.kind, "resolved class");
                self.kinds.insert(class_name.to_string(), priority.kind);
                return Ok(priority.kind);
            }
        }
        Err(FilterError::UnresolvableSegment {
            class_name: class_name.to_string(),
            id: id.to_string(),
        })
    }

    async fn resolve_elements(&mut self, provider: &QueryProvider) -> Result<()> {
        if self.pending_elements.is_empty() {
            return Ok(());
        }
        let ids: BTreeSet<Id> = self
            .pending_elements
            .iter()
            .map(|index| self.tree.nodes[*index].id.clone())
            .collect();
        let rows = provider
            .query_element_category_info(&ids, &QueryOptions::default())
            .await?;
        let rows: HashMap<Id, _> = rows.into_iter().map(|row| (row.id.clone(), row)).collect();
        for index in self.pending_elements.drain(..) {
            let node = &mut self.tree.nodes[index];
            match rows.get(&node.id) {
                Some(row) => {
                    node.model_id = Some(row.model_id.clone());
                    node.category_id = Some(row.category_id.clone());
                }
                None => tracing::warn!(id = %node.id, "filtered element not found"),
            }
        }
        Ok(())
    }
}
