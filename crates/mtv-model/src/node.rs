//! Hierarchy nodes as handed in by the tree, and filter paths.

use serde::{Deserialize, Serialize};

use crate::ids::{EntityKind, Id, InstanceKey};

/// Key of a hierarchy node.
///
/// A single UI node may stand for several merged instances, so instance keys
/// carry a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKey {
    /// Node built from one or more instances.
    #[serde(rename_all = "camelCase")]
    Instances { instance_keys: Vec<InstanceKey> },
    /// Node grouping instances of one class.
    #[serde(rename_all = "camelCase")]
    ClassGrouping {
        class_name: String,
        grouped_ids: Vec<Id>,
    },
    /// Node that is not backed by any instance.
    Generic { id: String },
}

impl NodeKey {
    /// Instance key node for the given instances.
    pub fn instances(keys: impl IntoIterator<Item = InstanceKey>) -> Self {
        Self::Instances {
            instance_keys: keys.into_iter().collect(),
        }
    }

    /// Instance key node for a single instance.
    pub fn instance(class_name: impl Into<String>, id: impl Into<Id>) -> Self {
        Self::instances([InstanceKey::new(class_name, id)])
    }

    /// Ids this key refers to. Empty for generic keys.
    pub fn ids(&self) -> Vec<&Id> {
        match self {
            Self::Instances { instance_keys } => instance_keys.iter().map(|key| &key.id).collect(),
            Self::ClassGrouping { grouped_ids, .. } => grouped_ids.iter().collect(),
            Self::Generic { .. } => Vec::new(),
        }
    }

    pub fn is_instances(&self) -> bool {
        matches!(self, Self::Instances { .. })
    }
}

/// Filtering information attached to a node of a filtered hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFiltering {
    /// The node itself matched the filter.
    pub is_filter_target: bool,
    /// Some ancestor matched the filter, so the whole subtree is shown.
    pub has_filter_target_ancestor: bool,
}

/// A node of the displayed hierarchy, as far as visibility is concerned.
///
/// `model_id` and `category_id` carry what the hierarchy definition knows about
/// the node's context: elements need both, categories may be scoped to a model
/// and sub-categories need their category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub key: NodeKey,
    /// Keys of all ancestors, root first.
    #[serde(default)]
    pub parent_keys: Vec<NodeKey>,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtering: Option<NodeFiltering>,
}

impl HierarchyNode {
    pub fn new(key: NodeKey, kind: EntityKind) -> Self {
        Self {
            key,
            parent_keys: Vec::new(),
            kind,
            model_id: None,
            category_id: None,
            filtering: None,
        }
    }

    pub fn with_parent_keys(mut self, parent_keys: Vec<NodeKey>) -> Self {
        self.parent_keys = parent_keys;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<Id>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_category(mut self, category_id: impl Into<Id>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_filtering(mut self, filtering: NodeFiltering) -> Self {
        self.filtering = Some(filtering);
        self
    }

    /// Ids of the instances this node stands for.
    pub fn ids(&self) -> Vec<Id> {
        self.key.ids().into_iter().cloned().collect()
    }

    /// Depth of the node in the hierarchy (0 for root nodes).
    pub fn depth(&self) -> usize {
        self.parent_keys.len()
    }

    pub fn is_filter_target(&self) -> bool {
        self.filtering
            .as_ref()
            .is_some_and(|filtering| filtering.is_filter_target)
    }

    /// Node sits on a filter path without being covered by a matched node.
    pub fn is_inside_filtered_subtree(&self) -> bool {
        self.filtering.as_ref().is_some_and(|filtering| {
            !filtering.is_filter_target && !filtering.has_filter_target_ancestor
        })
    }
}

/// One identifier of a filter path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PathSegment {
    Instance(InstanceKey),
    Generic { id: String },
}

impl PathSegment {
    pub fn instance(class_name: impl Into<String>, id: impl Into<Id>) -> Self {
        Self::Instance(InstanceKey::new(class_name, id))
    }
}

/// Identifiers from the hierarchy root to a matched node.
pub type FilterPath = Vec<PathSegment>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_cover_merged_instances() {
        let node = HierarchyNode::new(
            NodeKey::instances([
                InstanceKey::new("BisCore.SpatialCategory", "0x1"),
                InstanceKey::new("BisCore.SpatialCategory", "0x2"),
            ]),
            EntityKind::Category,
        );
        assert_eq!(node.ids(), vec!["0x1".to_string(), "0x2".to_string()]);
        assert_eq!(node.depth(), 0);
    }

    #[test]
    fn generic_key_has_no_ids() {
        let key = NodeKey::Generic {
            id: "no-data".into(),
        };
        assert!(key.ids().is_empty());
        assert!(!key.is_instances());
    }

    #[test]
    fn filtered_subtree_detection() {
        let node = HierarchyNode::new(
            NodeKey::instance("BisCore.Subject", "0x1"),
            EntityKind::Subject,
        );
        assert!(!node.is_inside_filtered_subtree());

        let on_path = node.clone().with_filtering(NodeFiltering::default());
        assert!(on_path.is_inside_filtered_subtree());

        let target = node.clone().with_filtering(NodeFiltering {
            is_filter_target: true,
            has_filter_target_ancestor: false,
        });
        assert!(!target.is_inside_filtered_subtree());
        assert!(target.is_filter_target());

        let below_target = node.with_filtering(NodeFiltering {
            is_filter_target: false,
            has_filter_target_ancestor: true,
        });
        assert!(!below_target.is_inside_filtered_subtree());
    }

    #[test]
    fn node_deserializes_from_json() {
        let node: HierarchyNode = serde_json::from_str(
            r#"{
                "key": {
                    "type": "instances",
                    "instanceKeys": [{ "className": "BisCore.PhysicalElement", "id": "0x30" }]
                },
                "kind": "element",
                "modelId": "0x10",
                "categoryId": "0x20"
            }"#,
        )
        .unwrap();
        assert_eq!(node.kind, EntityKind::Element);
        assert_eq!(node.model_id.as_deref(), Some("0x10"));
        assert!(node.parent_keys.is_empty());
    }
}
