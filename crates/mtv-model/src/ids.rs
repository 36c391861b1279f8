//! Entity identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable id of a scene entity (hex string such as `"0x20000000001"`).
pub type Id = String;

/// Concrete kind of a scene entity.
///
/// Resolved from a class name through class-hierarchy inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Subject,
    Model,
    Category,
    SubCategory,
    DefinitionContainer,
    Element,
    Classification,
    ClassificationTable,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Subject,
        EntityKind::Model,
        EntityKind::Category,
        EntityKind::SubCategory,
        EntityKind::DefinitionContainer,
        EntityKind::Element,
        EntityKind::Classification,
        EntityKind::ClassificationTable,
    ];

    /// Stable lowercase label used in logs and snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Model => "model",
            Self::Category => "category",
            Self::SubCategory => "subCategory",
            Self::DefinitionContainer => "definitionContainer",
            Self::Element => "element",
            Self::Classification => "classification",
            Self::ClassificationTable => "classificationTable",
        }
    }

    /// Whether the entity is never displayed directly and only aggregates
    /// the visibility of what lies beneath it.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Subject
                | Self::DefinitionContainer
                | Self::Classification
                | Self::ClassificationTable
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class-qualified id of one instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceKey {
    /// Full class name, e.g. `BisCore.SpatialCategory`.
    pub class_name: String,
    pub id: Id,
}

impl InstanceKey {
    pub fn new(class_name: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            class_name: class_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class_name, self.id)
    }
}
