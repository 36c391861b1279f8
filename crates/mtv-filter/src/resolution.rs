//! Class name to entity kind resolution.

use mtv_model::EntityKind;
use serde::{Deserialize, Serialize};

/// A base class and the entity kind of every class deriving from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPriority {
    pub kind: EntityKind,
    pub base_class: String,
}

impl ClassPriority {
    pub fn new(kind: EntityKind, base_class: impl Into<String>) -> Self {
        Self {
            kind,
            base_class: base_class.into(),
        }
    }
}

/// Ordered base classes checked when resolving a filter path identifier.
/// The first base class the identifier's class derives from wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassResolution {
    pub priorities: Vec<ClassPriority>,
}

impl Default for ClassResolution {
    fn default() -> Self {
        Self {
            priorities: vec![
                ClassPriority::new(EntityKind::SubCategory, "BisCore.SubCategory"),
                ClassPriority::new(EntityKind::Element, "BisCore.GeometricElement"),
                ClassPriority::new(EntityKind::Category, "BisCore.Category"),
                ClassPriority::new(EntityKind::Model, "BisCore.Model"),
                ClassPriority::new(
                    EntityKind::ClassificationTable,
                    "ClassificationSystems.ClassificationTable",
                ),
                ClassPriority::new(
                    EntityKind::Classification,
                    "ClassificationSystems.Classification",
                ),
                ClassPriority::new(EntityKind::DefinitionContainer, "BisCore.DefinitionContainer"),
                ClassPriority::new(EntityKind::Subject, "BisCore.Subject"),
            ],
        }
    }
}
