#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mtv_model::{EntityKind, HierarchyNode, Id, NodeKey, VisibilityStatus};
use mtv_query::{MemoryQuerySource, SceneData};
use mtv_viewport::{MemoryViewport, ViewState};
use mtv_visibility::{HandlerConfig, HandlerProps, HierarchyVisibilityHandler};

pub const SUBJECT: &str = "BisCore.Subject";
pub const MODEL: &str = "BisCore.PhysicalModel";
pub const CATEGORY: &str = "BisCore.SpatialCategory";
pub const SUB_CATEGORY: &str = "BisCore.SubCategory";
pub const ELEMENT: &str = "Generic.PhysicalObject";
pub const CONTAINER: &str = "BisCore.DefinitionContainer";
pub const TABLE: &str = "ClassificationSystems.ClassificationTable";
pub const CLASSIFICATION: &str = "ClassificationSystems.Classification";

/// Subject 0x1 owns model 0x10 and subject 0x2, which owns model 0x11.
///
/// Model 0x10 holds elements 0x100 (child 0x101 in category 0x21) and 0x103
/// in category 0x20, and 0x102 in category 0x21. Model 0x11 holds 0x110 in
/// category 0x20. Category 0x20 lives in container 0x40 and has
/// sub-categories 0x50 (default) and 0x51; category 0x21 is related to
/// classification 0x61 of table 0x60.
pub fn scene() -> SceneData {
    SceneData::from_json(
        r#"{
            "subjects": [
                { "id": "0x1" },
                { "id": "0x2", "parentId": "0x1" }
            ],
            "models": [
                { "id": "0x10", "parentId": "0x1" },
                { "id": "0x11", "parentId": "0x2" }
            ],
            "categories": [
                { "id": "0x20", "definitionContainerId": "0x40" },
                { "id": "0x21" }
            ],
            "subCategories": [
                { "id": "0x50", "categoryId": "0x20", "isDefault": true },
                { "id": "0x51", "categoryId": "0x20" },
                { "id": "0x52", "categoryId": "0x21", "isDefault": true }
            ],
            "definitionContainers": [{ "id": "0x40" }],
            "classifications": [{ "id": "0x61", "tableId": "0x60" }],
            "classificationCategories": [{ "classificationId": "0x61", "categoryId": "0x21" }],
            "elements": [
                { "id": "0x100", "modelId": "0x10", "categoryId": "0x20" },
                { "id": "0x101", "modelId": "0x10", "categoryId": "0x21", "parentId": "0x100" },
                { "id": "0x102", "modelId": "0x10", "categoryId": "0x21" },
                { "id": "0x103", "modelId": "0x10", "categoryId": "0x20" },
                { "id": "0x110", "modelId": "0x11", "categoryId": "0x20" }
            ],
            "classes": {
                "BisCore.PhysicalModel": ["BisCore.Model"],
                "BisCore.SpatialCategory": ["BisCore.Category"],
                "Generic.PhysicalObject": ["BisCore.GeometricElement3d"],
                "BisCore.GeometricElement3d": ["BisCore.GeometricElement"]
            }
        }"#,
    )
    .expect("scene")
}

pub fn set(values: &[&str]) -> BTreeSet<Id> {
    values.iter().map(|value| (*value).to_string()).collect()
}

/// Both models and both categories displayed.
pub fn all_visible() -> ViewState {
    ViewState {
        viewed_models: set(&["0x10", "0x11"]),
        viewed_categories: set(&["0x20", "0x21"]),
        ..ViewState::default()
    }
}

pub struct Fixture {
    pub source: MemoryQuerySource,
    pub viewport: Arc<MemoryViewport>,
    pub handler: HierarchyVisibilityHandler,
}

pub fn setup(view: ViewState) -> Fixture {
    setup_with(view, HandlerConfig::default())
}

pub fn setup_with(view: ViewState, config: HandlerConfig) -> Fixture {
    let source = MemoryQuerySource::new(scene());
    let viewport = Arc::new(MemoryViewport::new(view));
    viewport.register_sub_categories("0x20", ["0x50".to_string(), "0x51".to_string()]);
    viewport.register_sub_categories("0x21", ["0x52".to_string()]);
    let handler = HierarchyVisibilityHandler::new(HandlerProps {
        viewport: viewport.clone(),
        query_source: Arc::new(source.clone()),
        class_inspector: Arc::new(source.clone()),
        ids_cache: None,
        config,
    })
    .expect("handler");
    Fixture {
        source,
        viewport,
        handler,
    }
}

pub fn subject(id: &str) -> HierarchyNode {
    HierarchyNode::new(NodeKey::instance(SUBJECT, id), EntityKind::Subject)
}

pub fn model(id: &str) -> HierarchyNode {
    HierarchyNode::new(NodeKey::instance(MODEL, id), EntityKind::Model)
}

pub fn category(id: &str) -> HierarchyNode {
    HierarchyNode::new(NodeKey::instance(CATEGORY, id), EntityKind::Category)
}

pub fn model_category(model_id: &str, id: &str) -> HierarchyNode {
    category(id)
        .with_parent_keys(vec![NodeKey::instance(MODEL, model_id)])
        .with_model(model_id)
}

pub fn sub_category(category_id: &str, id: &str) -> HierarchyNode {
    HierarchyNode::new(NodeKey::instance(SUB_CATEGORY, id), EntityKind::SubCategory)
        .with_category(category_id)
}

pub fn element(model_id: &str, category_id: &str, id: &str) -> HierarchyNode {
    HierarchyNode::new(NodeKey::instance(ELEMENT, id), EntityKind::Element)
        .with_model(model_id)
        .with_category(category_id)
}

/// Lets debounce windows and pending notifications run out.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub async fn status(
    handler: &HierarchyVisibilityHandler,
    node: &HierarchyNode,
) -> VisibilityStatus {
    handler.get_visibility_status(node).await.expect("status")
}

/// Changes a node and waits for the resulting notification.
pub async fn change(handler: &HierarchyVisibilityHandler, node: &HierarchyNode, on: bool) {
    handler.change_visibility(node, on).await.expect("change");
    settle().await;
}

pub fn count_notifications(handler: &HierarchyVisibilityHandler) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    handler.on_visibility_change().add_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}

pub fn notifications(count: &AtomicUsize) -> usize {
    count.load(Ordering::SeqCst)
}
