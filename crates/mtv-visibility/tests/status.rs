mod support;

use std::collections::BTreeMap;

use mtv_model::{EntityKind, HierarchyNode, NodeKey, VisibilityState, VisibilityStatus};
use mtv_query::QueryError;
use mtv_viewport::ViewState;
use mtv_visibility::VisibilityError;
use support::*;

#[tokio::test(start_paused = true)]
async fn everything_displayed_is_visible() {
    let Fixture { handler, .. } = setup(all_visible());
    for node in [
        subject("0x1"),
        model("0x10"),
        category("0x20"),
        model_category("0x11", "0x20"),
        sub_category("0x20", "0x51"),
        element("0x10", "0x20", "0x100"),
    ] {
        assert_eq!(status(&handler, &node).await, VisibilityStatus::visible(), "{:?}", node.key);
    }
}

#[tokio::test(start_paused = true)]
async fn hidden_sub_category_makes_its_category_partial() {
    let Fixture { handler, .. } = setup(ViewState {
        hidden_sub_categories: set(&["0x51"]),
        ..all_visible()
    });
    assert_eq!(status(&handler, &category("0x20")).await.state, VisibilityState::Partial);
    assert_eq!(status(&handler, &model("0x10")).await.state, VisibilityState::Partial);
    assert_eq!(
        status(&handler, &sub_category("0x20", "0x51")).await.state,
        VisibilityState::Hidden
    );
    assert_eq!(
        status(&handler, &sub_category("0x20", "0x50")).await.state,
        VisibilityState::Visible
    );
    // Elements follow the default sub-category.
    assert_eq!(
        status(&handler, &element("0x10", "0x20", "0x100")).await.state,
        VisibilityState::Visible
    );
}

#[tokio::test(start_paused = true)]
async fn never_drawn_elements_make_their_category_partial() {
    let Fixture { handler, .. } = setup(ViewState {
        never_drawn: Some(set(&["0x102"])),
        ..all_visible()
    });
    assert_eq!(
        status(&handler, &element("0x10", "0x21", "0x102")).await.state,
        VisibilityState::Hidden
    );
    assert_eq!(
        status(&handler, &model_category("0x10", "0x21")).await.state,
        VisibilityState::Partial
    );
    assert_eq!(status(&handler, &model("0x10")).await.state, VisibilityState::Partial);
    assert_eq!(status(&handler, &model("0x11")).await.state, VisibilityState::Visible);
    assert_eq!(
        status(&handler, &element("0x10", "0x20", "0x100")).await.state,
        VisibilityState::Visible
    );
}

#[tokio::test(start_paused = true)]
async fn subjects_merge_the_models_beneath_them() {
    let Fixture { handler, .. } = setup(ViewState {
        viewed_models: set(&["0x10"]),
        ..all_visible()
    });
    assert_eq!(status(&handler, &subject("0x1")).await.state, VisibilityState::Partial);
    assert_eq!(status(&handler, &subject("0x2")).await.state, VisibilityState::Hidden);
    assert_eq!(status(&handler, &category("0x20")).await.state, VisibilityState::Partial);
    assert_eq!(status(&handler, &category("0x21")).await.state, VisibilityState::Visible);
}

#[tokio::test(start_paused = true)]
async fn subjects_and_models_are_disabled_in_non_spatial_views() {
    let Fixture { handler, .. } = setup(ViewState {
        spatial: false,
        ..all_visible()
    });
    let disabled = VisibilityStatus::hidden().disabled();
    assert_eq!(status(&handler, &subject("0x1")).await, disabled);
    assert_eq!(status(&handler, &model("0x10")).await, disabled);
    assert_eq!(status(&handler, &category("0x20")).await, VisibilityStatus::visible());
}

#[tokio::test(start_paused = true)]
async fn always_drawn_elements_show_through_hidden_categories() {
    let Fixture { handler, .. } = setup(ViewState {
        always_drawn: Some(set(&["0x100"])),
        overrides: BTreeMap::from([(("0x10".to_string(), "0x20".to_string()), false)]),
        ..all_visible()
    });
    assert_eq!(
        status(&handler, &model_category("0x10", "0x20")).await.state,
        VisibilityState::Partial
    );
    assert_eq!(
        status(&handler, &model_category("0x11", "0x20")).await.state,
        VisibilityState::Visible
    );
    assert_eq!(
        status(&handler, &element("0x10", "0x20", "0x100")).await.state,
        VisibilityState::Visible
    );
    assert_eq!(
        status(&handler, &element("0x10", "0x20", "0x103")).await.state,
        VisibilityState::Hidden
    );
}

#[tokio::test(start_paused = true)]
async fn child_elements_count_towards_their_parent() {
    let Fixture { handler, .. } = setup(ViewState {
        never_drawn: Some(set(&["0x101"])),
        ..all_visible()
    });
    assert_eq!(
        status(&handler, &element("0x10", "0x20", "0x100")).await.state,
        VisibilityState::Partial
    );
}

#[tokio::test(start_paused = true)]
async fn containers_and_classifications_follow_their_categories() {
    let Fixture { handler, .. } = setup(ViewState {
        viewed_categories: set(&["0x20"]),
        ..all_visible()
    });
    let container = HierarchyNode::new(
        NodeKey::instance(CONTAINER, "0x40"),
        EntityKind::DefinitionContainer,
    );
    let table = HierarchyNode::new(
        NodeKey::instance(TABLE, "0x60"),
        EntityKind::ClassificationTable,
    );
    let classification =
        HierarchyNode::new(NodeKey::instance(CLASSIFICATION, "0x61"), EntityKind::Classification);

    assert_eq!(status(&handler, &container).await.state, VisibilityState::Visible);
    assert_eq!(status(&handler, &table).await.state, VisibilityState::Hidden);
    assert_eq!(status(&handler, &classification).await.state, VisibilityState::Hidden);
}

#[tokio::test(start_paused = true)]
async fn grouped_elements_merge_their_members() {
    let Fixture { handler, .. } = setup(ViewState {
        never_drawn: Some(set(&["0x103"])),
        ..all_visible()
    });
    let grouped = HierarchyNode::new(
        NodeKey::ClassGrouping {
            class_name: ELEMENT.into(),
            grouped_ids: vec!["0x100".into(), "0x103".into()],
        },
        EntityKind::Element,
    )
    .with_model("0x10")
    .with_category("0x20");
    assert_eq!(status(&handler, &grouped).await.state, VisibilityState::Partial);
}

#[tokio::test(start_paused = true)]
async fn element_nodes_need_model_and_category() {
    let Fixture { handler, .. } = setup(all_visible());
    let node = HierarchyNode::new(NodeKey::instance(ELEMENT, "0x100"), EntityKind::Element)
        .with_category("0x20");
    let err = handler
        .get_visibility_status(&node)
        .await
        .expect_err("missing model");
    assert_eq!(
        err,
        VisibilityError::MissingNodeData {
            kind: EntityKind::Element,
            field: "model id",
        }
    );
}

#[tokio::test(start_paused = true)]
async fn query_failures_propagate_and_are_retried() {
    let Fixture { source, handler, .. } = setup(all_visible());
    source.fail_queries("Subjects");
    let err = handler
        .get_visibility_status(&subject("0x1"))
        .await
        .expect_err("failure");
    assert!(matches!(err, VisibilityError::Query(QueryError::Failed { .. })));
    assert!(err.is_recoverable());

    source.clear_failures();
    assert_eq!(status(&handler, &subject("0x1")).await, VisibilityStatus::visible());
}

#[tokio::test(start_paused = true)]
async fn settled_statuses_reuse_cached_lookups() {
    let Fixture { source, handler, .. } = setup(all_visible());
    status(&handler, &model("0x10")).await;
    let queries = source.total_queries();
    status(&handler, &model("0x10")).await;
    status(&handler, &model_category("0x10", "0x20")).await;
    assert_eq!(source.total_queries(), queries);
}
