mod support;

use std::sync::Arc;

use mtv_filter::FilterError;
use mtv_model::{
    EntityKind, FilterPath, HierarchyNode, NodeFiltering, NodeKey, PathSegment, VisibilityState,
    VisibilityStatus,
};
use mtv_viewport::{ViewState, Viewport};
use mtv_visibility::{HandlerConfig, HandlerProps, HierarchyVisibilityHandler, VisibilityError};
use support::*;
use tokio::task::yield_now;

#[tokio::test(start_paused = true)]
async fn change_supersedes_pending_status_request() {
    let Fixture {
        source, handler, ..
    } = setup(ViewState::default());
    let node = subject("0x1");
    source.hold_queries();

    let (superseded, changed, ()) = tokio::join!(
        handler.get_visibility_status(&node),
        handler.change_visibility(&node, true),
        async {
            yield_now().await;
            source.release_queries();
        }
    );
    assert_eq!(superseded.expect("status"), VisibilityStatus::fallback());
    changed.expect("change");

    settle().await;
    assert_eq!(status(&handler, &node).await, VisibilityStatus::visible());
}

#[tokio::test(start_paused = true)]
async fn superseded_change_is_not_applied() {
    let Fixture {
        source,
        viewport,
        handler,
    } = setup(ViewState::default());
    let node = model("0x10");
    source.hold_queries();

    let (first, second, ()) = tokio::join!(
        handler.change_visibility(&node, true),
        async {
            yield_now().await;
            handler.change_visibility(&node, false).await
        },
        async {
            yield_now().await;
            yield_now().await;
            source.release_queries();
        }
    );
    first.expect("first");
    second.expect("second");
    settle().await;
    assert!(!viewport.views_model(&"0x10".to_string()));
    // Turning the model on would have displayed its categories.
    assert!(!viewport.views_category(&"0x20".to_string()));
}

#[tokio::test(start_paused = true)]
async fn status_request_outlives_an_earlier_change() {
    let Fixture {
        source, handler, ..
    } = setup(ViewState {
        viewed_categories: set(&["0x20"]),
        ..all_visible()
    });
    let node = category("0x21");
    source.hold_queries();

    // Hiding a hidden category writes nothing, so no notification follows.
    let (changed, answered, ()) = tokio::join!(
        handler.change_visibility(&node, false),
        async {
            yield_now().await;
            handler.get_visibility_status(&node).await
        },
        async {
            yield_now().await;
            yield_now().await;
            source.release_queries();
        }
    );
    changed.expect("change");
    assert_eq!(answered.expect("status"), VisibilityStatus::hidden());
}

#[tokio::test(start_paused = true)]
async fn visibility_change_abandons_pending_status_request() {
    let Fixture {
        source,
        viewport,
        handler,
    } = setup(all_visible());
    source.hold_queries();

    let model_0x10 = model("0x10");
    let (abandoned, ()) = tokio::join!(handler.get_visibility_status(&model_0x10), async {
        yield_now().await;
        viewport.change_model_display(&set(&["0x11"]), false);
        settle().await;
        source.release_queries();
    });
    assert_eq!(abandoned.expect("status"), VisibilityStatus::fallback());
    assert_eq!(status(&handler, &model("0x10")).await, VisibilityStatus::visible());
}

#[tokio::test(start_paused = true)]
async fn viewport_event_bursts_notify_once() {
    let Fixture {
        viewport, handler, ..
    } = setup(all_visible());
    let count = count_notifications(&handler);

    viewport.change_model_display(&set(&["0x10"]), false);
    viewport.change_category_display(&set(&["0x20"]), false, false);
    viewport.change_sub_category_display(&"0x51".to_string(), false);
    viewport.set_never_drawn(set(&["0x102"]));
    settle().await;
    assert_eq!(notifications(&count), 1);

    viewport.change_model_display(&set(&["0x10"]), true);
    settle().await;
    assert_eq!(notifications(&count), 2);
}

#[tokio::test(start_paused = true)]
async fn debounce_window_coalesces_spread_events() {
    let config = HandlerConfig {
        change_event_debounce_ms: 30,
        ..HandlerConfig::default()
    };
    let Fixture {
        viewport, handler, ..
    } = setup_with(all_visible(), config);
    let count = count_notifications(&handler);

    viewport.change_model_display(&set(&["0x10"]), false);
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    viewport.change_model_display(&set(&["0x11"]), false);
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(notifications(&count), 0);
    settle().await;
    assert_eq!(notifications(&count), 1);
}

#[tokio::test(start_paused = true)]
async fn nested_suppression_defers_notification_until_last_resume() {
    let Fixture {
        viewport, handler, ..
    } = setup(all_visible());
    let count = count_notifications(&handler);

    handler.suppress_change_events();
    handler.suppress_change_events();
    viewport.change_model_display(&set(&["0x10"]), false);
    settle().await;
    assert_eq!(notifications(&count), 0);

    handler.resume_change_events();
    settle().await;
    assert_eq!(notifications(&count), 0);
    assert!(handler.is_suppressed());

    handler.resume_change_events();
    settle().await;
    assert_eq!(notifications(&count), 1);

    // Unmatched resumes saturate.
    handler.resume_change_events();
    assert!(!handler.is_suppressed());
}

#[tokio::test(start_paused = true)]
async fn suppression_guard_resumes_on_drop() {
    let Fixture {
        viewport, handler, ..
    } = setup(all_visible());
    let count = count_notifications(&handler);
    {
        let _guard = handler.suppress();
        viewport.change_model_display(&set(&["0x11"]), false);
        settle().await;
        assert_eq!(notifications(&count), 0);
    }
    settle().await;
    assert_eq!(notifications(&count), 1);
}

/// Subject 0x1 -> model 0x10 -> category 0x20 -> element 0x100, and
/// subject 0x1 -> model 0x10 -> category 0x21.
fn filter_paths() -> Vec<FilterPath> {
    vec![
        vec![
            PathSegment::instance(SUBJECT, "0x1"),
            PathSegment::instance(MODEL, "0x10"),
            PathSegment::instance(CATEGORY, "0x20"),
            PathSegment::instance(ELEMENT, "0x100"),
        ],
        vec![
            PathSegment::instance(SUBJECT, "0x1"),
            PathSegment::instance(MODEL, "0x10"),
            PathSegment::instance(CATEGORY, "0x21"),
        ],
    ]
}

fn on_filter_path(node: HierarchyNode, parents: &[(&str, &str)]) -> HierarchyNode {
    node.with_parent_keys(
        parents
            .iter()
            .map(|(class_name, id)| NodeKey::instance(*class_name, *id))
            .collect(),
    )
    .with_filtering(NodeFiltering::default())
}

#[tokio::test(start_paused = true)]
async fn filtered_nodes_answer_for_their_matches_only() {
    let Fixture { handler, .. } = setup(ViewState {
        never_drawn: Some(set(&["0x103"])),
        ..all_visible()
    });
    handler.set_filter_paths(Some(filter_paths()));

    let filtered_category = on_filter_path(
        model_category("0x10", "0x20"),
        &[(SUBJECT, "0x1"), (MODEL, "0x10")],
    );
    assert_eq!(status(&handler, &filtered_category).await.state, VisibilityState::Visible);
    let filtered_model = on_filter_path(model("0x10"), &[(SUBJECT, "0x1")]);
    assert_eq!(status(&handler, &filtered_model).await.state, VisibilityState::Visible);

    // The same nodes outside a filter see 0x103.
    assert_eq!(
        status(&handler, &model_category("0x10", "0x20")).await.state,
        VisibilityState::Partial
    );
    handler.set_filter_paths(None);
    assert_eq!(status(&handler, &filtered_category).await.state, VisibilityState::Partial);
}

#[tokio::test(start_paused = true)]
async fn filtered_change_touches_matches_only() {
    let Fixture {
        viewport, handler, ..
    } = setup(all_visible());
    handler.set_filter_paths(Some(filter_paths()));
    let filtered_category = on_filter_path(
        model_category("0x10", "0x20"),
        &[(SUBJECT, "0x1"), (MODEL, "0x10")],
    );

    change(&handler, &filtered_category, false).await;
    assert_eq!(viewport.drawn(mtv_model::SetType::Never), set(&["0x100", "0x101"]));
    assert!(viewport.views_category(&"0x20".to_string()));
    assert_eq!(status(&handler, &filtered_category).await.state, VisibilityState::Hidden);
    assert_eq!(
        status(&handler, &element("0x10", "0x20", "0x103")).await.state,
        VisibilityState::Visible
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_one_tree_build() {
    let Fixture {
        source, handler, ..
    } = setup(all_visible());
    handler.set_filter_paths(Some(filter_paths()));
    let first = on_filter_path(model("0x10"), &[(SUBJECT, "0x1")]);
    let second = on_filter_path(
        model_category("0x10", "0x21"),
        &[(SUBJECT, "0x1"), (MODEL, "0x10")],
    );

    let (a, b) = tokio::join!(
        handler.get_visibility_status(&first),
        handler.get_visibility_status(&second)
    );
    a.expect("first");
    b.expect("second");
    // subject: 8 checks, model: 4, category: 3, element: 2
    assert_eq!(source.class_inspections(), 17);
    let tree = handler.filtered_tree().await.expect("tree").expect("filter set");
    assert!(tree.find(&["0x1", "0x10", "0x20", "0x100"]).is_some());
    assert_eq!(source.class_inspections(), 17);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_filter_paths_fail_requests() {
    let Fixture { handler, .. } = setup(all_visible());
    handler.set_filter_paths(Some(vec![vec![PathSegment::instance("Unknown.Thing", "0x99")]]));
    let node = HierarchyNode::new(NodeKey::instance("Unknown.Thing", "0x99"), EntityKind::Model)
        .with_filtering(NodeFiltering::default());
    let err = handler
        .get_visibility_status(&node)
        .await
        .expect_err("structural error");
    assert!(matches!(
        err,
        VisibilityError::Filter(FilterError::UnresolvableSegment { .. })
    ));
    assert!(!err.is_recoverable());
}

#[tokio::test(start_paused = true)]
async fn dispose_unsubscribes_everything() {
    let Fixture {
        viewport, handler, ..
    } = setup(all_visible());
    count_notifications(&handler);
    assert_eq!(viewport.events().viewed_models_changed.listener_count(), 1);
    assert_eq!(viewport.events().always_drawn_changed.listener_count(), 2);

    handler.dispose();
    assert!(handler.is_disposed());
    for event in viewport.events().all() {
        assert_eq!(event.listener_count(), 0);
    }
    assert_eq!(handler.on_visibility_change().listener_count(), 0);
    let err = handler
        .get_visibility_status(&model("0x10"))
        .await
        .expect_err("disposed");
    assert_eq!(err, VisibilityError::Disposed);
}

#[test]
fn creating_outside_a_runtime_fails() {
    let source = mtv_query::MemoryQuerySource::new(scene());
    let err = HierarchyVisibilityHandler::new(HandlerProps {
        viewport: Arc::new(mtv_viewport::MemoryViewport::default()),
        query_source: Arc::new(source.clone()),
        class_inspector: Arc::new(source),
        ids_cache: None,
        config: HandlerConfig::default(),
    })
    .expect_err("no runtime");
    assert_eq!(err, VisibilityError::NoRuntime);
}
