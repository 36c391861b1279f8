mod support;

use std::collections::BTreeMap;

use mtv_model::{SetType, VisibilityState, VisibilityStatus};
use mtv_viewport::{ViewState, Viewport};
use proptest::prelude::*;
use support::*;

#[tokio::test(start_paused = true)]
async fn element_round_trip_keeps_model_and_category_displayed() {
    let Fixture {
        viewport, handler, ..
    } = setup(ViewState::default());
    let node = element("0x10", "0x20", "0x100");

    change(&handler, &node, true).await;
    assert!(viewport.views_model(&"0x10".to_string()));
    assert!(viewport.views_category(&"0x20".to_string()));
    assert!(viewport.drawn(SetType::Always).contains("0x100"));
    assert_eq!(status(&handler, &node).await, VisibilityStatus::visible());
    // Only the requested element shows up.
    assert_eq!(
        status(&handler, &element("0x10", "0x20", "0x103")).await.state,
        VisibilityState::Hidden
    );
    assert_eq!(
        status(&handler, &element("0x11", "0x20", "0x110")).await.state,
        VisibilityState::Hidden
    );

    change(&handler, &node, false).await;
    assert!(!viewport.drawn(SetType::Always).contains("0x100"));
    assert!(viewport.views_model(&"0x10".to_string()));
    assert!(viewport.views_category(&"0x20".to_string()));
    assert_eq!(status(&handler, &node).await.state, VisibilityState::Hidden);
}

#[tokio::test(start_paused = true)]
async fn element_change_plan_shape() {
    let Fixture { handler, .. } = setup(ViewState::default());
    let plan = handler
        .aggregator()
        .plan_node_change(&element("0x10", "0x20", "0x100"), true)
        .await
        .expect("plan");
    insta::assert_json_snapshot!(plan, @r#"
    [
      {
        "op": "changeModelDisplay",
        "modelIds": [
          "0x10"
        ],
        "on": true
      },
      {
        "op": "setPerModelCategoryOverride",
        "modelIds": [
          "0x10"
        ],
        "categoryIds": [
          "0x20",
          "0x21"
        ],
        "value": "hide"
      },
      {
        "op": "changeCategoryDisplay",
        "categoryIds": [
          "0x20"
        ],
        "on": true,
        "enableAllSubCategories": false
      },
      {
        "op": "setPerModelCategoryOverride",
        "modelIds": [
          "0x10",
          "0x11"
        ],
        "categoryIds": [
          "0x20"
        ],
        "value": "hide"
      },
      {
        "op": "addToDrawn",
        "setType": "always",
        "elementIds": [
          "0x100",
          "0x101"
        ]
      }
    ]
    "#);
}

#[tokio::test(start_paused = true)]
async fn turning_off_a_displayed_element_uses_never_drawn() {
    let Fixture {
        viewport, handler, ..
    } = setup(all_visible());
    change(&handler, &element("0x10", "0x21", "0x102"), false).await;

    assert_eq!(viewport.drawn(SetType::Never), set(&["0x102"]));
    assert_eq!(
        status(&handler, &model_category("0x10", "0x21")).await.state,
        VisibilityState::Partial
    );

    change(&handler, &element("0x10", "0x21", "0x102"), true).await;
    assert!(viewport.drawn(SetType::Never).is_empty());
    assert!(viewport.drawn(SetType::Always).is_empty());
    assert_eq!(status(&handler, &model("0x10")).await, VisibilityStatus::visible());
}

#[tokio::test(start_paused = true)]
async fn model_on_resets_overrides_and_drawn_elements() {
    let Fixture {
        viewport, handler, ..
    } = setup(ViewState {
        never_drawn: Some(set(&["0x102"])),
        always_drawn: Some(set(&["0x110"])),
        hidden_sub_categories: set(&["0x51"]),
        overrides: BTreeMap::from([(("0x10".to_string(), "0x20".to_string()), false)]),
        ..all_visible()
    });
    change(&handler, &model("0x10"), true).await;

    assert!(viewport.per_model_category_overrides().is_empty());
    assert!(viewport.drawn(SetType::Never).is_empty());
    // Other models keep their elements.
    assert_eq!(viewport.drawn(SetType::Always), set(&["0x110"]));
    assert_eq!(status(&handler, &model("0x10")).await, VisibilityStatus::visible());

    change(&handler, &model("0x10"), false).await;
    assert!(!viewport.views_model(&"0x10".to_string()));
    assert_eq!(status(&handler, &model("0x10")).await.state, VisibilityState::Hidden);
    assert_eq!(status(&handler, &subject("0x1")).await.state, VisibilityState::Partial);
}

#[tokio::test(start_paused = true)]
async fn scoped_category_on_shows_only_that_category() {
    let Fixture {
        viewport, handler, ..
    } = setup(ViewState {
        viewed_categories: set(&["0x20", "0x21"]),
        ..ViewState::default()
    });
    change(&handler, &model_category("0x10", "0x21"), true).await;

    assert!(viewport.views_model(&"0x10".to_string()));
    assert_eq!(
        status(&handler, &model_category("0x10", "0x21")).await.state,
        VisibilityState::Visible
    );
    assert_eq!(
        status(&handler, &model_category("0x10", "0x20")).await.state,
        VisibilityState::Hidden
    );
    assert_eq!(status(&handler, &model("0x10")).await.state, VisibilityState::Partial);
}

#[tokio::test(start_paused = true)]
async fn unscoped_category_off_hides_it_in_every_model() {
    let Fixture {
        viewport, handler, ..
    } = setup(ViewState {
        always_drawn: Some(set(&["0x103"])),
        ..all_visible()
    });
    change(&handler, &category("0x20"), false).await;

    assert!(!viewport.views_category(&"0x20".to_string()));
    assert!(viewport.drawn(SetType::Always).is_empty());
    assert_eq!(status(&handler, &category("0x20")).await.state, VisibilityState::Hidden);
    assert_eq!(status(&handler, &model("0x11")).await.state, VisibilityState::Hidden);
    assert_eq!(status(&handler, &model("0x10")).await.state, VisibilityState::Partial);
}

#[tokio::test(start_paused = true)]
async fn sub_category_on_displays_its_category() {
    let Fixture {
        viewport, handler, ..
    } = setup(ViewState {
        viewed_models: set(&["0x10", "0x11"]),
        hidden_sub_categories: set(&["0x51"]),
        ..ViewState::default()
    });
    let node = sub_category("0x20", "0x51");
    change(&handler, &node, true).await;

    assert!(viewport.views_category(&"0x20".to_string()));
    assert!(viewport.views_sub_category(&"0x51".to_string()));
    assert_eq!(status(&handler, &node).await.state, VisibilityState::Visible);

    change(&handler, &node, false).await;
    assert!(!viewport.views_sub_category(&"0x51".to_string()));
    assert_eq!(status(&handler, &category("0x20")).await.state, VisibilityState::Partial);
}

#[tokio::test(start_paused = true)]
async fn subject_change_reaches_nested_models() {
    let Fixture {
        viewport, handler, ..
    } = setup(all_visible());
    change(&handler, &subject("0x2"), false).await;

    assert!(!viewport.views_model(&"0x11".to_string()));
    assert!(viewport.views_model(&"0x10".to_string()));
    assert_eq!(status(&handler, &subject("0x1")).await.state, VisibilityState::Partial);
}

#[tokio::test(start_paused = true)]
async fn each_change_notifies_once() {
    let Fixture { handler, .. } = setup(ViewState::default());
    let count = count_notifications(&handler);
    change(&handler, &element("0x10", "0x20", "0x100"), true).await;
    assert_eq!(notifications(&count), 1);
}

fn arbitrary_view() -> impl Strategy<Value = ViewState> {
    let ids = |values: &'static [&'static str]| {
        proptest::sample::subsequence(values, 0..=values.len()).prop_map(|ids| set(&ids))
    };
    let overrides = proptest::collection::btree_map(
        (
            prop_oneof![Just("0x10"), Just("0x11")],
            prop_oneof![Just("0x20"), Just("0x21")],
        ),
        any::<bool>(),
        0..4,
    )
    .prop_map(|overrides| {
        overrides
            .into_iter()
            .map(|((model_id, category_id), shown)| {
                ((model_id.to_string(), category_id.to_string()), shown)
            })
            .collect::<BTreeMap<_, _>>()
    });
    const ELEMENTS: &[&str] = &["0x100", "0x101", "0x102", "0x103", "0x110"];
    (
        ids(&["0x10", "0x11"]),
        ids(&["0x20", "0x21"]),
        ids(&["0x50", "0x51", "0x52"]),
        ids(ELEMENTS),
        ids(ELEMENTS),
        overrides,
    )
        .prop_map(|(models, categories, hidden, always, never, overrides)| ViewState {
            viewed_models: models,
            viewed_categories: categories,
            hidden_sub_categories: hidden,
            always_drawn: Some(always),
            never_drawn: Some(never),
            overrides,
            spatial: true,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Whatever the starting state, turning a node on makes it visible and
    /// turning it off makes it hidden.
    #[test]
    fn changes_take_effect(view in arbitrary_view(), target in 0usize..6) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let Fixture { handler, .. } = setup(view);
            let node = match target {
                0 => subject("0x1"),
                1 => model("0x10"),
                2 => category("0x21"),
                3 => model_category("0x10", "0x20"),
                4 => element("0x10", "0x21", "0x102"),
                _ => element("0x10", "0x20", "0x100"),
            };

            change(&handler, &node, true).await;
            assert_eq!(status(&handler, &node).await.state, VisibilityState::Visible);
            change(&handler, &node, false).await;
            assert_eq!(status(&handler, &node).await.state, VisibilityState::Hidden);
        });
    }
}
