//! Property-based tests for label selector isolation.
//!
//! Properties verified:
//! - Selectors of two distinct instances never select each other's pods
//! - Merging keeps every externally added label that does not collide

use std::collections::BTreeMap;

use proptest::prelude::*;
use webgame_api::labels::{matches, merge_labels, selector_labels};

fn label_value() -> impl Strategy<Value = String> {
    "[a-z0-9]([a-z0-9-]{0,20}[a-z0-9])?"
}

proptest! {
    /// Property: distinct instances never overlap, whatever their game types.
    #[test]
    fn prop_distinct_instances_never_overlap(
        game_a in label_value(),
        game_b in label_value(),
        name_a in label_value(),
        name_b in label_value(),
    ) {
        prop_assume!(name_a != name_b);

        let selector_a = selector_labels(&game_a, &name_a);
        let selector_b = selector_labels(&game_b, &name_b);

        prop_assert!(!matches(&selector_a, &selector_b));
        prop_assert!(!matches(&selector_b, &selector_a));
    }

    /// Property: a selector always matches the labels it was derived from,
    /// even after merging into arbitrary existing labels.
    #[test]
    fn prop_merge_preserves_selection_and_foreign_labels(
        game in label_value(),
        name in label_value(),
        foreign in proptest::collection::btree_map("[a-z]{1,8}\\.io/[a-z]{1,8}", label_value(), 0..5),
    ) {
        let selector = selector_labels(&game, &name);
        let merged = merge_labels(&foreign, &selector);

        prop_assert!(matches(&selector, &merged));
        for (key, value) in &foreign {
            prop_assert_eq!(merged.get(key), Some(value));
        }
    }
}

#[test]
fn test_same_instance_different_namespace_shares_labels_only() {
    let a = selector_labels("2048", "sample");
    let b = selector_labels("2048", "sample");
    assert_eq!(a, b);
    assert!(matches(&a, &b));
    let empty = BTreeMap::new();
    assert!(!matches(&a, &empty));
}
