//! Label selector helpers.
//!
//! The selector `{gameType, instance}` is the only key binding workload pods
//! to the endpoint, so it is derived here and nowhere else.

use std::collections::BTreeMap;

use itertools::Itertools;

/// Label carrying the game variant.
pub const GAME_TYPE_LABEL: &str = "gameType";

/// Label carrying the instance name.
pub const INSTANCE_LABEL: &str = "instance";

/// Selector labels for one game instance.
pub fn selector_labels(game_type: &str, instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (GAME_TYPE_LABEL.to_string(), game_type.to_string()),
        (INSTANCE_LABEL.to_string(), instance.to_string()),
    ])
}

/// Merge `desired` into `existing`.
///
/// Keys only present in `existing` survive; on conflicting keys `desired`
/// wins.
pub fn merge_labels(
    existing: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    existing
        .iter()
        .chain(desired.iter())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Whether every selector entry is present in `labels`.
pub fn matches(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
}

/// Render a selector as `k1=v1,k2=v2`.
pub fn to_selector_string(selector: &BTreeMap<String, String>) -> String {
    selector.iter().map(|(k, v)| format!("{k}={v}")).join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_merge_keeps_external_labels() {
        let existing = map(&[("team", "arcade"), ("gameType", "old")]);
        let desired = map(&[("gameType", "2048"), ("instance", "sample")]);

        let merged = merge_labels(&existing, &desired);

        assert_eq!(
            merged,
            map(&[("team", "arcade"), ("gameType", "2048"), ("instance", "sample")])
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = map(&[("team", "arcade")]);
        let desired = selector_labels("2048", "sample");
        let once = merge_labels(&existing, &desired);
        let twice = merge_labels(&once, &desired);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_matches_requires_every_entry() {
        let selector = selector_labels("2048", "sample");
        assert!(matches(&selector, &map(&[
            ("gameType", "2048"),
            ("instance", "sample"),
            ("extra", "x"),
        ])));
        assert!(!matches(&selector, &map(&[("gameType", "2048")])));
        assert!(!matches(&selector, &selector_labels("2048", "other")));
    }

    #[test]
    fn test_selector_string_is_sorted() {
        let selector = selector_labels("2048", "sample");
        assert_eq!(to_selector_string(&selector), "gameType=2048,instance=sample");
    }
}
