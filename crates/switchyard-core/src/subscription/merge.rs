//! Coverage comparison and widening merge of subscription requests.
//!
//! An empty scope filter means "unscoped" (match everything). Unioning two
//! non-empty filters is never treated as satisfying an unscoped request.

use std::collections::BTreeSet;

use switchyard_types::subscription::{ScopeFilters, WebhookSubscriptionRequest};

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub config: WebhookSubscriptionRequest,
    /// True iff `config` differs from the current configuration.
    pub changed: bool,
}

/// True iff a registration holding `existing` already satisfies `requested`.
///
/// Requested events must be a subset of the existing events. Per scope
/// dimension, an unscoped existing filter covers anything, while a scoped
/// existing filter only covers a scoped request whose values it contains.
pub fn compare_config(
    existing: &WebhookSubscriptionRequest,
    requested: &WebhookSubscriptionRequest,
) -> bool {
    if !requested.events.is_subset(&existing.events) {
        return false;
    }

    dimensions(&existing.filters, &requested.filters).all(|dimension| {
        match (
            existing.filters.get(dimension),
            requested.filters.get(dimension),
        ) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(have), Some(want)) => want.is_subset(have),
        }
    })
}

/// Widen `current` so it also covers `requested`.
pub fn merge(
    current: &WebhookSubscriptionRequest,
    requested: &WebhookSubscriptionRequest,
) -> Merged {
    let events = current.events.union(&requested.events).cloned().collect();

    let mut filters = ScopeFilters::new();
    for dimension in dimensions(&current.filters, &requested.filters) {
        if let (Some(a), Some(b)) = (
            current.filters.get(dimension),
            requested.filters.get(dimension),
        ) {
            filters.insert(dimension, a.union(b).cloned());
        }
        // Either side unscoped: the dimension stays unscoped.
    }

    let config = WebhookSubscriptionRequest { events, filters };
    let changed = &config != current;
    Merged { config, changed }
}

fn dimensions<'a>(a: &'a ScopeFilters, b: &'a ScopeFilters) -> impl Iterator<Item = &'a str> {
    a.dimensions()
        .chain(b.dimensions())
        .collect::<BTreeSet<_>>()
        .into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn events(list: &[&str]) -> WebhookSubscriptionRequest {
        WebhookSubscriptionRequest::new(list.iter().copied())
    }

    #[test]
    fn test_merge_adds_new_events() {
        let merged = merge(&events(&["A"]), &events(&["A", "B"]));
        assert_eq!(merged.config, events(&["A", "B"]));
        assert!(merged.changed);
    }

    #[test]
    fn test_merge_subset_request_is_unchanged() {
        let merged = merge(&events(&["A", "B"]), &events(&["A"]));
        assert_eq!(merged.config, events(&["A", "B"]));
        assert!(!merged.changed);
    }

    #[test]
    fn test_merge_unions_scoped_filters() {
        let current = events(&["A"]).with_filter("projects", ["P1"]);
        let requested = events(&["A"]).with_filter("projects", ["P2"]);
        let merged = merge(&current, &requested);
        assert!(merged.changed);
        assert_eq!(
            merged.config.filters.get("projects").unwrap().len(),
            2,
            "both project ids must be covered"
        );
    }

    #[test]
    fn test_merge_empty_filter_wins() {
        let scoped = events(&["A"]).with_filter("projects", ["P1"]);
        let unscoped = events(&["A"]);

        let merged = merge(&scoped, &unscoped);
        assert!(merged.changed);
        assert!(merged.config.filters.is_unscoped("projects"));

        let merged = merge(&unscoped, &scoped);
        assert!(!merged.changed);
        assert!(merged.config.filters.is_unscoped("projects"));
    }

    #[test]
    fn test_compare_config_event_subset() {
        assert!(compare_config(&events(&["A", "B"]), &events(&["A"])));
        assert!(!compare_config(&events(&["A"]), &events(&["A", "B"])));
    }

    #[test]
    fn test_compare_config_unscoped_existing_covers_scoped_request() {
        let existing = events(&["A"]);
        let requested = events(&["A"]).with_filter("environments", ["Env-1"]);
        assert!(compare_config(&existing, &requested));
    }

    #[test]
    fn test_compare_config_scoped_existing_does_not_cover_unscoped_request() {
        let existing = events(&["A"]).with_filter("environments", ["Env-1", "Env-2"]);
        let requested = events(&["A"]);
        assert!(!compare_config(&existing, &requested));
    }

    #[test]
    fn test_compare_config_scoped_values_must_be_contained() {
        let existing = events(&["A"]).with_filter("projects", ["P1", "P2"]);
        assert!(compare_config(
            &existing,
            &events(&["A"]).with_filter("projects", ["P2"])
        ));
        assert!(!compare_config(
            &existing,
            &events(&["A"]).with_filter("projects", ["P3"])
        ));
    }

    fn arb_request() -> impl Strategy<Value = WebhookSubscriptionRequest> {
        let events = prop::collection::btree_set("[A-D]", 0..4);
        let values = prop::collection::btree_set("[a-c][0-2]", 0..3);
        let filters = prop::collection::btree_map("(projects|environments|tenants)", values, 0..3);
        (events, filters).prop_map(|(events, filters)| WebhookSubscriptionRequest {
            events,
            filters: ScopeFilters::from(filters),
        })
    }

    proptest! {
        #[test]
        fn prop_merge_only_widens(current in arb_request(), requested in arb_request()) {
            let merged = merge(&current, &requested).config;

            prop_assert!(merged.events.is_superset(&current.events));
            prop_assert!(merged.events.is_superset(&requested.events));
            for dimension in ["projects", "environments", "tenants"] {
                if current.filters.is_unscoped(dimension) || requested.filters.is_unscoped(dimension) {
                    prop_assert!(merged.filters.is_unscoped(dimension));
                }
            }
            prop_assert!(compare_config(&merged, &current));
            prop_assert!(compare_config(&merged, &requested));
        }

        #[test]
        fn prop_changed_iff_not_covered(current in arb_request(), requested in arb_request()) {
            let result = merge(&current, &requested);
            prop_assert_eq!(result.changed, !compare_config(&current, &requested));
        }
    }
}
