//! Two-tier filter matching.
//!
//! Tier one compares trigger identifiers exactly and is cheap enough for a
//! storage backend to push into its query. Tier two compares filter
//! parameters against the open-ended payload and runs in memory on the
//! reduced candidate set. Everything here is pure.
//!
//! Within a webhook, filters are OR-combined. Within a filter, parameters
//! are AND-combined.

use crate::notification::Notification;
use crate::value::Value;
use crate::webhook::{Filter, Webhook};

/// Full match: trigger tier and parameter tier.
#[must_use]
pub fn matches(webhook: &Webhook, notification: &Notification) -> bool {
    if webhook.filters.is_empty() {
        return true;
    }

    webhook
        .filters
        .iter()
        .filter(|f| filter_matches_trigger(f, notification.trigger_id()))
        .any(|f| parameters_match(f, notification))
}

/// Trigger tier only. An empty filter list is a wildcard subscription.
#[must_use]
pub fn matches_trigger(webhook: &Webhook, trigger_id: &str) -> bool {
    webhook.filters.is_empty()
        || webhook
            .filters
            .iter()
            .any(|f| filter_matches_trigger(f, trigger_id))
}

/// Exact string equality. Pattern expansion (e.g. `*.created`) is not
/// supported.
#[must_use]
pub fn filter_matches_trigger(filter: &Filter, trigger_id: &str) -> bool {
    filter.trigger_id == trigger_id
}

/// Parameter tier for one filter. Payload keys the filter does not mention
/// are ignored.
#[must_use]
pub fn parameters_match(filter: &Filter, notification: &Notification) -> bool {
    let Some(parameters) = filter.parameters.as_ref() else {
        return true;
    };

    let payload = notification.payload();
    parameters.iter().all(|(key, expected)| {
        payload
            .get(key)
            .is_some_and(|actual| value_matches(actual, expected))
    })
}

/// Compare one payload value against one filter value.
///
/// Both null match; a list payload matches when it contains the filter
/// value; anything else falls back to value equality.
#[must_use]
pub fn value_matches(payload_value: &Value, filter_value: &Value) -> bool {
    match payload_value {
        Value::Null if filter_value.is_null() => true,
        Value::List(_) => payload_value.contains(filter_value),
        _ => payload_value == filter_value,
    }
}
