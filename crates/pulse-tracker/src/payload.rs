//! Flattens an enriched event into its wire payload.

use pulse_state::InspectableEvent;
use pulse_types::schemas::{self, keys};
use pulse_types::{Payload, SelfDescribingJson, TRACKER_VERSION};
use serde_json::{json, Map, Value};

use crate::subject::Subject;
use crate::tracker::TrackerSettings;

/// Longest URL scheme kept when promoting deep-link fields.
pub const MAX_URL_SCHEME_LEN: usize = 16;

/// Builds the payload for `event`.
///
/// `fields` is the event's own payload after state machines added their
/// values; `entities` is every entity that goes into the context array, in
/// the order it should appear.
pub fn build_payload(
    settings: &TrackerSettings,
    subject: Option<&Subject>,
    event: &InspectableEvent,
    fields: &Map<String, Value>,
    entities: &[SelfDescribingJson],
) -> Payload {
    let mut payload = Payload::new();
    payload.insert(keys::TRACKER_VERSION, TRACKER_VERSION);
    payload.insert(keys::NAMESPACE, settings.namespace.as_str());
    payload.insert(keys::APP_ID, settings.app_id.as_str());
    payload.insert(keys::PLATFORM, settings.platform.as_str());
    if let Some(subject) = subject {
        subject.write_to(&mut payload);
    }

    payload.insert(keys::EVENT, event.name);
    payload.insert(keys::EVENT_ID, event.id.to_string());
    payload.insert(keys::DEVICE_TIMESTAMP, event.timestamp_ms.to_string());
    if let Some(ttm) = event.true_timestamp {
        payload.insert(keys::TRUE_TIMESTAMP, ttm.to_string());
    }

    match event.schema.as_deref() {
        Some(schema) => {
            let body = json!({
                "schema": schemas::UNSTRUCT_EVENT,
                "data": { "schema": schema, "data": fields },
            });
            payload.insert_json(
                &body,
                settings.base64_encoding,
                keys::UNSTRUCTURED_ENCODED,
                keys::UNSTRUCTURED,
            );
        }
        None => {
            for (key, value) in fields {
                if payload.contains_key(key) {
                    tracing::warn!(
                        key = key.as_str(),
                        event = event.name,
                        "event field collides with a tracker key, keeping the tracker value"
                    );
                    continue;
                }
                payload.insert(key.as_str(), flatten(value));
            }
        }
    }

    if !entities.is_empty() {
        let data: Vec<Value> = entities.iter().map(SelfDescribingJson::to_json).collect();
        let contexts = json!({ "schema": schemas::CONTEXTS, "data": data });
        payload.insert_json(
            &contexts,
            settings.base64_encoding,
            keys::CONTEXT_ENCODED,
            keys::CONTEXT,
        );
    }

    promote_deep_link(&mut payload, event, fields, entities);
    payload
}

fn flatten(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// Downstream enrichment reads the deep link from flat `url`/`refr` keys, so
// they are copied out of the nested body or entity for these two event kinds.
fn promote_deep_link(
    payload: &mut Payload,
    event: &InspectableEvent,
    fields: &Map<String, Value>,
    entities: &[SelfDescribingJson],
) {
    let (url, referrer) = match event.schema.as_deref() {
        Some(schemas::DEEP_LINK_RECEIVED) => (
            fields.get("url").and_then(Value::as_str),
            fields.get("referrer").and_then(Value::as_str),
        ),
        Some(schemas::SCREEN_VIEW) => {
            let Some(link) = entities.iter().find(|e| e.schema == schemas::DEEP_LINK_ENTITY) else {
                return;
            };
            (link.str_field("url"), link.str_field("referrer"))
        }
        _ => return,
    };

    if let Some(url) = url {
        payload.insert(keys::PAGE_URL, truncate_url_scheme(url));
    }
    if let Some(referrer) = referrer {
        payload.insert(keys::PAGE_REFERRER, truncate_url_scheme(referrer));
    }
}

/// Shortens the scheme of `url` to [`MAX_URL_SCHEME_LEN`] characters.
pub fn truncate_url_scheme(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) if scheme.chars().count() > MAX_URL_SCHEME_LEN => {
            let scheme: String = scheme.chars().take(MAX_URL_SCHEME_LEN).collect();
            format!("{scheme}://{rest}")
        }
        _ => url.to_string(),
    }
}
