//! Telemetry event model.
//!
//! An [`Event`] carries a timestamp, optional identity fields, and a
//! stream-specific payload that the core never interprets. On the wire the
//! payload's keys sit next to `time`, `user_id`, and `installation_id`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stream-specific structured payload.
pub type Payload = Map<String, Value>;

/// A single telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Epoch milliseconds at which the event was produced.
    pub time: u64,

    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(
        default,
        alias = "installationId",
        skip_serializing_if = "Option::is_none"
    )]
    pub installation_id: Option<String>,

    /// Opaque payload, flattened into the event object.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Event {
    pub fn new(time: u64, payload: Payload) -> Self {
        Self {
            time,
            user_id: None,
            installation_id: None,
            payload,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_installation_id(mut self, installation_id: impl Into<String>) -> Self {
        self.installation_id = Some(installation_id.into());
        self
    }

    /// Add a single payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Equal in every field except `time`.
    ///
    /// This is the identity used for duplicate suppression.
    pub fn basically_equals(&self, other: &Event) -> bool {
        self.user_id == other.user_id
            && self.installation_id == other.installation_id
            && self.payload == other.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_basically_equals_ignores_time() {
        let a = Event::new(1, payload(json!({"path": "/home"}))).with_user_id("u1");
        let b = Event::new(999, payload(json!({"path": "/home"}))).with_user_id("u1");
        assert!(a.basically_equals(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_basically_equals_detects_field_changes() {
        let base = Event::new(1, payload(json!({"path": "/home"})));
        assert!(!base.basically_equals(&base.clone().with_user_id("u1")));
        assert!(!base.basically_equals(&base.clone().with_installation_id("i1")));
        assert!(!base.basically_equals(&base.clone().with_field("path", "/cart")));
    }

    #[test]
    fn test_payload_is_flattened_on_wire() {
        let event = Event::new(5, payload(json!({"mobile_event_type": "open"}))).with_user_id("u1");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"time": 5, "user_id": "u1", "mobile_event_type": "open"})
        );
    }

    #[test]
    fn test_legacy_identity_fields_parse() {
        let event: Event = serde_json::from_value(json!({
            "time": 7,
            "userId": "u1",
            "installationId": "i1",
            "fields": {"a": 1}
        }))
        .unwrap();
        assert_eq!(event.user_id.as_deref(), Some("u1"));
        assert_eq!(event.installation_id.as_deref(), Some("i1"));
        assert_eq!(event.payload.get("fields"), Some(&json!({"a": 1})));
        assert!(!event.payload.contains_key("userId"));
    }
}
