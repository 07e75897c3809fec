//! Inbound event messages (widget -> host).

use serde::Deserialize;
use serde_json::Value;

/// Event type strings as they appear on the wire.
pub mod event_types {
    pub const READY: &str = "WIDGET_READY";
    pub const OPENED: &str = "WIDGET_OPENED";
    pub const CLOSED: &str = "WIDGET_CLOSED";
    pub const ERROR: &str = "WIDGET_ERROR";
    pub const LOGOUT: &str = "WIDGET_LOGOUT";
    pub const NAVIGATED: &str = "WIDGET_NAVIGATED";
    pub const SESSION_EXPIRED: &str = "WIDGET_SESSION_EXPIRED";
}

/// Raw inbound envelope as delivered by the frame host.
///
/// `payload` defaults to `null` when absent; the widget is not required to
/// send one for signal-only events like `WIDGET_READY`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// A classified widget event. Unknown type strings are preserved rather
/// than rejected so the session can ignore them.
#[derive(Debug, Clone)]
pub enum WidgetEvent {
    Ready(Value),
    Opened(Value),
    Closed(Value),
    Error(Value),
    Logout(Value),
    Navigated(Value),
    SessionExpired(Value),
    Unknown(String),
}

impl WidgetEvent {
    /// Classifies an envelope by its type string.
    pub fn classify(envelope: InboundEnvelope) -> Self {
        let InboundEnvelope { kind, payload, .. } = envelope;
        match kind.as_str() {
            event_types::READY => WidgetEvent::Ready(payload),
            event_types::OPENED => WidgetEvent::Opened(payload),
            event_types::CLOSED => WidgetEvent::Closed(payload),
            event_types::ERROR => WidgetEvent::Error(payload),
            event_types::LOGOUT => WidgetEvent::Logout(payload),
            event_types::NAVIGATED => WidgetEvent::Navigated(payload),
            event_types::SESSION_EXPIRED => WidgetEvent::SessionExpired(payload),
            _ => WidgetEvent::Unknown(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_known_event_with_payload() {
        let envelope: InboundEnvelope = serde_json::from_value(json!({
            "type": "WIDGET_NAVIGATED",
            "payload": {"success": true, "path": "/gallery"},
        }))
        .unwrap();

        match WidgetEvent::classify(envelope) {
            WidgetEvent::Navigated(payload) => assert_eq!(payload["path"], "/gallery"),
            other => panic!("expected Navigated, got {other:?}"),
        }
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let envelope: InboundEnvelope =
            serde_json::from_value(json!({"type": "WIDGET_READY"})).unwrap();
        match WidgetEvent::classify(envelope) {
            WidgetEvent::Ready(payload) => assert!(payload.is_null()),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_preserved() {
        let envelope: InboundEnvelope =
            serde_json::from_value(json!({"type": "WIDGET_FUTURE_THING", "payload": {}})).unwrap();
        assert!(matches!(
            WidgetEvent::classify(envelope),
            WidgetEvent::Unknown(kind) if kind == "WIDGET_FUTURE_THING"
        ));
    }

    #[test]
    fn envelope_without_type_fails_to_parse() {
        let parsed = serde_json::from_value::<InboundEnvelope>(json!({"payload": {}}));
        assert!(parsed.is_err());
    }
}
