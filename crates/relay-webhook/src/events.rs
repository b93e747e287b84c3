//! Webhook event types
//!
//! Decodes the `{ "event": ..., "data": ... }` envelope and classifies it
//! into a closed set of kinds. Recognized kinds carry a typed payload that
//! is validated while decoding.

use crate::{Result, WebhookError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of events the relay understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Mention,
    Notification,
    System,
    /// Anything the sender introduced after this relay was built
    Unknown,
}

impl EventKind {
    /// Classify an event name. Total: unrecognized names become `Unknown`.
    pub fn classify(event: &str) -> Self {
        match event {
            "mention" => Self::Mention,
            "notification" => Self::Notification,
            "system" => Self::System,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Notification => "notification",
            Self::System => "system",
            Self::Unknown => "unknown",
        }
    }

    /// Whether events of this kind produce a notification
    pub fn is_notifiable(&self) -> bool {
        matches!(self, Self::Mention | Self::Notification)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an event name
pub fn classify(event: &str) -> EventKind {
    EventKind::classify(event)
}

/// Envelope exactly as received on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name chosen by the sender
    pub event: String,
    /// Event payload, shape depends on the event
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Decode an envelope from raw body bytes
    pub fn decode(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| WebhookError::InvalidPayload(format!("malformed envelope: {}", e)))
    }

    pub fn kind(&self) -> EventKind {
        EventKind::classify(&self.event)
    }

    /// Validate the payload against the shape expected for its kind
    pub fn into_event(self) -> Result<WebhookEvent> {
        let kind = self.kind();
        match kind {
            EventKind::Mention => Ok(WebhookEvent::Mention(parse_data(kind, self.data)?)),
            EventKind::Notification => {
                Ok(WebhookEvent::Notification(parse_data(kind, self.data)?))
            }
            EventKind::System => Ok(WebhookEvent::System(self.data)),
            EventKind::Unknown => Ok(WebhookEvent::Unknown {
                event: self.event,
                data: self.data,
            }),
        }
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(kind: EventKind, data: serde_json::Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| WebhookError::InvalidPayload(format!("invalid {} data: {}", kind, e)))
}

/// A classified event with its validated payload
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Mention(MentionData),
    Notification(NotificationData),
    System(serde_json::Value),
    Unknown {
        event: String,
        data: serde_json::Value,
    },
}

impl WebhookEvent {
    /// Decode and classify a raw request body
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        Envelope::decode(raw)?.into_event()
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Mention(_) => EventKind::Mention,
            Self::Notification(_) => EventKind::Notification,
            Self::System(_) => EventKind::System,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }
}

/// Someone referenced the agent in conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionData {
    pub user: String,
    #[serde(default)]
    pub channel: Option<String>,
    /// ISO-8601 timestamp
    pub timestamp: String,
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A notification raised by the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// ISO-8601 timestamp
    pub timestamp: String,
}

/// Notification priority. Unrecognized values are read as `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "String")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        match value.as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Normal,
        }
    }
}

impl From<serde_json::Value> for Priority {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::from(s),
            _ => Self::Normal,
        }
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_known_kinds() {
        assert_eq!(classify("mention"), EventKind::Mention);
        assert_eq!(classify("notification"), EventKind::Notification);
        assert_eq!(classify("system"), EventKind::System);
    }

    #[test]
    fn test_classify_is_total() {
        for name in ["", "unknown_future_kind", "Mention", "mention ", "système", "null"] {
            assert_eq!(classify(name), EventKind::Unknown, "{:?}", name);
        }
    }

    #[test]
    fn test_kind_string_and_notifiable() {
        assert_eq!(EventKind::Mention.as_str(), "mention");
        assert_eq!(EventKind::Unknown.to_string(), "unknown");
        assert!(EventKind::Mention.is_notifiable());
        assert!(EventKind::Notification.is_notifiable());
        assert!(!EventKind::System.is_notifiable());
        assert!(!EventKind::Unknown.is_notifiable());
    }

    #[test]
    fn test_decode_mention() {
        let body = json!({
            "event": "mention",
            "data": {
                "user": "alice",
                "channel": "general",
                "timestamp": "2024-01-01T00:00:00Z",
                "message": "hi <there>"
            }
        });

        let event = WebhookEvent::from_slice(body.to_string().as_bytes()).unwrap();
        match event {
            WebhookEvent::Mention(data) => {
                assert_eq!(data.user, "alice");
                assert_eq!(data.channel.as_deref(), Some("general"));
                assert_eq!(data.message, "hi <there>");
                assert!(data.context.is_none());
                assert!(data.url.is_none());
            }
            other => panic!("expected mention, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_notification_priorities() {
        let decode = |priority: serde_json::Value| {
            let body = json!({
                "event": "notification",
                "data": {"message": "m", "priority": priority, "timestamp": "t"}
            });
            match WebhookEvent::from_slice(body.to_string().as_bytes()).unwrap() {
                WebhookEvent::Notification(data) => data.priority,
                other => panic!("expected notification, got {:?}", other),
            }
        };

        assert_eq!(decode(json!("high")), Some(Priority::High));
        assert_eq!(decode(json!("low")), Some(Priority::Low));
        assert_eq!(decode(json!("normal")), Some(Priority::Normal));
        assert_eq!(decode(json!("urgent")), Some(Priority::Normal));
        assert_eq!(decode(json!(1)), Some(Priority::Normal));
        assert_eq!(decode(json!(true)), Some(Priority::Normal));
        assert_eq!(decode(json!({"level": "high"})), Some(Priority::Normal));
        assert_eq!(decode(serde_json::Value::Null), None);
    }

    #[test]
    fn test_unknown_and_system_keep_raw_data() {
        let event =
            WebhookEvent::from_slice(br#"{"event":"unknown_future_kind","data":{"x":1}}"#).unwrap();
        assert_eq!(event.kind(), EventKind::Unknown);
        if let WebhookEvent::Unknown { event, data } = event {
            assert_eq!(event, "unknown_future_kind");
            assert_eq!(data["x"], 1);
        }

        let event = WebhookEvent::from_slice(br#"{"event":"system"}"#).unwrap();
        assert_eq!(event, WebhookEvent::System(serde_json::Value::Null));
    }

    #[test]
    fn test_invalid_payload_for_known_kind_is_rejected() {
        let result = WebhookEvent::from_slice(br#"{"event":"mention","data":{"user":"alice"}}"#);
        assert!(matches!(result, Err(WebhookError::InvalidPayload(_))));

        let result = WebhookEvent::from_slice(br#"{"event":"notification","data":"text"}"#);
        assert!(matches!(result, Err(WebhookError::InvalidPayload(_))));
    }

    #[test]
    fn test_malformed_envelope_is_rejected() {
        assert!(Envelope::decode(b"not json").is_err());
        assert!(Envelope::decode(br#"{"data":{}}"#).is_err());
        assert!(Envelope::decode(br#"{"event":42}"#).is_err());
    }
}
