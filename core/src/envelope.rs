//! The standard event envelope (C1): the sole wire format carried in a
//! Stream entry's `payload` field.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Current envelope schema version.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Default event type used when the caller does not supply one.
pub const UNKNOWN_EVENT_TYPE: &str = "UnknownEventType";

/// The canonical event envelope wrapping a business payload with routing
/// and tracing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: String,
    pub event_type: String,
    pub source_service: String,
    pub published_at_utc: String,
    pub version: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub dialogue_session_id: Option<String>,
    pub actual_payload: Value,
}

impl Envelope {
    /// Build a new envelope, filling `event_id`, `published_at_utc`, and
    /// `version` and defaulting `event_type` to [`UNKNOWN_EVENT_TYPE`] when
    /// not given.
    pub fn build(
        payload: Value,
        source_service: impl Into<String>,
        event_type: Option<String>,
        trace_id: Option<String>,
        dialogue_session_id: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string()),
            source_service: source_service.into(),
            published_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            version: ENVELOPE_VERSION.to_string(),
            trace_id,
            dialogue_session_id,
            actual_payload: payload,
        }
    }

    /// Serialize to a JSON string, UTF-8, non-ASCII preserved.
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Parse an envelope from its JSON wire representation.
    pub fn parse(bytes: &str) -> Result<Self> {
        serde_json::from_str(bytes).map_err(|e| Error::deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_fills_required_fields() {
        let env = Envelope::build(json!({"text": "hello"}), "input", None, None, None);
        assert_eq!(env.event_type, UNKNOWN_EVENT_TYPE);
        assert_eq!(env.version, ENVELOPE_VERSION);
        assert_eq!(env.source_service, "input");
        assert!(!env.event_id.is_empty());
        assert!(env.published_at_utc.contains('T'));
        assert!(env.trace_id.is_none());
        assert!(env.dialogue_session_id.is_none());
    }

    #[test]
    fn round_trip_identity() {
        let env = Envelope::build(
            json!({"k": 1}),
            "nlu",
            Some("E".to_string()),
            Some("trace-1".to_string()),
            Some("session-1".to_string()),
        );
        let wire = env.serialize().unwrap();
        let parsed = Envelope::parse(&wire).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn wire_shape_has_exact_keys() {
        let env = Envelope::build(json!({"k": 1}), "input", Some("E".to_string()), None, None);
        let value: Value = serde_json::from_str(&env.serialize().unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "event_id",
            "event_type",
            "source_service",
            "published_at_utc",
            "version",
            "trace_id",
            "dialogue_session_id",
            "actual_payload",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert_eq!(obj["event_type"], json!("E"));
        assert_eq!(obj["version"], json!("1.0"));
        assert_eq!(obj["actual_payload"], json!({"k": 1}));
        assert!(obj["trace_id"].is_null());
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = Envelope::parse("{not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
