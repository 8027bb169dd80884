//! Messages exchanged between agents
//!
//! A [`Message`] is immutable once constructed. Its durable form is the
//! JSON object stored in the queue:
//!
//! ```json
//! {"id": "...", "sender": "...", "receiver": "...", "type": "...",
//!  "payload": {...}, "timestamp": "..."}
//! ```

use chrono::Utc;
use repogent_core::{PriorityClass, RepogentError, Result};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Ceiling on the serialized payload of a single message
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 512 * 1024;

const REQUIRED_FIELDS: [&str; 4] = ["sender", "receiver", "type", "payload"];

/// A message in the Repogent coordination protocol
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: String,
    sender: String,
    receiver: String,
    message_type: String,
    payload: Map<String, Value>,
    timestamp: String,
}

impl Message {
    /// Construct a message under the default payload ceiling
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message_type: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Result<Self> {
        Self::with_limit(sender, receiver, message_type, payload, DEFAULT_MAX_PAYLOAD_BYTES)
    }

    /// Construct a message, rejecting payloads larger than `max_payload_bytes`
    pub fn with_limit(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message_type: impl Into<String>,
        payload: Map<String, Value>,
        max_payload_bytes: usize,
    ) -> Result<Self> {
        let sender = sender.into();
        let receiver = receiver.into();
        let message_type = message_type.into();

        for (field, value) in [
            ("sender", &sender),
            ("receiver", &receiver),
            ("message_type", &message_type),
        ] {
            if value.trim().is_empty() {
                return Err(RepogentError::InvalidMessage(format!(
                    "{} must be a non-empty string",
                    field
                )));
            }
        }

        let size = serde_json::to_vec(&payload)?.len();
        if size > max_payload_bytes {
            return Err(RepogentError::PayloadTooLarge {
                size,
                max: max_payload_bytes,
            });
        }

        let now = Utc::now();
        let discriminator = Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}_{}_{}_{}",
            sender,
            receiver,
            now.timestamp_micros(),
            &discriminator[..8]
        );

        Ok(Self {
            id,
            sender,
            receiver,
            message_type,
            payload,
            timestamp: now.to_rfc3339(),
        })
    }

    /// Construct from an arbitrary JSON payload, which must be an object
    pub fn from_parts(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message_type: impl Into<String>,
        payload: Value,
    ) -> Result<Self> {
        match payload {
            Value::Object(map) => Self::new(sender, receiver, message_type, map),
            other => Err(RepogentError::InvalidMessage(format!(
                "payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Rebuild a message from its stored form under the default ceiling
    pub fn from_durable_form(record: &Value) -> Result<Self> {
        Self::from_durable_form_with_limit(record, DEFAULT_MAX_PAYLOAD_BYTES)
    }

    /// Rebuild a message from its stored form
    ///
    /// The stored `id` and `timestamp` replace the generated ones when present,
    /// so records written by older producers keep their identity.
    pub fn from_durable_form_with_limit(record: &Value, max_payload_bytes: usize) -> Result<Self> {
        let fields = record.as_object().ok_or_else(|| {
            RepogentError::InvalidMessage(format!(
                "message record must be a JSON object, got {}",
                json_kind(record)
            ))
        })?;

        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| !fields.contains_key(**f))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RepogentError::MissingFields(missing));
        }

        let text = |name: &str| -> Result<String> {
            fields[name].as_str().map(str::to_string).ok_or_else(|| {
                RepogentError::InvalidMessage(format!(
                    "{} must be a string, got {}",
                    name,
                    json_kind(&fields[name])
                ))
            })
        };

        let payload = match &fields["payload"] {
            Value::Object(map) => map.clone(),
            other => {
                return Err(RepogentError::InvalidMessage(format!(
                    "payload must be a JSON object, got {}",
                    json_kind(other)
                )))
            }
        };

        let mut message = Self::with_limit(
            text("sender")?,
            text("receiver")?,
            text("type")?,
            payload,
            max_payload_bytes,
        )?;

        if let Some(id) = fields.get("id").and_then(Value::as_str) {
            message.id = id.to_string();
        }
        if let Some(timestamp) = fields.get("timestamp").and_then(Value::as_str) {
            message.timestamp = timestamp.to_string();
        }

        Ok(message)
    }

    /// Stored form with explicit fields
    pub fn to_durable_form(&self) -> Value {
        json!({
            "id": self.id,
            "sender": self.sender,
            "receiver": self.receiver,
            "type": self.message_type,
            "payload": self.payload,
            "timestamp": self.timestamp,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Priority class derived from the message type
    pub fn priority(&self) -> PriorityClass {
        PriorityClass::of(&self.message_type)
    }

    /// Check if this message is addressed to `agent`
    pub fn is_for(&self, agent: &str) -> bool {
        self.receiver == agent
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_message_fields() {
        let msg = Message::new(
            "cicd_agent",
            "orchestrator",
            "build_failure",
            payload(json!({"pr_number": 42})),
        )
        .unwrap();

        assert_eq!(msg.sender(), "cicd_agent");
        assert_eq!(msg.receiver(), "orchestrator");
        assert_eq!(msg.message_type(), "build_failure");
        assert_eq!(msg.payload()["pr_number"], json!(42));
        assert!(msg.id().starts_with("cicd_agent_orchestrator_"));
        assert_eq!(msg.priority(), PriorityClass::Critical);
        assert!(msg.is_for("orchestrator"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Message::new("a", "b", "ping", Map::new()).unwrap();
        let b = Message::new("a", "b", "ping", Map::new()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_rejects_empty_fields() {
        assert!(matches!(
            Message::new("", "b", "ping", Map::new()),
            Err(RepogentError::InvalidMessage(_))
        ));
        assert!(Message::new("a", " ", "ping", Map::new()).is_err());
        assert!(Message::new("a", "b", "", Map::new()).is_err());
    }

    #[test]
    fn test_rejects_non_object_payload() {
        let result = Message::from_parts("a", "b", "ping", json!([1, 2, 3]));
        assert!(matches!(result, Err(RepogentError::InvalidMessage(_))));

        let result = Message::from_parts("a", "b", "ping", json!("text"));
        assert!(result.is_err());
    }

    #[test]
    fn test_payload_size_ceiling() {
        let big = "x".repeat(DEFAULT_MAX_PAYLOAD_BYTES);
        let result = Message::new("a", "b", "ping", payload(json!({ "blob": big })));
        match result {
            Err(RepogentError::PayloadTooLarge { size, max }) => {
                assert!(size > max);
                assert_eq!(max, DEFAULT_MAX_PAYLOAD_BYTES);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_limit() {
        let data = payload(json!({"note": "0123456789"}));
        assert!(Message::with_limit("a", "b", "ping", data.clone(), 8).is_err());
        assert!(Message::with_limit("a", "b", "ping", data, 1024).is_ok());
    }

    #[test]
    fn test_durable_round_trip() {
        let original = Message::new(
            "pr_reviewer",
            "orchestrator",
            "log_decision",
            payload(json!({"action": "review", "nested": {"z": 1, "a": [1, 2]}})),
        )
        .unwrap();

        let restored = Message::from_durable_form(&original.to_durable_form()).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_durable_form_keys() {
        let msg = Message::new("a", "b", "ping", Map::new()).unwrap();
        let record = msg.to_durable_form();
        let keys: Vec<&str> = record.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "sender", "receiver", "type", "payload", "timestamp"]);
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let err = Message::from_durable_form(&json!({"sender": "a", "payload": {}})).unwrap_err();
        match err {
            RepogentError::MissingFields(fields) => {
                assert_eq!(fields, vec!["receiver".to_string(), "type".to_string()]);
            }
            other => panic!("expected MissingFields, got {:?}", other),
        }
    }

    #[test]
    fn test_durable_form_requires_object_payload() {
        let record = json!({"sender": "a", "receiver": "b", "type": "t", "payload": [1]});
        assert!(matches!(
            Message::from_durable_form(&record),
            Err(RepogentError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_legacy_record_without_id_gets_fresh_identity() {
        let record = json!({"sender": "a", "receiver": "b", "type": "t", "payload": {}});
        let msg = Message::from_durable_form(&record).unwrap();
        assert!(msg.id().starts_with("a_b_"));
        assert!(!msg.timestamp().is_empty());
    }

    #[test]
    fn test_stored_identity_overrides_generated() {
        let record = json!({
            "id": "legacy-1",
            "sender": "a",
            "receiver": "b",
            "type": "t",
            "payload": {},
            "timestamp": "2024-01-01T00:00:00"
        });
        let msg = Message::from_durable_form(&record).unwrap();
        assert_eq!(msg.id(), "legacy-1");
        assert_eq!(msg.timestamp(), "2024-01-01T00:00:00");
    }
}
