//! Broadcast envelopes and store instance identity.
//!
//! Every store instance carries a random [`InstanceId`]. Outbound broadcast
//! messages are wrapped in an [`Envelope`] tagged with that id so a store can
//! recognise, and drop, its own messages when they come back around.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Opaque identifier of one store instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a random 128-bit id, hex encoded.
    pub fn random() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    /// Wrap an existing id (e.g. a peer's id read off the wire).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire shape of a broadcast message: `{ "instanceId": ..., "message": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Instance that published the message.
    pub instance_id: InstanceId,
    /// The published value, JSON encoded.
    pub message: Value,
}

impl Envelope {
    pub fn new(instance_id: InstanceId, message: Value) -> Self {
        Self {
            instance_id,
            message,
        }
    }

    /// Encode `value` and wrap it for `instance_id`.
    pub fn wrap<T: Serialize>(instance_id: &InstanceId, value: &T) -> Result<Self> {
        Ok(Self::new(instance_id.clone(), serde_json::to_value(value)?))
    }

    /// Parse an inbound raw message.
    ///
    /// Null, non-object payloads, a missing field or an empty instance id are
    /// all reported as [`CoreError::MalformedEnvelope`].
    pub fn from_json(raw: &Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(CoreError::MalformedEnvelope(format!(
                "expected object, got {}",
                json_kind(raw)
            )));
        }

        let envelope: Envelope = serde_json::from_value(raw.clone())
            .map_err(|e| CoreError::MalformedEnvelope(e.to_string()))?;

        if envelope.instance_id.as_str().is_empty() {
            return Err(CoreError::MalformedEnvelope("empty instanceId".into()));
        }

        Ok(envelope)
    }

    /// Encode for the wire.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "instanceId": self.instance_id.as_str(),
            "message": self.message,
        })
    }

    /// Whether this envelope was published by `id`.
    pub fn is_from(&self, id: &InstanceId) -> bool {
        &self.instance_id == id
    }

    /// Decode the carried message into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.message.clone())?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instance_ids_unique() {
        let a = InstanceId::random();
        let b = InstanceId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_wire_shape() {
        let env = Envelope::wrap(&InstanceId::new("local"), &7).unwrap();
        assert_eq!(env.to_json(), json!({ "instanceId": "local", "message": 7 }));

        let parsed = Envelope::from_json(&env.to_json()).unwrap();
        assert_eq!(parsed, env);
        assert_eq!(parsed.decode::<i32>().unwrap(), 7);
    }

    #[test]
    fn test_malformed_envelopes() {
        for raw in [
            Value::Null,
            json!("test3"),
            json!(42),
            json!({}),
            json!({ "message": 1 }),
            json!({ "instanceId": "", "message": 1 }),
        ] {
            let err = Envelope::from_json(&raw).unwrap_err();
            assert!(matches!(err, CoreError::MalformedEnvelope(_)), "{raw}");
        }
    }

    #[test]
    fn test_is_from() {
        let local = InstanceId::new("local");
        let env = Envelope::new(InstanceId::new("peer"), json!(7));
        assert!(!env.is_from(&local));
        assert!(Envelope::new(local.clone(), json!(7)).is_from(&local));
    }
}
