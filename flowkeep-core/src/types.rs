//! Domain types shared by every flowkeep crate.
//!
//! [`Flow`] mirrors one object of the remote `chatflows` collection. Only the
//! fields flowkeep needs are modelled; anything else in the response is
//! ignored on deserialization.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Category used when a flow carries no `type`.
pub const UNCATEGORIZED: &str = "uncategorized";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a configured remote instance.
///
/// Doubles as the directory name under `flows/` and the state-file
/// discriminator, so configuration validation keeps it path-safe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceName(pub String);

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InstanceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque, stable identifier of a flow within one instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for FlowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FlowId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// One flow definition as returned by `GET /api/v1/chatflows`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,

    /// Free-form classification (wire field `type`).
    #[serde(rename = "type", default, deserialize_with = "optional_string")]
    pub category: Option<String>,

    /// Version token used for change detection only (wire field `updatedDate`).
    #[serde(rename = "updatedDate", default, deserialize_with = "opaque_token")]
    pub updated_at: String,

    /// Document body (wire field `flowData`): usually a JSON-encoded string,
    /// occasionally an inline document.
    #[serde(rename = "flowData", default)]
    pub payload: Option<Value>,
}

impl Flow {
    /// The category this flow is filed under; `uncategorized` when absent.
    pub fn category(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(category) if !category.is_empty() => category,
            _ => UNCATEGORIZED,
        }
    }

    /// Decode the payload into a JSON document.
    ///
    /// Returns `Ok(None)` when the flow carries no body (missing, `null`, or a
    /// blank string). A string body that is not valid JSON is an error.
    pub fn payload_document(&self) -> Result<Option<Value>, serde_json::Error> {
        match &self.payload {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
            Some(Value::String(raw)) => serde_json::from_str(raw).map(Some),
            Some(document) => Ok(Some(document.clone())),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

/// Accept any JSON scalar; strings are kept verbatim, everything else is
/// rendered to its JSON text so numeric version counters still compare.
fn opaque_token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_wire_fields_and_ignores_extras() {
        let flow: Flow = serde_json::from_value(json!({
            "id": "abc123",
            "name": "Test Flow",
            "flowData": "{\"a\":1}",
            "updatedDate": "2024-01-01T00:00:00.000Z",
            "type": "chatflow",
            "deployed": false
        }))
        .unwrap();

        assert_eq!(flow.id, FlowId::from("abc123"));
        assert_eq!(flow.name, "Test Flow");
        assert_eq!(flow.category(), "chatflow");
        assert_eq!(flow.updated_at, "2024-01-01T00:00:00.000Z");
        assert_eq!(flow.payload_document().unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn missing_type_falls_back_to_uncategorized() {
        let flow: Flow = serde_json::from_value(json!({"id": "x", "type": null})).unwrap();
        assert_eq!(flow.category(), UNCATEGORIZED);

        let blank: Flow = serde_json::from_value(json!({"id": "x", "type": "  "})).unwrap();
        assert_eq!(blank.category(), UNCATEGORIZED);
    }

    #[test]
    fn null_name_and_numeric_token_are_tolerated() {
        let flow: Flow =
            serde_json::from_value(json!({"id": "x", "name": null, "updatedDate": 17})).unwrap();
        assert_eq!(flow.name, "");
        assert_eq!(flow.updated_at, "17");
    }

    #[test]
    fn blank_or_missing_payload_is_none() {
        for body in [json!(null), json!(""), json!("   ")] {
            let flow: Flow = serde_json::from_value(json!({"id": "x", "flowData": body})).unwrap();
            assert_eq!(flow.payload_document().unwrap(), None);
        }
        let flow: Flow = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert_eq!(flow.payload_document().unwrap(), None);
    }

    #[test]
    fn inline_document_payload_is_used_as_is() {
        let flow: Flow =
            serde_json::from_value(json!({"id": "x", "flowData": {"nodes": []}})).unwrap();
        assert_eq!(flow.payload_document().unwrap(), Some(json!({"nodes": []})));
    }

    #[test]
    fn malformed_payload_string_is_an_error() {
        let flow: Flow =
            serde_json::from_value(json!({"id": "x", "flowData": "{not json"})).unwrap();
        assert!(flow.payload_document().is_err());
    }
}
