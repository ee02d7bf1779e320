//! Relay wire protocol
//!
//! One JSON text frame per fired gesture, no envelope:
//!
//! ```text
//! {"type":"BLINK"}
//! {"type":"JAW"}
//! ```

use serde::{Deserialize, Serialize};

use crate::events::GestureKind;

/// A gesture notification carried over the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "BLINK")]
    Blink,

    #[serde(rename = "JAW")]
    Jaw,
}

impl From<GestureKind> for RelayMessage {
    fn from(kind: GestureKind) -> Self {
        match kind {
            GestureKind::Eye => RelayMessage::Blink,
            GestureKind::Jaw => RelayMessage::Jaw,
        }
    }
}

impl From<RelayMessage> for GestureKind {
    fn from(message: RelayMessage) -> Self {
        match message {
            RelayMessage::Blink => GestureKind::Eye,
            RelayMessage::Jaw => GestureKind::Jaw,
        }
    }
}

/// Why an inbound relay payload was rejected
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed relay message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("relay message has no string `type` field")]
    MissingType,

    #[error("unrecognized relay message type `{0}`")]
    UnknownType(String),
}

/// Serialize a gesture as a relay frame
pub fn encode(kind: GestureKind) -> String {
    // Unit variants of a tagged enum always serialize
    serde_json::to_string(&RelayMessage::from(kind)).unwrap_or_default()
}

/// Parse a relay frame
pub fn decode(text: &str) -> Result<RelayMessage, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?;

    match kind {
        "BLINK" => Ok(RelayMessage::Blink),
        "JAW" => Ok(RelayMessage::Jaw),
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wire_format() {
        assert_eq!(encode(GestureKind::Eye), r#"{"type":"BLINK"}"#);
        assert_eq!(encode(GestureKind::Jaw), r#"{"type":"JAW"}"#);
    }

    #[test]
    fn test_decode_tolerates_whitespace_and_extra_fields() {
        assert_eq!(decode(r#"{ "type": "BLINK" }"#).unwrap(), RelayMessage::Blink);
        assert_eq!(decode(r#"{"type":"JAW","source":"muse"}"#).unwrap(), RelayMessage::Jaw);
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        assert!(matches!(decode("BLINK"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(decode(r#"{"kind":"BLINK"}"#), Err(ProtocolError::MissingType)));
        assert!(matches!(decode(r#"{"type":3}"#), Err(ProtocolError::MissingType)));
        assert!(matches!(
            decode(r#"{"type":"blink"}"#),
            Err(ProtocolError::UnknownType(t)) if t == "blink"
        ));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(GestureKind::from(RelayMessage::Blink), GestureKind::Eye);
        assert_eq!(RelayMessage::from(GestureKind::Jaw), RelayMessage::Jaw);
    }
}
