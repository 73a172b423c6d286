//! Wire envelope codec.
//!
//! Every text frame on the channel is a JSON object with a `type` field:
//!
//! ```json
//! { "type": "progress:42", "data": { "id": 42, "progress": 51.5 } }
//! { "type": "subscribe", "key": "progress:42" }
//! ```
//!
//! Data envelopes carry a topic name in `type` and an arbitrary JSON payload
//! in `data`. Control frames (`subscribe` / `unsubscribe`) carry the topic in
//! `key` instead. Decoding is deliberately lenient about `data` (absent means
//! `null`) and strict about `type` (must be a string).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CodecError;

/// Control type announcing interest in a topic.
pub const SUBSCRIBE: &str = "subscribe";
/// Control type withdrawing interest in a topic.
pub const UNSUBSCRIBE: &str = "unsubscribe";

/// A data envelope: `{"type": <topic>, "data": <json>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic name or control type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload; `null` when absent on the wire.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope for a topic.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Whether `type` names a control message rather than a topic.
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.kind == SUBSCRIBE || self.kind == UNSUBSCRIBE
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outbound control frame managing server-side topic membership.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// `{"type":"subscribe","key":"<topic>"}`
    Subscribe {
        /// Topic key.
        key: String,
    },
    /// `{"type":"unsubscribe","key":"<topic>"}`
    Unsubscribe {
        /// Topic key.
        key: String,
    },
}

impl ControlFrame {
    /// Subscribe frame for `key`.
    pub fn subscribe(key: impl Into<String>) -> Self {
        Self::Subscribe { key: key.into() }
    }

    /// Unsubscribe frame for `key`.
    pub fn unsubscribe(key: impl Into<String>) -> Self {
        Self::Unsubscribe { key: key.into() }
    }

    /// Topic key this frame refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Subscribe { key } | Self::Unsubscribe { key } => key,
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decode an inbound text frame into an [`Envelope`].
///
/// Rejects anything that is not a JSON object with a string `type`.
pub fn decode_frame(text: &str) -> Result<Envelope, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut map) = value else {
        return Err(CodecError::NotAnObject);
    };
    let kind = match map.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(CodecError::MissingType),
    };
    let data = map.remove("data").unwrap_or(Value::Null);
    Ok(Envelope { kind, data })
}

/// [`decode_frame`] with an upper bound on frame size.
///
/// `max_bytes == 0` disables the check.
pub fn decode_frame_limited(text: &str, max_bytes: usize) -> Result<Envelope, CodecError> {
    if max_bytes > 0 && text.len() > max_bytes {
        return Err(CodecError::TooLarge {
            len: text.len(),
            max: max_bytes,
        });
    }
    decode_frame(text)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_topic_envelope() {
        let env = decode_frame(r#"{"type":"progress:7","data":{"progress":12.5}}"#).unwrap();
        assert_eq!(env.kind, "progress:7");
        assert_eq!(env.data["progress"], 12.5);
        assert!(!env.is_control());
    }

    #[test]
    fn decode_missing_data_is_null() {
        let env = decode_frame(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(env.data, Value::Null);
    }

    #[test]
    fn decode_ignores_extra_fields() {
        let env = decode_frame(r#"{"type":"status","data":1,"ts":"x"}"#).unwrap();
        assert_eq!(env, Envelope::new("status", json!(1)));
    }

    #[test]
    fn decode_rejects_non_json() {
        assert_matches!(decode_frame("not-json"), Err(CodecError::InvalidJson(_)));
        assert_matches!(decode_frame(""), Err(CodecError::InvalidJson(_)));
    }

    #[test]
    fn decode_rejects_non_object() {
        assert_matches!(decode_frame("[1,2,3]"), Err(CodecError::NotAnObject));
        assert_matches!(decode_frame("\"progress\""), Err(CodecError::NotAnObject));
        assert_matches!(decode_frame("null"), Err(CodecError::NotAnObject));
    }

    #[test]
    fn decode_rejects_missing_or_non_string_type() {
        assert_matches!(decode_frame(r#"{"data":1}"#), Err(CodecError::MissingType));
        assert_matches!(decode_frame(r#"{"type":5}"#), Err(CodecError::MissingType));
        assert_matches!(decode_frame(r#"{"type":null}"#), Err(CodecError::MissingType));
    }

    #[test]
    fn decode_limited_rejects_oversized() {
        let frame = r#"{"type":"log:1","data":"aaaaaaaaaaaaaaaa"}"#;
        assert_matches!(
            decode_frame_limited(frame, 8),
            Err(CodecError::TooLarge { max: 8, .. })
        );
        assert!(decode_frame_limited(frame, 0).is_ok());
        assert!(decode_frame_limited(frame, frame.len()).is_ok());
    }

    #[test]
    fn control_frame_wire_format() {
        insta::assert_snapshot!(
            ControlFrame::subscribe("progress:7").encode().unwrap(),
            @r#"{"type":"subscribe","key":"progress:7"}"#
        );
        insta::assert_snapshot!(
            ControlFrame::unsubscribe("log:3").encode().unwrap(),
            @r#"{"type":"unsubscribe","key":"log:3"}"#
        );
    }

    #[test]
    fn envelope_wire_format() {
        let env = Envelope::new("status", json!({"active": 2}));
        insta::assert_snapshot!(env.encode().unwrap(), @r#"{"type":"status","data":{"active":2}}"#);
    }

    #[test]
    fn control_frame_key() {
        assert_eq!(ControlFrame::subscribe("a").key(), "a");
        assert_eq!(ControlFrame::unsubscribe("b").key(), "b");
    }

    #[test]
    fn inbound_control_type_is_flagged() {
        let env = decode_frame(r#"{"type":"subscribe","key":"x"}"#).unwrap();
        assert!(env.is_control());
    }
}
