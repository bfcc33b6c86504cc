//! # Relay Wire Messages
//!
//! ## Client → Server (text frames):
//! ```json
//! { "sessionId": "m1", "speakerId": "u1", "audio": "<base64 PCM16LE>" }
//! ```
//! `meetingId` and `userId` are accepted as aliases for older clients.
//!
//! ## Server → Client (text frames):
//! ```json
//! { "text": "hello world" }
//! { "error": "transcription_error", "details": "network failure: ..." }
//! ```

use crate::error::RelayError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Inbound frame as it arrives, before validation.
///
/// Every field is optional here so a missing field can be reported by name
/// instead of surfacing serde's first error only.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChunkMessage {
    #[serde(default, alias = "meetingId")]
    session_id: Option<String>,

    #[serde(default, alias = "userId")]
    speaker_id: Option<String>,

    #[serde(default)]
    audio: Option<String>,
}

/// A validated audio chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingChunkMessage {
    pub session_id: String,
    pub speaker_id: String,
    /// Raw PCM16 little-endian mono bytes
    pub audio: Vec<u8>,
}

impl IncomingChunkMessage {
    /// Parse and validate one text frame.
    ///
    /// ## Validation Checks:
    /// 1. **JSON**: Frame must be a JSON object
    /// 2. **Required fields**: `sessionId`, `speakerId` and `audio` present and non-empty
    /// 3. **Payload**: `audio` must be valid base64 and decode to at least one byte
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let raw: RawChunkMessage = serde_json::from_str(text)
            .map_err(|e| RelayError::Validation(format!("invalid message JSON: {}", e)))?;

        let session_id = non_empty(raw.session_id);
        let speaker_id = non_empty(raw.speaker_id);
        let audio = non_empty(raw.audio);

        let mut missing = Vec::new();
        if session_id.is_none() {
            missing.push("sessionId");
        }
        if speaker_id.is_none() {
            missing.push("speakerId");
        }
        if audio.is_none() {
            missing.push("audio");
        }

        match (session_id, speaker_id, audio) {
            (Some(session_id), Some(speaker_id), Some(audio)) => {
                let audio = BASE64
                    .decode(audio.trim())
                    .map_err(|e| RelayError::Validation(format!("audio is not valid base64: {}", e)))?;
                if audio.is_empty() {
                    return Err(RelayError::Validation("audio payload is empty".to_string()));
                }

                Ok(Self {
                    session_id,
                    speaker_id,
                    audio,
                })
            }
            _ => Err(RelayError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            ))),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Frames sent back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Transcript {
        text: String,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl OutboundMessage {
    pub fn transcript(text: impl Into<String>) -> Self {
        OutboundMessage::Transcript { text: text.into() }
    }

    #[cfg(test)]
    pub fn is_error(&self) -> bool {
        matches!(self, OutboundMessage::Error { .. })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&RelayError> for OutboundMessage {
    fn from(err: &RelayError) -> Self {
        let details = err.details();
        OutboundMessage::Error {
            error: err.code().to_string(),
            details: (!details.is_empty()).then(|| details.to_string()),
        }
    }
}

impl From<RelayError> for OutboundMessage {
    fn from(err: RelayError) -> Self {
        OutboundMessage::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    #[test]
    fn test_parse_valid_message() {
        let text = format!(r#"{{"sessionId":"m1","speakerId":"u1","audio":"{}"}}"#, b64(&[1, 0, 2, 0]));
        let msg = IncomingChunkMessage::parse(&text).unwrap();

        assert_eq!(msg.session_id, "m1");
        assert_eq!(msg.speaker_id, "u1");
        assert_eq!(msg.audio, vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_parse_accepts_legacy_field_names() {
        let text = format!(r#"{{"meetingId":"m1","userId":"u1","audio":"{}"}}"#, b64(&[0, 0]));
        let msg = IncomingChunkMessage::parse(&text).unwrap();

        assert_eq!(msg.session_id, "m1");
        assert_eq!(msg.speaker_id, "u1");
    }

    #[test]
    fn test_missing_fields_are_named() {
        let err = IncomingChunkMessage::parse(r#"{"sessionId":"m1"}"#).unwrap_err();
        assert_eq!(
            err,
            RelayError::Validation("missing required field(s): speakerId, audio".into())
        );
    }

    #[test]
    fn test_blank_fields_count_as_missing() {
        let text = format!(r#"{{"sessionId":"  ","speakerId":"u1","audio":"{}"}}"#, b64(&[0, 0]));
        let err = IncomingChunkMessage::parse(&text).unwrap_err();
        assert_eq!(err.details(), "missing required field(s): sessionId");
    }

    #[test]
    fn test_invalid_payloads() {
        let not_json = IncomingChunkMessage::parse("hello").unwrap_err();
        assert_eq!(not_json.code(), "validation_error");

        let wrong_type = IncomingChunkMessage::parse(r#"{"sessionId":5,"speakerId":"u1","audio":"AAA="}"#).unwrap_err();
        assert_eq!(wrong_type.code(), "validation_error");

        let bad_base64 =
            IncomingChunkMessage::parse(r#"{"sessionId":"m1","speakerId":"u1","audio":"%%%"}"#).unwrap_err();
        assert!(bad_base64.details().starts_with("audio is not valid base64"));
    }

    #[test]
    fn test_outbound_shapes() {
        let ok = OutboundMessage::transcript("hello world").to_json().unwrap();
        assert_eq!(ok, r#"{"text":"hello world"}"#);

        let err = OutboundMessage::from(RelayError::Transcription("network failure: reset".into()));
        assert_eq!(
            err.to_json().unwrap(),
            r#"{"error":"transcription_error","details":"network failure: reset"}"#
        );

        let bare = OutboundMessage::from(RelayError::Backpressure(String::new()));
        assert_eq!(bare.to_json().unwrap(), r#"{"error":"backpressure"}"#);
    }

    #[test]
    fn test_outbound_round_trips_for_clients() {
        let parsed: OutboundMessage = serde_json::from_str(r#"{"error":"validation_error"}"#).unwrap();
        assert!(parsed.is_error());

        let parsed: OutboundMessage = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(parsed, OutboundMessage::transcript("hi"));
    }
}
