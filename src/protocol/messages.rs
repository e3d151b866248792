//! JSON envelopes exchanged over the text channel
//!
//! Only the audio envelopes and the downlink reconfigure hint are
//! interpreted here. Everything else (session start, greeting, transcripts,
//! close) passes through untouched for the application to handle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Messages the client sends about its microphone audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// One chunk of base64 PCM16 LE mono audio at 24 kHz
    #[serde(rename = "input_audio_buffer.append")]
    Append {
        audio: String,
        /// Sender wall clock, epoch milliseconds
        t0: i64,
    },

    /// The microphone stopped; the server may finalize the turn
    #[serde(rename = "input_audio_buffer.commit")]
    Commit,
}

impl OutboundMessage {
    pub fn append(audio: String, t0: i64) -> Self {
        Self::Append { audio, t0 }
    }

    /// Append stamped with the current wall clock
    pub fn append_now(audio: String) -> Self {
        Self::append(audio, chrono::Utc::now().timestamp_millis())
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }
}

/// Text messages arriving from the server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Announces the format of the coming downlink audio
    TtsAudioMeta { format: Option<String> },
    /// Any other message, left to the application
    Other(Value),
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;

        if value.get("type").and_then(Value::as_str) == Some("tts_audio_meta") {
            let format = value
                .get("format")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Ok(Self::TtsAudioMeta { format });
        }

        Ok(Self::Other(value))
    }

    /// Type tag, when the message has one
    pub fn message_type(&self) -> Option<&str> {
        match self {
            Self::TtsAudioMeta { .. } => Some("tts_audio_meta"),
            Self::Other(value) => value.get("type").and_then(Value::as_str),
        }
    }

    /// The downlink will carry Opus wire frames
    pub fn announces_opus(&self) -> bool {
        matches!(self, Self::TtsAudioMeta { format: Some(f) } if f == "opus")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_envelope_shape() {
        let json = OutboundMessage::append("AAAA".into(), 1_700_000_000_123)
            .to_json()
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "input_audio_buffer.append",
                "audio": "AAAA",
                "t0": 1_700_000_000_123i64,
            })
        );
    }

    #[test]
    fn test_commit_envelope_shape() {
        let json = OutboundMessage::Commit.to_json().unwrap();
        assert_eq!(json, r#"{"type":"input_audio_buffer.commit"}"#);
    }

    #[test]
    fn test_append_now_uses_wall_clock() {
        let before = chrono::Utc::now().timestamp_millis();
        match OutboundMessage::append_now(String::new()) {
            OutboundMessage::Append { t0, .. } => assert!(t0 >= before),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_tts_meta() {
        let msg = InboundMessage::parse(r#"{"type":"tts_audio_meta","format":"opus","sr":24000}"#)
            .unwrap();
        assert!(msg.announces_opus());
        assert_eq!(msg.message_type(), Some("tts_audio_meta"));

        let msg = InboundMessage::parse(r#"{"type":"tts_audio_meta","format":"pcm"}"#).unwrap();
        assert!(!msg.announces_opus());
    }

    #[test]
    fn test_other_messages_pass_through() {
        let msg = InboundMessage::parse(r#"{"type":"transcript","text":"hello"}"#).unwrap();
        assert_eq!(msg.message_type(), Some("transcript"));
        match msg {
            InboundMessage::Other(value) => assert_eq!(value["text"], "hello"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }
}
