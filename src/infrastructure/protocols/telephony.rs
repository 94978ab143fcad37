//! Twilio Media Streams envelopes

use super::{InboundDecoder, OutboundEncoder};
use crate::domain::event::{
    AudioEncoding, AudioFrame, CallStart, ControlEvent, MediaFormat, RelayUnit, SequenceCounter,
};
use crate::domain::shared::{BridgeError, CallId, Result, Source};
use crate::infrastructure::transport::WireMessage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Encoding string announced for 8 kHz μ-law audio
pub const MULAW_FORMAT: &str = "audio/x-mulaw";

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum InboundEnvelope {
    Connected,
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
        start: StartPayload,
    },
    Media {
        media: MediaPayload,
    },
    Stop,
    Mark,
    Dtmf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayload {
    stream_sid: Option<String>,
    call_sid: Option<String>,
    media_format: Option<WireMediaFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMediaFormat {
    encoding: String,
    sample_rate: u32,
    #[serde(default = "default_channels")]
    channels: u16,
}

fn default_channels() -> u16 {
    1
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

/// Decodes messages from the caller's media stream
#[derive(Debug, Default)]
pub struct TelephonyDecoder {
    sequence: SequenceCounter,
}

impl TelephonyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn audio(&mut self, payload: Bytes) -> RelayUnit {
        RelayUnit::Audio(AudioFrame::new(
            Source::Telephony,
            self.sequence.next(),
            AudioEncoding::Mulaw,
            payload,
        ))
    }
}

impl InboundDecoder for TelephonyDecoder {
    fn decode(&mut self, message: WireMessage) -> Result<Option<RelayUnit>> {
        let text = match message {
            WireMessage::Binary(data) => return Ok(Some(self.audio(data))),
            WireMessage::Text(text) => text,
        };

        let envelope: InboundEnvelope = serde_json::from_str(&text)
            .map_err(|e| BridgeError::ProtocolDecode(format!("telephony: {}", e)))?;

        match envelope {
            InboundEnvelope::Connected => {
                debug!("Media stream connected");
                Ok(None)
            }
            InboundEnvelope::Start { stream_sid, start } => {
                let stream_sid = start
                    .stream_sid
                    .or(stream_sid)
                    .ok_or_else(|| BridgeError::ProtocolDecode("start without streamSid".into()))?;
                let call_id = CallId::new(start.call_sid.unwrap_or_else(|| stream_sid.clone()));
                let media_format = start
                    .media_format
                    .map(|f| MediaFormat {
                        encoding: f.encoding,
                        sample_rate: f.sample_rate,
                        channels: f.channels,
                    })
                    .unwrap_or_default();

                Ok(Some(RelayUnit::Control(ControlEvent::CallStarted(CallStart {
                    call_id,
                    stream_sid,
                    media_format,
                }))))
            }
            InboundEnvelope::Media { media } => {
                let payload = STANDARD
                    .decode(media.payload.as_bytes())
                    .map_err(|e| BridgeError::ProtocolDecode(format!("media payload: {}", e)))?;
                Ok(Some(self.audio(Bytes::from(payload))))
            }
            InboundEnvelope::Stop => Ok(Some(RelayUnit::Control(ControlEvent::CallStopped))),
            InboundEnvelope::Mark | InboundEnvelope::Dtmf => Ok(None),
        }
    }
}

/// Encodes units for the caller's media stream
#[derive(Debug, Clone)]
pub struct TelephonyEncoder {
    stream_sid: String,
}

impl TelephonyEncoder {
    pub fn new(stream_sid: impl Into<String>) -> Self {
        Self {
            stream_sid: stream_sid.into(),
        }
    }
}

impl OutboundEncoder for TelephonyEncoder {
    fn encode(&self, unit: &RelayUnit) -> Option<WireMessage> {
        let envelope = match unit {
            RelayUnit::Audio(frame) => json!({
                "event": "media",
                "streamSid": self.stream_sid,
                "media": { "payload": STANDARD.encode(frame.payload()) },
            }),
            // Barge-in: drop whatever agent audio the provider still has queued
            RelayUnit::Control(ControlEvent::SpeechStarted) => json!({
                "event": "clear",
                "streamSid": self.stream_sid,
            }),
            RelayUnit::Control(ControlEvent::AgentSpeaking) => json!({
                "event": "mark",
                "streamSid": self.stream_sid,
                "mark": { "name": "agent-speaking" },
            }),
            RelayUnit::Control(ControlEvent::Error { message }) => json!({
                "event": "error",
                "streamSid": self.stream_sid,
                "error": { "message": message },
            }),
            RelayUnit::Control(_) => return None,
        };
        Some(WireMessage::Text(envelope.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn start_message() -> WireMessage {
        WireMessage::text(
            json!({
                "event": "start",
                "sequenceNumber": "1",
                "streamSid": "MZ123",
                "start": {
                    "streamSid": "MZ123",
                    "callSid": "CA456",
                    "tracks": ["inbound"],
                    "mediaFormat": {
                        "encoding": "audio/x-mulaw",
                        "sampleRate": 8000,
                        "channels": 1
                    }
                }
            })
            .to_string(),
        )
    }

    fn media_message(bytes: &[u8]) -> WireMessage {
        WireMessage::text(
            json!({
                "event": "media",
                "streamSid": "MZ123",
                "media": { "track": "inbound", "chunk": "1", "payload": STANDARD.encode(bytes) }
            })
            .to_string(),
        )
    }

    #[test]
    fn test_decode_start() {
        let mut decoder = TelephonyDecoder::new();
        let unit = decoder.decode(start_message()).unwrap().unwrap();
        match unit {
            RelayUnit::Control(ControlEvent::CallStarted(start)) => {
                assert_eq!(start.call_id.as_str(), "CA456");
                assert_eq!(start.stream_sid, "MZ123");
                assert_eq!(start.media_format.encoding, MULAW_FORMAT);
                assert_eq!(start.media_format.sample_rate, 8000);
            }
            other => panic!("unexpected unit: {:?}", other),
        }
    }

    #[test]
    fn test_start_without_call_sid_uses_stream_sid() {
        let mut decoder = TelephonyDecoder::new();
        let message = WireMessage::text(r#"{"event":"start","start":{"streamSid":"MZ9"}}"#);
        match decoder.decode(message).unwrap() {
            Some(RelayUnit::Control(ControlEvent::CallStarted(start))) => {
                assert_eq!(start.call_id.as_str(), "MZ9");
                assert_eq!(start.media_format, MediaFormat::default());
            }
            other => panic!("unexpected unit: {:?}", other),
        }
    }

    #[test]
    fn test_media_frames_get_increasing_sequence() {
        let mut decoder = TelephonyDecoder::new();
        let mut sequences = Vec::new();
        for chunk in [[1u8, 2], [3, 4], [5, 6]] {
            match decoder.decode(media_message(&chunk)).unwrap() {
                Some(RelayUnit::Audio(frame)) => {
                    assert_eq!(frame.source(), Source::Telephony);
                    assert_eq!(frame.encoding(), AudioEncoding::Mulaw);
                    assert_eq!(&frame.payload()[..], &chunk);
                    sequences.push(frame.sequence());
                }
                other => panic!("unexpected unit: {:?}", other),
            }
        }
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_binary_frame_is_raw_audio() {
        let mut decoder = TelephonyDecoder::new();
        let unit = decoder
            .decode(WireMessage::Binary(Bytes::from_static(&[0xFF; 4])))
            .unwrap();
        assert!(matches!(unit, Some(RelayUnit::Audio(_))));
    }

    #[test]
    fn test_ignorable_events() {
        let mut decoder = TelephonyDecoder::new();
        for text in [
            r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#,
            r#"{"event":"mark","streamSid":"MZ1","mark":{"name":"x"}}"#,
            r#"{"event":"dtmf","streamSid":"MZ1","dtmf":{"digit":"1"}}"#,
        ] {
            assert!(decoder.decode(WireMessage::text(text)).unwrap().is_none());
        }
    }

    #[test]
    fn test_stop() {
        let mut decoder = TelephonyDecoder::new();
        let unit = decoder
            .decode(WireMessage::text(r#"{"event":"stop","streamSid":"MZ1"}"#))
            .unwrap();
        assert_eq!(unit, Some(RelayUnit::Control(ControlEvent::CallStopped)));
    }

    #[test]
    fn test_malformed_input_is_decode_error() {
        let mut decoder = TelephonyDecoder::new();
        for text in [
            "not json",
            r#"{"event":"teleport"}"#,
            r#"{"event":"media","media":{"payload":"***"}}"#,
        ] {
            let err = decoder.decode(WireMessage::text(text)).unwrap_err();
            assert!(matches!(err, BridgeError::ProtocolDecode(_)), "{}", text);
        }
    }

    #[test]
    fn test_encode_audio_and_barge_in() {
        let encoder = TelephonyEncoder::new("MZ123");
        let frame = AudioFrame::new(
            Source::Agent,
            1,
            AudioEncoding::Mulaw,
            Bytes::from_static(&[7, 8, 9]),
        );

        let media = encoder.encode(&RelayUnit::Audio(frame)).unwrap();
        let media: Value = serde_json::from_str(media.as_text().unwrap()).unwrap();
        assert_eq!(media["event"], "media");
        assert_eq!(media["streamSid"], "MZ123");
        assert_eq!(media["media"]["payload"], STANDARD.encode([7u8, 8, 9]));

        let clear = encoder
            .encode(&RelayUnit::Control(ControlEvent::SpeechStarted))
            .unwrap();
        let clear: Value = serde_json::from_str(clear.as_text().unwrap()).unwrap();
        assert_eq!(clear["event"], "clear");
    }

    #[test]
    fn test_events_without_envelope_are_skipped() {
        let encoder = TelephonyEncoder::new("MZ123");
        assert!(encoder
            .encode(&RelayUnit::Control(ControlEvent::CallStopped))
            .is_none());
    }
}
