//! Internal event model shared by the relay, the protocol codecs and the
//! dispatch engine.
//!
//! Wire envelopes are decoded into these types once, at the protocol
//! boundary; nothing past that boundary inspects raw payloads.

use super::shared::{CallId, DispatchError, InvocationId, Source};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Audio sample encoding of a frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// G.711 μ-law, 8 bits per sample
    Mulaw,
    /// Signed 16-bit little-endian PCM
    Linear16,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Mulaw => "mulaw",
            AudioEncoding::Linear16 => "linear16",
        }
    }
}

/// Ordered chunk of encoded audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    source: Source,
    sequence: u64,
    encoding: AudioEncoding,
    payload: Bytes,
}

impl AudioFrame {
    pub fn new(source: Source, sequence: u64, encoding: AudioEncoding, payload: Bytes) -> Self {
        Self {
            source,
            sequence,
            encoding,
            payload,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Same frame identity carrying a re-encoded payload
    pub fn reencoded(&self, encoding: AudioEncoding, payload: Bytes) -> Self {
        Self {
            source: self.source,
            sequence: self.sequence,
            encoding,
            payload,
        }
    }
}

/// Monotonic per-source sequence assigned at ingress.
///
/// Starts at 1 and never repeats for the lifetime of the counter.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

/// Audio format announced by the telephony start event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for MediaFormat {
    fn default() -> Self {
        Self {
            encoding: "audio/x-mulaw".to_string(),
            sample_rate: 8000,
            channels: 1,
        }
    }
}

/// Payload of the call-started event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStart {
    pub call_id: CallId,
    pub stream_sid: String,
    pub media_format: MediaFormat,
}

/// A function invocation requested by the voice agent
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallRequest {
    pub call_id: CallId,
    pub invocation_id: InvocationId,
    pub function_name: String,
    pub arguments: Value,
}

/// The single answer to a [`FunctionCallRequest`]
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallResponse {
    pub invocation_id: InvocationId,
    pub function_name: String,
    pub outcome: Result<Map<String, Value>, DispatchError>,
}

impl FunctionCallResponse {
    pub fn success(
        invocation_id: InvocationId,
        function_name: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            invocation_id,
            function_name: function_name.into(),
            outcome: Ok(payload),
        }
    }

    pub fn failure(
        invocation_id: InvocationId,
        function_name: impl Into<String>,
        error: DispatchError,
    ) -> Self {
        Self {
            invocation_id,
            function_name: function_name.into(),
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// "ok" or the failure reason code
    pub fn status(&self) -> &str {
        match &self.outcome {
            Ok(_) => "ok",
            Err(e) => e.reason_code(),
        }
    }

    /// Result document delivered to the agent
    pub fn to_payload(&self) -> Value {
        match &self.outcome {
            Ok(fields) => {
                let mut payload = Map::with_capacity(fields.len() + 1);
                payload.insert("status".to_string(), Value::String("ok".to_string()));
                for (key, value) in fields {
                    if key != "status" {
                        payload.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(payload)
            }
            Err(e) => e.to_payload(),
        }
    }
}

/// Control events, closed set of tags
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    CallStarted(CallStart),
    CallStopped,
    SpeechStarted,
    AgentSpeaking,
    FunctionCallRequest(FunctionCallRequest),
    FunctionCallResponse(FunctionCallResponse),
    Error { message: String },
}

impl ControlEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            ControlEvent::CallStarted(_) => "call-started",
            ControlEvent::CallStopped => "call-stopped",
            ControlEvent::SpeechStarted => "speech-started",
            ControlEvent::AgentSpeaking => "agent-speaking",
            ControlEvent::FunctionCallRequest(_) => "function-call-request",
            ControlEvent::FunctionCallResponse(_) => "function-call-response",
            ControlEvent::Error { .. } => "error",
        }
    }
}

/// Unit moved by the relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayUnit {
    Audio(AudioFrame),
    Control(ControlEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sequence_counter_is_strictly_increasing() {
        let mut counter = SequenceCounter::new();
        let seen: Vec<u64> = (0..5).map(|_| counter.next()).collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(counter.last(), 5);
    }

    #[test]
    fn test_reencoded_frame_keeps_identity() {
        let frame = AudioFrame::new(
            Source::Telephony,
            7,
            AudioEncoding::Mulaw,
            Bytes::from_static(&[0xFF, 0x7F]),
        );
        let pcm = frame.reencoded(AudioEncoding::Linear16, Bytes::from_static(&[0, 0, 0, 0]));
        assert_eq!(pcm.sequence(), 7);
        assert_eq!(pcm.source(), Source::Telephony);
        assert_eq!(pcm.encoding(), AudioEncoding::Linear16);
    }

    #[test]
    fn test_success_payload_has_ok_status() {
        let mut fields = Map::new();
        fields.insert("confirmation".into(), json!("AB12CD"));
        fields.insert("status".into(), json!("ignored"));
        let response = FunctionCallResponse::success("fc-1".into(), "book_appointment", fields);

        let payload = response.to_payload();
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["confirmation"], "AB12CD");
        assert_eq!(response.status(), "ok");
    }

    #[test]
    fn test_failure_payload_carries_reason() {
        let response = FunctionCallResponse::failure(
            "fc-2".into(),
            "order_pizza",
            DispatchError::HandlerNotFound("order_pizza".into()),
        );
        assert!(!response.is_success());
        assert_eq!(response.to_payload()["reason"], "handler_not_found");
    }
}
