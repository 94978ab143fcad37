//! Deepgram voice-agent envelopes

use super::{InboundDecoder, OutboundEncoder};
use crate::domain::event::{
    AudioEncoding, AudioFrame, ControlEvent, FunctionCallRequest, RelayUnit, SequenceCounter,
};
use crate::domain::shared::{BridgeError, CallId, InvocationId, Result, Source};
use crate::infrastructure::transport::WireMessage;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum InboundEnvelope {
    Welcome {
        #[serde(default)]
        request_id: Option<String>,
    },
    SettingsApplied,
    ConversationText {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: String,
    },
    UserStartedSpeaking,
    AgentThinking,
    AgentStartedSpeaking,
    AgentAudioDone,
    FunctionCallRequest {
        function_call_id: String,
        function_name: String,
        #[serde(default)]
        input: Value,
    },
    Error {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
    Warning {
        #[serde(default)]
        description: Option<String>,
    },
    History,
    PromptUpdated,
    SpeakUpdated,
    InjectionRefused,
}

/// Decodes messages from the voice agent for one call
#[derive(Debug)]
pub struct AgentDecoder {
    call_id: CallId,
    encoding: AudioEncoding,
    sequence: SequenceCounter,
}

impl AgentDecoder {
    pub fn new(call_id: CallId, encoding: AudioEncoding) -> Self {
        Self {
            call_id,
            encoding,
            sequence: SequenceCounter::new(),
        }
    }
}

impl InboundDecoder for AgentDecoder {
    fn decode(&mut self, message: WireMessage) -> Result<Option<RelayUnit>> {
        let text = match message {
            WireMessage::Binary(data) => {
                return Ok(Some(RelayUnit::Audio(AudioFrame::new(
                    Source::Agent,
                    self.sequence.next(),
                    self.encoding,
                    data,
                ))))
            }
            WireMessage::Text(text) => text,
        };

        let envelope: InboundEnvelope = serde_json::from_str(&text)
            .map_err(|e| BridgeError::ProtocolDecode(format!("agent: {}", e)))?;

        let event = match envelope {
            InboundEnvelope::Welcome { request_id } => {
                info!("Voice agent session established (request {:?})", request_id);
                return Ok(None);
            }
            InboundEnvelope::SettingsApplied => {
                debug!("Voice agent settings applied");
                return Ok(None);
            }
            InboundEnvelope::ConversationText { role, content } => {
                let role = role.as_deref().unwrap_or("unknown").to_uppercase();
                info!("{}: {}", role, content);
                return Ok(None);
            }
            InboundEnvelope::AgentThinking => {
                debug!("Voice agent is thinking");
                return Ok(None);
            }
            InboundEnvelope::Warning { description } => {
                warn!("Voice agent warning: {}", description.unwrap_or_default());
                return Ok(None);
            }
            InboundEnvelope::AgentAudioDone
            | InboundEnvelope::History
            | InboundEnvelope::PromptUpdated
            | InboundEnvelope::SpeakUpdated
            | InboundEnvelope::InjectionRefused => return Ok(None),
            InboundEnvelope::UserStartedSpeaking => ControlEvent::SpeechStarted,
            InboundEnvelope::AgentStartedSpeaking => ControlEvent::AgentSpeaking,
            InboundEnvelope::FunctionCallRequest {
                function_call_id,
                function_name,
                input,
            } => ControlEvent::FunctionCallRequest(FunctionCallRequest {
                call_id: self.call_id.clone(),
                invocation_id: InvocationId::new(function_call_id),
                function_name,
                arguments: parse_input(input),
            }),
            InboundEnvelope::Error {
                description,
                message,
                code,
            } => {
                let message = description
                    .or(message)
                    .or(code)
                    .unwrap_or_else(|| "unknown agent error".to_string());
                ControlEvent::Error { message }
            }
        };

        Ok(Some(RelayUnit::Control(event)))
    }
}

/// Function input arrives either as an object or as JSON-encoded text
fn parse_input(input: Value) -> Value {
    match input {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

/// Encodes units for the voice agent
#[derive(Debug, Clone, Default)]
pub struct AgentEncoder;

impl AgentEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl OutboundEncoder for AgentEncoder {
    fn encode(&self, unit: &RelayUnit) -> Option<WireMessage> {
        match unit {
            RelayUnit::Audio(frame) => Some(WireMessage::Binary(frame.payload().clone())),
            RelayUnit::Control(ControlEvent::FunctionCallResponse(response)) => {
                let envelope = json!({
                    "type": "FunctionCallResponse",
                    "function_call_id": response.invocation_id.as_str(),
                    "output": response.to_payload().to_string(),
                });
                Some(WireMessage::Text(envelope.to_string()))
            }
            RelayUnit::Control(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::FunctionCallResponse;
    use crate::domain::shared::DispatchError;
    use bytes::Bytes;
    use serde_json::Map;

    fn decoder() -> AgentDecoder {
        AgentDecoder::new(CallId::new("CA1"), AudioEncoding::Mulaw)
    }

    #[test]
    fn test_decode_function_call_request() {
        let mut decoder = decoder();
        let text = json!({
            "type": "FunctionCallRequest",
            "function_call_id": "fc-1",
            "function_name": "book_appointment",
            "input": { "date": "2024-05-01", "service": "tourist visa" }
        });
        match decoder.decode(WireMessage::text(text.to_string())).unwrap() {
            Some(RelayUnit::Control(ControlEvent::FunctionCallRequest(req))) => {
                assert_eq!(req.call_id.as_str(), "CA1");
                assert_eq!(req.invocation_id.as_str(), "fc-1");
                assert_eq!(req.function_name, "book_appointment");
                assert_eq!(req.arguments["service"], "tourist visa");
            }
            other => panic!("unexpected unit: {:?}", other),
        }
    }

    #[test]
    fn test_string_encoded_input_is_parsed() {
        let mut decoder = decoder();
        let text = json!({
            "type": "FunctionCallRequest",
            "function_call_id": "fc-2",
            "function_name": "get_visa_info",
            "input": "{\"visa_type\":\"student\"}"
        });
        match decoder.decode(WireMessage::text(text.to_string())).unwrap() {
            Some(RelayUnit::Control(ControlEvent::FunctionCallRequest(req))) => {
                assert_eq!(req.arguments, json!({"visa_type": "student"}));
            }
            other => panic!("unexpected unit: {:?}", other),
        }
    }

    #[test]
    fn test_missing_input_is_null() {
        let mut decoder = decoder();
        let text = r#"{"type":"FunctionCallRequest","function_call_id":"fc-3","function_name":"x"}"#;
        match decoder.decode(WireMessage::text(text)).unwrap() {
            Some(RelayUnit::Control(ControlEvent::FunctionCallRequest(req))) => {
                assert!(req.arguments.is_null());
            }
            other => panic!("unexpected unit: {:?}", other),
        }
    }

    #[test]
    fn test_speech_events() {
        let mut decoder = decoder();
        assert_eq!(
            decoder
                .decode(WireMessage::text(r#"{"type":"UserStartedSpeaking"}"#))
                .unwrap(),
            Some(RelayUnit::Control(ControlEvent::SpeechStarted))
        );
        assert_eq!(
            decoder
                .decode(WireMessage::text(
                    r#"{"type":"AgentStartedSpeaking","total_latency":0.5}"#
                ))
                .unwrap(),
            Some(RelayUnit::Control(ControlEvent::AgentSpeaking))
        );
    }

    #[test]
    fn test_informational_messages_are_not_forwarded() {
        let mut decoder = decoder();
        for text in [
            r#"{"type":"Welcome","request_id":"abc"}"#,
            r#"{"type":"SettingsApplied"}"#,
            r#"{"type":"ConversationText","role":"assistant","content":"Hello"}"#,
            r#"{"type":"AgentThinking","content":""}"#,
            r#"{"type":"AgentAudioDone"}"#,
            r#"{"type":"Warning","description":"slow"}"#,
        ] {
            assert!(decoder.decode(WireMessage::text(text)).unwrap().is_none(), "{}", text);
        }
    }

    #[test]
    fn test_error_event() {
        let mut decoder = decoder();
        let unit = decoder
            .decode(WireMessage::text(
                r#"{"type":"Error","description":"bad settings","code":"INVALID"}"#,
            ))
            .unwrap();
        assert_eq!(
            unit,
            Some(RelayUnit::Control(ControlEvent::Error {
                message: "bad settings".to_string()
            }))
        );
    }

    #[test]
    fn test_unknown_type_is_decode_error() {
        let mut decoder = decoder();
        let err = decoder
            .decode(WireMessage::text(r#"{"type":"Teleport"}"#))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolDecode(_)));
    }

    #[test]
    fn test_binary_audio_uses_agent_encoding() {
        let mut decoder = AgentDecoder::new(CallId::new("CA1"), AudioEncoding::Linear16);
        match decoder
            .decode(WireMessage::Binary(Bytes::from_static(&[0, 1, 2, 3])))
            .unwrap()
        {
            Some(RelayUnit::Audio(frame)) => {
                assert_eq!(frame.source(), Source::Agent);
                assert_eq!(frame.encoding(), AudioEncoding::Linear16);
                assert_eq!(frame.sequence(), 1);
            }
            other => panic!("unexpected unit: {:?}", other),
        }
    }

    #[test]
    fn test_encode_function_call_response() {
        let mut fields = Map::new();
        fields.insert("confirmation".into(), json!("ABC123"));
        let response = FunctionCallResponse::success("fc-9".into(), "book_appointment", fields);

        let message = AgentEncoder::new()
            .encode(&RelayUnit::Control(ControlEvent::FunctionCallResponse(
                response,
            )))
            .unwrap();
        let envelope: Value = serde_json::from_str(message.as_text().unwrap()).unwrap();
        assert_eq!(envelope["type"], "FunctionCallResponse");
        assert_eq!(envelope["function_call_id"], "fc-9");

        let output: Value = serde_json::from_str(envelope["output"].as_str().unwrap()).unwrap();
        assert_eq!(output["status"], "ok");
        assert_eq!(output["confirmation"], "ABC123");
    }

    #[test]
    fn test_encode_failure_response() {
        let response = FunctionCallResponse::failure(
            "fc-10".into(),
            "book_appointment",
            DispatchError::validation("date", "required field is missing"),
        );
        let message = AgentEncoder::new()
            .encode(&RelayUnit::Control(ControlEvent::FunctionCallResponse(
                response,
            )))
            .unwrap();
        let envelope: Value = serde_json::from_str(message.as_text().unwrap()).unwrap();
        let output: Value = serde_json::from_str(envelope["output"].as_str().unwrap()).unwrap();
        assert_eq!(output["status"], "error");
        assert_eq!(output["reason"], "validation_failed");
        assert_eq!(output["field"], "date");
    }

    #[test]
    fn test_speech_events_have_no_agent_envelope() {
        assert!(AgentEncoder::new()
            .encode(&RelayUnit::Control(ControlEvent::SpeechStarted))
            .is_none());
    }
}
