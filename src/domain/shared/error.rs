//! Domain errors

use super::value_objects::CallId;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the bridge itself.
///
/// Transport-class errors end the session they occur in; configuration-class
/// errors are raised at startup or session creation and are never ignored.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    #[error("Failed to connect to voice agent: {0}")]
    AgentConnect(String),

    #[error("Media stream handshake failed: {0}")]
    Handshake(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedAudioFormat(String),

    #[error("Duplicate call id: {0}")]
    DuplicateCallId(CallId),

    #[error("Duplicate handler registration: {0}")]
    DuplicateHandler(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Bridge is shutting down")]
    ShuttingDown,
}

impl BridgeError {
    /// Whether this error must tear down the session it occurred in
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            BridgeError::Transport(_)
                | BridgeError::ProtocolDecode(_)
                | BridgeError::AgentConnect(_)
                | BridgeError::Handshake(_)
                | BridgeError::UnsupportedAudioFormat(_)
                | BridgeError::DuplicateCallId(_)
                | BridgeError::ShuttingDown
        )
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Transport(_) => "transport",
            BridgeError::ProtocolDecode(_) => "protocol_decode",
            BridgeError::AgentConnect(_) => "agent_connect",
            BridgeError::Handshake(_) => "handshake",
            BridgeError::UnsupportedAudioFormat(_) => "unsupported_audio_format",
            BridgeError::DuplicateCallId(_) => "duplicate_call_id",
            BridgeError::DuplicateHandler(_) => "duplicate_handler",
            BridgeError::Configuration(_) => "configuration",
            BridgeError::InvalidStateTransition(_) => "invalid_state_transition",
            BridgeError::ShuttingDown => "shutting_down",
        }
    }
}

/// Failure of a single function invocation.
///
/// These never terminate a session; they are returned to the voice agent as a
/// structured failure payload so the conversation can continue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("handler not found: {0}")]
    HandlerNotFound(String),

    #[error("validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("{message}")]
    Business { code: String, message: String },

    #[error("handler timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("invocation cancelled: session closed")]
    Cancelled,

    #[error("invocation id already pending: {0}")]
    DuplicateInvocation(String),

    #[error("handler failed unexpectedly")]
    HandlerPanicked,
}

impl DispatchError {
    /// Build a business failure
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        DispatchError::Business {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a validation failure for a named field
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DispatchError::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable reason code sent to the agent
    pub fn reason_code(&self) -> &str {
        match self {
            DispatchError::HandlerNotFound(_) => "handler_not_found",
            DispatchError::ValidationFailed { .. } => "validation_failed",
            DispatchError::Business { code, .. } => code,
            DispatchError::Timeout(_) => "timeout",
            DispatchError::Cancelled => "cancelled",
            DispatchError::DuplicateInvocation(_) => "duplicate_invocation",
            DispatchError::HandlerPanicked => "internal_error",
        }
    }

    /// Whether the failure came from the handler's own business rules
    pub fn is_business(&self) -> bool {
        matches!(self, DispatchError::Business { .. })
    }

    /// Failure payload as delivered to the agent
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "status": "error",
            "reason": self.reason_code(),
            "message": self.to_string(),
        });
        if let DispatchError::ValidationFailed { field, .. } = self {
            payload["field"] = Value::String(field.clone());
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_fatal() {
        assert!(BridgeError::Transport("reset".into()).is_fatal_to_session());
        assert!(BridgeError::ProtocolDecode("bad json".into()).is_fatal_to_session());
        assert!(!BridgeError::DuplicateHandler("x".into()).is_fatal_to_session());
    }

    #[test]
    fn test_validation_payload_names_field() {
        let err = DispatchError::validation("date", "missing required field");
        let payload = err.to_payload();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["reason"], "validation_failed");
        assert_eq!(payload["field"], "date");
        assert!(payload["message"].as_str().unwrap().contains("date"));
    }

    #[test]
    fn test_business_reason_code_is_handler_defined() {
        let err = DispatchError::business("slot_unavailable", "That slot is taken");
        assert_eq!(err.reason_code(), "slot_unavailable");
        assert_eq!(err.to_string(), "That slot is taken");
        assert!(err.is_business());
    }

    #[test]
    fn test_timeout_message() {
        let err = DispatchError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "handler timed out after 1500ms");
        assert_eq!(err.reason_code(), "timeout");
    }
}
