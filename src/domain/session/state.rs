//! Session state value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation state of a bridged call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Inbound stream accepted, agent connection being opened
    Connecting,
    /// Both transports are up and the relay is running
    Active,
    /// Teardown in progress
    Closing,
    /// Both transports closed
    Closed,
}

impl SessionState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Connecting, Active) | (Connecting, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Telephony sent its stop event
    CallEnded,
    /// A transport closed without a stop event
    TransportClosed { side: String },
    /// A transport or protocol failure
    TransportError { side: String, message: String },
    /// No traffic on either side within the idle threshold
    IdleTimeout,
    /// Closed on request (process shutdown or explicit terminate)
    Terminated,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::CallEnded => "call_ended",
            CloseReason::TransportClosed { .. } => "transport_closed",
            CloseReason::TransportError { .. } => "transport_error",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::Terminated => "terminated",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CloseReason::TransportError { .. })
    }
}
