//! Streaming transports
//!
//! The relay only sees [`WireMessage`]s moving through a [`FrameSource`] and a
//! [`FrameSink`]. Concrete transports: the inbound telephony WebSocket
//! (axum), the outbound voice-agent WebSocket (tokio-tungstenite) and an
//! in-process channel pair.

pub mod agent_client;
pub mod memory;
pub mod websocket;

pub use agent_client::DeepgramConnector;
pub use memory::MemoryPeer;
pub use websocket::AxumWebSocketTransport;

use crate::domain::shared::{CallId, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Raw unit exchanged with a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Bytes),
}

impl WireMessage {
    pub fn text(text: impl Into<String>) -> Self {
        WireMessage::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireMessage::Text(text) => Some(text),
            WireMessage::Binary(_) => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, WireMessage::Binary(_))
    }
}

/// Receiving half of a transport
#[async_trait]
pub trait FrameSource: Send {
    /// Next message; `None` once the peer has closed the connection.
    ///
    /// Must be cancel-safe: the relay polls it inside `select!`.
    async fn next_message(&mut self) -> Option<Result<WireMessage>>;
}

/// Sending half of a transport
#[async_trait]
pub trait FrameSink: Send {
    /// Completes once the transport has accepted the message
    async fn send_message(&mut self, message: WireMessage) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Both halves of one connection
pub struct Transport {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
}

impl Transport {
    pub fn new(source: impl FrameSource + 'static, sink: impl FrameSink + 'static) -> Self {
        Self {
            source: Box::new(source),
            sink: Box::new(sink),
        }
    }

    pub fn into_parts(self) -> (Box<dyn FrameSource>, Box<dyn FrameSink>) {
        (self.source, self.sink)
    }
}

/// Opens the per-call connection to the voice agent
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn connect(&self, call_id: &CallId) -> Result<Transport>;
}
