//! Outbound voice-agent WebSocket client

use super::{AgentConnector, FrameSink, FrameSource, Transport, WireMessage};
use crate::domain::shared::{BridgeError, CallId, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type AgentStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the Deepgram voice-agent endpoint
#[derive(Debug, Clone)]
pub struct DeepgramConnector {
    url: String,
    api_key: Option<String>,
    connect_timeout: Duration,
}

impl DeepgramConnector {
    pub fn new(url: impl Into<String>, api_key: Option<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            api_key,
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AgentConnector for DeepgramConnector {
    async fn connect(&self, call_id: &CallId) -> Result<Transport> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BridgeError::AgentConnect("API key not configured".to_string()))?;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| BridgeError::AgentConnect(e.to_string()))?;
        let token = HeaderValue::from_str(&format!("Token {}", api_key))
            .map_err(|e| BridgeError::AgentConnect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, token);

        let (stream, response) = timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                BridgeError::AgentConnect(format!(
                    "timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| BridgeError::AgentConnect(e.to_string()))?;

        info!(
            "Connected to voice agent for call {} (status {})",
            call_id,
            response.status()
        );

        let (sink, stream) = stream.split();
        Ok(Transport::new(AgentSource { stream }, AgentSink { sink }))
    }
}

struct AgentSource {
    stream: SplitStream<AgentStream>,
}

#[async_trait]
impl FrameSource for AgentSource {
    async fn next_message(&mut self) -> Option<Result<WireMessage>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(WireMessage::Text(text))),
                Ok(Message::Binary(data)) => return Some(Ok(WireMessage::Binary(Bytes::from(data)))),
                Ok(Message::Close(frame)) => {
                    debug!("Voice agent closed connection: {:?}", frame);
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(BridgeError::Transport(e.to_string()))),
            }
        }
    }
}

struct AgentSink {
    sink: SplitSink<AgentStream, Message>,
}

#[async_trait]
impl FrameSink for AgentSink {
    async fn send_message(&mut self, message: WireMessage) -> Result<()> {
        let message = match message {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(data) => Message::Binary(data.to_vec()),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}
