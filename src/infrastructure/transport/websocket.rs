//! Inbound telephony WebSocket, as upgraded by axum

use super::{FrameSink, FrameSource, Transport, WireMessage};
use crate::domain::shared::{BridgeError, Result};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

pub struct AxumWebSocketTransport;

impl AxumWebSocketTransport {
    pub fn from_socket(socket: WebSocket) -> Transport {
        let (sink, stream) = socket.split();
        Transport::new(AxumSource { stream }, AxumSink { sink })
    }
}

struct AxumSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for AxumSource {
    async fn next_message(&mut self) -> Option<Result<WireMessage>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(WireMessage::Text(text))),
                Ok(Message::Binary(data)) => return Some(Ok(WireMessage::Binary(Bytes::from(data)))),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Axum automatically responds to pings
                    continue;
                }
                Ok(Message::Close(frame)) => {
                    debug!("Telephony WebSocket closed: {:?}", frame);
                    return None;
                }
                Err(e) => return Some(Err(BridgeError::Transport(e.to_string()))),
            }
        }
    }
}

struct AxumSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for AxumSink {
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
