//! In-process transport backed by bounded channels
//!
//! [`pair`] returns the bridge-facing [`Transport`] and the [`MemoryPeer`]
//! that plays the remote end. Both directions are bounded, so a peer that
//! stops reading exerts backpressure exactly like a slow socket.

use super::{FrameSink, FrameSource, Transport, WireMessage};
use crate::domain::shared::{BridgeError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn pair(capacity: usize) -> (Transport, MemoryPeer) {
    let capacity = capacity.max(1);
    let (to_bridge, incoming) = mpsc::channel(capacity);
    let (outgoing, from_bridge) = mpsc::channel(capacity);

    let transport = Transport::new(
        MemorySource { incoming },
        MemorySink {
            outgoing: Some(outgoing),
        },
    );
    let peer = MemoryPeer {
        to_bridge: Some(to_bridge),
        from_bridge,
    };
    (transport, peer)
}

struct MemorySource {
    incoming: mpsc::Receiver<Result<WireMessage>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_message(&mut self) -> Option<Result<WireMessage>> {
        self.incoming.recv().await
    }
}

struct MemorySink {
    outgoing: Option<mpsc::Sender<WireMessage>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_message(&mut self, message: WireMessage) -> Result<()> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or_else(|| BridgeError::Transport("sink closed".to_string()))?;
        outgoing
            .send(message)
            .await
            .map_err(|_| BridgeError::Transport("peer disconnected".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.outgoing = None;
        Ok(())
    }
}

/// Remote end of an in-process transport
pub struct MemoryPeer {
    to_bridge: Option<mpsc::Sender<Result<WireMessage>>>,
    from_bridge: mpsc::Receiver<WireMessage>,
}

impl MemoryPeer {
    /// Deliver a message to the bridge, waiting for buffer space
    pub async fn send(&self, message: WireMessage) -> Result<()> {
        let tx = self
            .to_bridge
            .as_ref()
            .ok_or_else(|| BridgeError::Transport("peer hung up".to_string()))?;
        tx.send(Ok(message))
            .await
            .map_err(|_| BridgeError::Transport("bridge stopped reading".to_string()))
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(WireMessage::Text(text.into())).await
    }

    /// Deliver a transport failure to the bridge
    pub async fn fail(&self, message: impl Into<String>) -> Result<()> {
        let tx = self
            .to_bridge
            .as_ref()
            .ok_or_else(|| BridgeError::Transport("peer hung up".to_string()))?;
        tx.send(Err(BridgeError::Transport(message.into())))
            .await
            .map_err(|_| BridgeError::Transport("bridge stopped reading".to_string()))
    }

    /// Next message written by the bridge; `None` once the bridge closed its side
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.from_bridge.recv().await
    }

    /// Like [`recv`](Self::recv), giving up after `wait`
    pub async fn recv_timeout(&mut self, wait: Duration) -> Option<WireMessage> {
        tokio::time::timeout(wait, self.from_bridge.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait until the bridge closes its sending side, discarding anything sent
    pub async fn closed_within(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, async {
            while self.from_bridge.recv().await.is_some() {}
        })
        .await
        .is_ok()
    }

    /// Close the peer's sending side; the bridge sees an orderly close
    pub fn hang_up(&mut self) {
        self.to_bridge = None;
    }
}
