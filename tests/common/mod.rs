//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use voicebridge::application::{DispatchEngine, RelayConfig, SessionConfig, SessionManager};
use voicebridge::domain::event::AudioEncoding;
use voicebridge::domain::handler::{Arguments, HandlerFailure, HandlerRegistry, InputSchema, RegistryBuilder};
use voicebridge::domain::handler::{FieldKind, FieldSpec, HandlerResult};
use voicebridge::domain::shared::{BridgeError, CallId, Result};
use voicebridge::infrastructure::protocols::AgentSettings;
use voicebridge::infrastructure::transport::memory::{self, MemoryPeer};
use voicebridge::infrastructure::transport::{AgentConnector, Transport, WireMessage};

pub const WAIT: Duration = Duration::from_secs(2);

/// Connector handing every agent-side peer to the test
pub struct TestConnector {
    capacity: usize,
    peers: mpsc::UnboundedSender<(CallId, MemoryPeer)>,
    refuse: bool,
}

#[async_trait]
impl AgentConnector for TestConnector {
    async fn connect(&self, call_id: &CallId) -> Result<Transport> {
        if self.refuse {
            return Err(BridgeError::AgentConnect("connection refused".to_string()));
        }
        let (transport, peer) = memory::pair(self.capacity);
        self.peers
            .send((call_id.clone(), peer))
            .map_err(|_| BridgeError::AgentConnect("test harness gone".to_string()))?;
        Ok(transport)
    }
}

/// Receives agent-side peers as sessions connect
pub struct AgentPeers {
    rx: Mutex<mpsc::UnboundedReceiver<(CallId, MemoryPeer)>>,
}

impl AgentPeers {
    /// Next agent connection, with the settings message already consumed
    pub async fn next(&self) -> (CallId, MemoryPeer, Value) {
        let (call_id, mut peer) = tokio::time::timeout(WAIT, self.rx.lock().await.recv())
            .await
            .expect("agent connection")
            .expect("connector alive");
        let settings = parse(peer.recv_timeout(WAIT).await.expect("settings message"));
        (call_id, peer, settings)
    }
}

pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub agents: AgentPeers,
}

pub struct HarnessBuilder {
    registry: RegistryBuilder,
    handler_timeout: Duration,
    max_retries: u32,
    config: SessionConfig,
    capacity: usize,
    refuse: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::builder(),
            handler_timeout: Duration::from_millis(500),
            max_retries: 0,
            config: SessionConfig {
                handshake_timeout: Duration::from_millis(500),
                agent_encoding: AudioEncoding::Mulaw,
                relay: RelayConfig {
                    idle_timeout: Duration::from_secs(10),
                    outbound_buffer: 16,
                    drain_timeout: Duration::from_millis(500),
                },
            },
            capacity: 64,
            refuse: false,
        }
    }

    pub fn registry(mut self, f: impl FnOnce(&mut RegistryBuilder)) -> Self {
        f(&mut self.registry);
        self
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.relay.idle_timeout = timeout;
        self
    }

    pub fn outbound_buffer(mut self, buffer: usize) -> Self {
        self.config.relay.outbound_buffer = buffer;
        self
    }

    pub fn agent_encoding(mut self, encoding: AudioEncoding) -> Self {
        self.config.agent_encoding = encoding;
        self
    }

    pub fn transport_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn refuse_agent(mut self) -> Self {
        self.refuse = true;
        self
    }

    pub fn build(self) -> Harness {
        let registry = Arc::new(self.registry.build());
        let settings = AgentSettings::from_value(
            json!({"agent": {"think": {"prompt": "You are a helpful visa assistant."}}}),
            &registry,
            self.config.agent_encoding,
        )
        .unwrap();
        let engine = Arc::new(
            DispatchEngine::new(registry, self.handler_timeout).with_max_retries(self.max_retries),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(TestConnector {
            capacity: self.capacity,
            peers: tx,
            refuse: self.refuse,
        });

        Harness {
            manager: Arc::new(SessionManager::new(connector, engine, settings, self.config)),
            agents: AgentPeers { rx: Mutex::new(rx) },
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler that sleeps for `delay_ms` and echoes `tag`
pub fn register_sleeper(builder: &mut RegistryBuilder) {
    builder
        .register(
            "sleep_echo",
            "Sleep, then echo the tag",
            InputSchema::new()
                .field(FieldSpec::required("tag", FieldKind::String))
                .field(FieldSpec::required("delay_ms", FieldKind::Integer)),
            |args: &Arguments| -> HandlerResult {
                let delay = args.i64("delay_ms").unwrap_or(0).max(0) as u64;
                std::thread::sleep(Duration::from_millis(delay));
                let tag = args.require_str("tag")?;
                if tag == "fail" {
                    return Err(HandlerFailure::new("refused", "Tag refused"));
                }
                let mut payload = Map::new();
                payload.insert("tag".to_string(), json!(tag));
                Ok(payload)
            },
        )
        .unwrap();
}

pub fn start_event(call_sid: &str) -> String {
    json!({
        "event": "start",
        "sequenceNumber": "1",
        "streamSid": stream_sid(call_sid),
        "start": {
            "streamSid": stream_sid(call_sid),
            "callSid": call_sid,
            "tracks": ["inbound"],
            "mediaFormat": { "encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1 }
        }
    })
    .to_string()
}

pub fn stream_sid(call_sid: &str) -> String {
    format!("MZ{}", call_sid)
}

pub fn media_event(call_sid: &str, payload: &[u8]) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid(call_sid),
        "media": { "track": "inbound", "payload": STANDARD.encode(payload) }
    })
    .to_string()
}

pub fn stop_event(call_sid: &str) -> String {
    json!({ "event": "stop", "streamSid": stream_sid(call_sid) }).to_string()
}

pub fn function_call(id: &str, name: &str, input: Value) -> String {
    json!({
        "type": "FunctionCallRequest",
        "function_call_id": id,
        "function_name": name,
        "input": input,
    })
    .to_string()
}

pub fn parse(message: WireMessage) -> Value {
    let text = message.as_text().expect("text message");
    serde_json::from_str(text).expect("valid JSON")
}

/// Decoded `output` of a FunctionCallResponse envelope
pub fn response_output(envelope: &Value) -> Value {
    assert_eq!(envelope["type"], "FunctionCallResponse");
    serde_json::from_str(envelope["output"].as_str().expect("output string")).expect("output JSON")
}

/// Media payload bytes of a telephony media envelope
pub fn media_payload(envelope: &Value) -> Vec<u8> {
    assert_eq!(envelope["event"], "media");
    STANDARD
        .decode(envelope["media"]["payload"].as_str().expect("payload"))
        .expect("base64")
}

/// Open a call: the caller sends `start` and the session is created
pub async fn open_call(harness: &Harness, call_sid: &str) -> (voicebridge::application::SessionHandle, MemoryPeer, MemoryPeer) {
    let (transport, caller) = memory::pair(64);
    caller.send_text(start_event(call_sid)).await.unwrap();
    let handle = harness
        .manager
        .on_inbound_connection(transport)
        .await
        .expect("session starts");
    let (_, agent, _) = harness.agents.next().await;
    (handle, caller, agent)
}
