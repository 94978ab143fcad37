//! Duplex relay
//!
//! One relay runs per session. It owns two pumps:
//!
//! - telephony → agent: caller audio is transcoded and forwarded, the stop
//!   event ends the call
//! - agent → telephony: agent audio and speech events are forwarded,
//!   function-call requests are intercepted and handed to the dispatch engine
//!
//! Every transport sink is driven by its own writer task fed through a
//! bounded channel. A pump that cannot hand a unit to its writer suspends,
//! so a slow peer throttles the reader instead of growing a buffer.
//! Dispatches run concurrently with both pumps; their responses are written
//! to the agent through the same channel as outbound audio.

use super::dispatch::DispatchEngine;
use crate::domain::event::{ControlEvent, FunctionCallRequest, FunctionCallResponse, RelayUnit};
use crate::domain::session::{CallSession, CloseReason};
use crate::domain::shared::{CallId, Source};
use crate::infrastructure::media::AudioCodecAdapter;
use crate::infrastructure::metrics;
use crate::infrastructure::protocols::{
    AgentDecoder, AgentEncoder, InboundDecoder, OutboundEncoder, TelephonyDecoder,
    TelephonyEncoder,
};
use crate::infrastructure::transport::{FrameSink, FrameSource, Transport, WireMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn, Instrument};

/// Per-session relay settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Close the session after this long without traffic on either side
    pub idle_timeout: Duration,
    /// Units queued per direction before the reading pump suspends
    pub outbound_buffer: usize,
    /// How long writers may take to flush and close after teardown
    pub drain_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            outbound_buffer: 64,
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub call_id: CallId,
    pub reason: CloseReason,
    /// Invocations still in flight at teardown, resolved as cancelled
    pub cancelled: Vec<FunctionCallResponse>,
}

pub struct DuplexRelay {
    session: Arc<CallSession>,
    engine: Arc<DispatchEngine>,
    adapter: AudioCodecAdapter,
    config: RelayConfig,
}

impl DuplexRelay {
    pub fn new(
        session: Arc<CallSession>,
        engine: Arc<DispatchEngine>,
        adapter: AudioCodecAdapter,
        config: RelayConfig,
    ) -> Self {
        Self {
            session,
            engine,
            adapter,
            config,
        }
    }

    /// Relay until either side ends, the session idles out or `shutdown`
    /// is raised; then tear everything down.
    ///
    /// `telephony_decoder` is the decoder that consumed the handshake, so
    /// caller sequence numbers continue from there.
    pub async fn run(
        self,
        telephony: Transport,
        telephony_decoder: TelephonyDecoder,
        agent: Transport,
        mut shutdown: watch::Receiver<bool>,
    ) -> SessionOutcome {
        let session = self.session;
        let call_id = session.call_id().clone();

        debug_assert!(session.is_active(), "relay started on an inactive session");
        info!("Relay started for call {}", call_id);

        let buffer = self.config.outbound_buffer.max(1);
        let (telephony_source, telephony_sink) = telephony.into_parts();
        let (agent_source, agent_sink) = agent.into_parts();
        let (to_telephony, telephony_rx) = mpsc::channel(buffer);
        let (to_agent, agent_rx) = mpsc::channel(buffer);

        let mut telephony_writer = spawn_writer(telephony_sink, telephony_rx, Source::Telephony);
        let mut agent_writer = spawn_writer(agent_sink, agent_rx, Source::Agent);

        let mut inbound = tokio::spawn(
            TelephonyPump {
                source: telephony_source,
                decoder: telephony_decoder,
                encoder: AgentEncoder::new(),
                adapter: self.adapter,
                to_agent: to_agent.clone(),
                session: session.clone(),
            }
            .run()
            .in_current_span(),
        );
        let mut outbound = tokio::spawn(
            AgentPump {
                source: agent_source,
                decoder: AgentDecoder::new(call_id.clone(), self.adapter.agent_encoding()),
                telephony_encoder: TelephonyEncoder::new(session.stream_sid()),
                agent_encoder: AgentEncoder::new(),
                adapter: self.adapter,
                to_telephony,
                to_agent: to_agent.clone(),
                session: session.clone(),
                engine: self.engine,
            }
            .run()
            .in_current_span(),
        );

        let idle_timeout = self.config.idle_timeout;
        let mut idle_check = tokio::time::interval(
            (idle_timeout / 4).clamp(Duration::from_millis(10), Duration::from_secs(1)),
        );
        let mut shutdown_open = true;
        let mut inbound_done = false;
        let mut outbound_done = false;

        let reason = if *shutdown.borrow_and_update() {
            CloseReason::Terminated
        } else {
            loop {
                tokio::select! {
                    result = &mut inbound => {
                        inbound_done = true;
                        break pump_reason(result, Source::Telephony);
                    }
                    result = &mut outbound => {
                        outbound_done = true;
                        break pump_reason(result, Source::Agent);
                    }
                    _ = idle_check.tick() => {
                        if session.idle_for() >= idle_timeout {
                            info!("Call {} idle for {:?}, closing", call_id, idle_timeout);
                            break CloseReason::IdleTimeout;
                        }
                    }
                    changed = shutdown.changed(), if shutdown_open => {
                        match changed {
                            Ok(()) if *shutdown.borrow_and_update() => break CloseReason::Terminated,
                            Ok(()) => {}
                            Err(_) => shutdown_open = false,
                        }
                    }
                }
            }
        };

        session.begin_closing();
        if !inbound_done {
            inbound.abort();
            let _ = inbound.await;
        }
        if !outbound_done {
            outbound.abort();
            let _ = outbound.await;
        }

        let cancelled = session.cancel_pending();
        for response in &cancelled {
            warn!(
                "Cancelled pending invocation {} ({})",
                response.invocation_id, response.function_name
            );
            let unit = RelayUnit::Control(ControlEvent::FunctionCallResponse(response.clone()));
            if let Some(message) = AgentEncoder::new().encode(&unit) {
                if to_agent.try_send(message).is_err() {
                    debug!("Agent side gone, cancellation of {} not delivered", response.invocation_id);
                }
            }
        }
        drop(to_agent);

        let drain = self.config.drain_timeout;
        if tokio::time::timeout(drain, &mut telephony_writer).await.is_err() {
            warn!("Telephony writer did not drain within {:?}", drain);
            telephony_writer.abort();
        }
        if tokio::time::timeout(drain, &mut agent_writer).await.is_err() {
            warn!("Agent writer did not drain within {:?}", drain);
            agent_writer.abort();
        }

        session.mark_closed();
        if reason.is_failure() {
            metrics::record_session_failure(reason.as_str());
        }
        info!("Relay finished for call {}: {:?}", call_id, reason);

        SessionOutcome {
            call_id,
            reason,
            cancelled,
        }
    }
}

fn pump_reason(result: Result<CloseReason, tokio::task::JoinError>, side: Source) -> CloseReason {
    result.unwrap_or_else(|e| CloseReason::TransportError {
        side: side.as_str().to_string(),
        message: format!("relay task failed: {}", e),
    })
}

fn closed(side: Source) -> CloseReason {
    CloseReason::TransportClosed {
        side: side.as_str().to_string(),
    }
}

fn failed(side: Source, message: impl Into<String>) -> CloseReason {
    CloseReason::TransportError {
        side: side.as_str().to_string(),
        message: message.into(),
    }
}

/// Drain `rx` into `sink`, then close the sink once every sender is gone
fn spawn_writer(
    mut sink: Box<dyn FrameSink>,
    mut rx: mpsc::Receiver<WireMessage>,
    side: Source,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = sink.send_message(message).await {
                    warn!("Write to {} failed: {}", side.as_str(), e);
                    return;
                }
            }
            if let Err(e) = sink.close().await {
                debug!("Closing {} transport: {}", side.as_str(), e);
            }
        }
        .in_current_span(),
    )
}

struct TelephonyPump {
    source: Box<dyn FrameSource>,
    decoder: TelephonyDecoder,
    encoder: AgentEncoder,
    adapter: AudioCodecAdapter,
    to_agent: mpsc::Sender<WireMessage>,
    session: Arc<CallSession>,
}

impl TelephonyPump {
    async fn run(mut self) -> CloseReason {
        loop {
            let message = match self.source.next_message().await {
                None => return closed(Source::Telephony),
                Some(Err(e)) => return failed(Source::Telephony, e.to_string()),
                Some(Ok(message)) => message,
            };
            self.session.touch();

            let unit = match self.decoder.decode(message) {
                Ok(Some(unit)) => unit,
                Ok(None) => continue,
                Err(e) => return failed(Source::Telephony, e.to_string()),
            };

            let unit = match unit {
                RelayUnit::Audio(frame) => {
                    metrics::record_audio_frame(Source::Telephony.as_str());
                    RelayUnit::Audio(self.adapter.to_agent(frame))
                }
                RelayUnit::Control(ControlEvent::CallStopped) => {
                    info!("Caller hung up");
                    return CloseReason::CallEnded;
                }
                RelayUnit::Control(ControlEvent::CallStarted(start)) => {
                    warn!("Ignoring repeated start for stream {}", start.stream_sid);
                    continue;
                }
                other => other,
            };

            if let Some(message) = self.encoder.encode(&unit) {
                if self.to_agent.send(message).await.is_err() {
                    return failed(Source::Agent, "agent writer stopped");
                }
            }
        }
    }
}

struct AgentPump {
    source: Box<dyn FrameSource>,
    decoder: AgentDecoder,
    telephony_encoder: TelephonyEncoder,
    agent_encoder: AgentEncoder,
    adapter: AudioCodecAdapter,
    to_telephony: mpsc::Sender<WireMessage>,
    to_agent: mpsc::Sender<WireMessage>,
    session: Arc<CallSession>,
    engine: Arc<DispatchEngine>,
}

impl AgentPump {
    async fn run(mut self) -> CloseReason {
        // Dropping the set on abort cancels in-flight dispatches
        let mut dispatches = JoinSet::new();

        loop {
            let next = tokio::select! {
                Some(joined) = dispatches.join_next(), if !dispatches.is_empty() => {
                    match joined {
                        Ok(response) => {
                            if !self.deliver(response).await {
                                return failed(Source::Agent, "agent writer stopped");
                            }
                        }
                        Err(e) => warn!("Dispatch task failed: {}", e),
                    }
                    continue;
                }
                next = self.source.next_message() => next,
            };

            let message = match next {
                None => return closed(Source::Agent),
                Some(Err(e)) => return failed(Source::Agent, e.to_string()),
                Some(Ok(message)) => message,
            };
            self.session.touch();

            let unit = match self.decoder.decode(message) {
                Ok(Some(unit)) => unit,
                Ok(None) => continue,
                Err(e) => return failed(Source::Agent, e.to_string()),
            };

            let unit = match unit {
                RelayUnit::Audio(frame) => {
                    metrics::record_audio_frame(Source::Agent.as_str());
                    RelayUnit::Audio(self.adapter.to_telephony(frame))
                }
                RelayUnit::Control(ControlEvent::FunctionCallRequest(request)) => {
                    if let Some(rejection) = self.intercept(request, &mut dispatches) {
                        if self.to_agent.send(rejection).await.is_err() {
                            return failed(Source::Agent, "agent writer stopped");
                        }
                    }
                    continue;
                }
                other => other,
            };

            if let Some(message) = self.telephony_encoder.encode(&unit) {
                if self.to_telephony.send(message).await.is_err() {
                    return failed(Source::Telephony, "telephony writer stopped");
                }
            }
        }
    }

    /// Register the invocation and hand it to the dispatch engine.
    ///
    /// Returns the encoded failure response when the invocation cannot be
    /// registered.
    fn intercept(
        &self,
        request: FunctionCallRequest,
        dispatches: &mut JoinSet<FunctionCallResponse>,
    ) -> Option<WireMessage> {
        if let Err(e) = self.session.register_invocation(&request) {
            warn!("Rejecting function call {}: {}", request.invocation_id, e);
            let response = FunctionCallResponse::failure(
                request.invocation_id,
                request.function_name,
                e,
            );
            return self
                .agent_encoder
                .encode(&RelayUnit::Control(ControlEvent::FunctionCallResponse(response)));
        }

        let engine = self.engine.clone();
        dispatches.spawn(async move { engine.dispatch(request).await }.in_current_span());
        None
    }

    /// Forward a handler result while its invocation is still pending.
    ///
    /// The entry is resolved only after the send completes, with no await in
    /// between, so a teardown that aborts this pump mid-send leaves it for
    /// `cancel_pending` to report. Returns false when the agent writer is gone.
    async fn deliver(&mut self, response: FunctionCallResponse) -> bool {
        let id = response.invocation_id.clone();
        if !self.session.awaits_result(&id) {
            debug!("Discarding result of {}, session no longer active", id);
            return true;
        }
        let unit = RelayUnit::Control(ControlEvent::FunctionCallResponse(response));
        if let Some(message) = self.agent_encoder.encode(&unit) {
            if self.to_agent.send(message).await.is_err() {
                return false;
            }
        }
        self.session.resolve_invocation(&id);
        true
    }
}
