//! Session manager
//!
//! Owns the process-wide call id → session mapping. Every insert, removal and
//! lookup goes through the manager; the lock is never held across an await.

use super::dispatch::DispatchEngine;
use super::relay::{DuplexRelay, RelayConfig, SessionOutcome};
use crate::domain::event::{AudioEncoding, CallStart, ControlEvent, RelayUnit};
use crate::domain::session::{CallSession, CloseReason, SessionState};
use crate::domain::shared::{BridgeError, CallId, Result};
use crate::infrastructure::media::AudioCodecAdapter;
use crate::infrastructure::metrics;
use crate::infrastructure::protocols::telephony::MULAW_FORMAT;
use crate::infrastructure::protocols::{
    AgentSettings, InboundDecoder, OutboundEncoder, TelephonyDecoder, TelephonyEncoder,
};
use crate::infrastructure::transport::{AgentConnector, FrameSink, FrameSource, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{error, info, info_span, warn, Instrument};

/// Telephony audio sample rate the bridge accepts
const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Session creation settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum wait for the telephony start event
    pub handshake_timeout: Duration,
    /// Encoding the voice agent sends and expects
    pub agent_encoding: AudioEncoding,
    pub relay: RelayConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            agent_encoding: AudioEncoding::Mulaw,
            relay: RelayConfig::default(),
        }
    }
}

/// Caller-side view of a running session
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<CallSession>,
    shutdown: Arc<watch::Sender<bool>>,
    outcome: watch::Receiver<Option<SessionOutcome>>,
    task: Arc<OnceLock<AbortHandle>>,
}

impl SessionHandle {
    pub fn call_id(&self) -> &CallId {
        self.session.call_id()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Arc<CallSession> {
        &self.session
    }

    /// Ask the relay to tear the session down
    pub fn terminate(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for the session to end
    pub async fn wait(&self) -> SessionOutcome {
        let mut outcome = self.outcome.clone();
        let finished = outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| value.clone());

        finished.unwrap_or_else(|| SessionOutcome {
            call_id: self.call_id().clone(),
            reason: CloseReason::Terminated,
            cancelled: Vec::new(),
        })
    }

    fn abort(&self) {
        if let Some(task) = self.task.get() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("call_id", self.call_id())
            .field("state", &self.state())
            .finish()
    }
}

pub struct SessionManager {
    sessions: Mutex<HashMap<CallId, SessionHandle>>,
    /// Cleared by `shutdown` while holding the sessions lock
    accepting: AtomicBool,
    connector: Arc<dyn AgentConnector>,
    engine: Arc<DispatchEngine>,
    settings: AgentSettings,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn AgentConnector>,
        engine: Arc<DispatchEngine>,
        settings: AgentSettings,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            connector,
            engine,
            settings,
            config,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<CallId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bridge a freshly upgraded telephony connection.
    ///
    /// Reads up to the start event, opens the agent connection, sends the
    /// agent settings and starts the relay. On any failure the inbound
    /// transport is closed, with an error event when the stream is known.
    pub async fn on_inbound_connection(self: &Arc<Self>, telephony: Transport) -> Result<SessionHandle> {
        let (mut source, mut sink) = telephony.into_parts();
        if !self.is_accepting() {
            return Err(reject(sink.as_mut(), None, BridgeError::ShuttingDown).await);
        }
        let mut decoder = TelephonyDecoder::new();

        let start = match timeout(
            self.config.handshake_timeout,
            read_start(source.as_mut(), &mut decoder),
        )
        .await
        {
            Ok(Ok(start)) => start,
            Ok(Err(e)) => return Err(reject(sink.as_mut(), None, e).await),
            Err(_) => {
                let e = BridgeError::Handshake(format!(
                    "no start event within {:?}",
                    self.config.handshake_timeout
                ));
                return Err(reject(sink.as_mut(), None, e).await);
            }
        };

        let format = &start.media_format;
        if format.encoding != MULAW_FORMAT || format.sample_rate != TELEPHONY_SAMPLE_RATE {
            let e = BridgeError::UnsupportedAudioFormat(format!(
                "{} at {} Hz",
                format.encoding, format.sample_rate
            ));
            return Err(reject(sink.as_mut(), Some(start.stream_sid.as_str()), e).await);
        }

        let call_id = start.call_id.clone();
        let session = Arc::new(CallSession::new(
            call_id.clone(),
            start.stream_sid.clone(),
            start.media_format.clone(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let handle = SessionHandle {
            session: session.clone(),
            shutdown: Arc::new(shutdown_tx),
            outcome: outcome_rx,
            task: Arc::new(OnceLock::new()),
        };

        if let Err(e) = self.reserve(handle.clone()) {
            return Err(reject(sink.as_mut(), Some(start.stream_sid.as_str()), e).await);
        }

        let mut agent = match self.open_agent(&call_id).await {
            Ok(agent) => agent,
            Err(e) => {
                self.on_session_terminated(&call_id);
                session.begin_closing();
                session.mark_closed();
                return Err(reject(sink.as_mut(), Some(start.stream_sid.as_str()), e).await);
            }
        };

        // Both transports are up; the handle is Active before it is returned
        if let Err(e) = session.activate() {
            self.on_session_terminated(&call_id);
            if let Err(close_err) = agent.sink.close().await {
                warn!("Could not close agent connection: {}", close_err);
            }
            session.begin_closing();
            session.mark_closed();
            return Err(reject(sink.as_mut(), Some(start.stream_sid.as_str()), e).await);
        }

        metrics::record_session_started();
        info!(
            "Session {} started (stream {}, {} sessions active)",
            call_id,
            start.stream_sid,
            self.active_count()
        );

        let relay = DuplexRelay::new(
            session,
            self.engine.clone(),
            AudioCodecAdapter::new(self.config.agent_encoding),
            self.config.relay.clone(),
        );
        let manager = Arc::clone(self);
        let span = info_span!("session", call_id = %call_id);
        let task = tokio::spawn(
            async move {
                let outcome = relay
                    .run(Transport { source, sink }, decoder, agent, shutdown_rx)
                    .await;
                manager.on_session_terminated(&outcome.call_id);
                outcome_tx.send_replace(Some(outcome));
            }
            .instrument(span),
        );
        let _ = handle.task.set(task.abort_handle());

        Ok(handle)
    }

    /// Remove a finished session from the mapping
    pub fn on_session_terminated(&self, call_id: &CallId) -> Option<SessionHandle> {
        let (removed, remaining) = {
            let mut sessions = self.sessions();
            let removed = sessions.remove(call_id);
            (removed, sessions.len())
        };
        if removed.is_some() {
            metrics::update_active_sessions(remaining);
            info!("Session {} removed ({} active)", call_id, remaining);
        }
        removed
    }

    pub fn lookup(&self, call_id: &CallId) -> Option<SessionHandle> {
        self.sessions().get(call_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.sessions().len()
    }

    pub fn active_call_ids(&self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self.sessions().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// False once `shutdown` has begun
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting calls, then close every session, waiting up to
    /// `grace` for them to drain.
    ///
    /// Returns the number of sessions that had to be aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let handles: Vec<SessionHandle> = {
            let sessions = self.sessions();
            self.accepting.store(false, Ordering::SeqCst);
            sessions.values().cloned().collect()
        };
        if handles.is_empty() {
            return 0;
        }
        info!("Shutting down {} active sessions", handles.len());

        for handle in &handles {
            handle.terminate();
        }
        let drained = timeout(
            grace,
            futures::future::join_all(handles.iter().map(|h| h.wait())),
        )
        .await
        .is_ok();
        if drained {
            return 0;
        }

        let mut forced = 0;
        for handle in &handles {
            if handle.state() != SessionState::Closed {
                warn!("Forcing session {} closed", handle.call_id());
                handle.abort();
                handle.session().begin_closing();
                handle.session().mark_closed();
                self.on_session_terminated(handle.call_id());
                forced += 1;
            }
        }
        forced
    }

    fn reserve(&self, handle: SessionHandle) -> Result<()> {
        let count = {
            let mut sessions = self.sessions();
            if !self.is_accepting() {
                return Err(BridgeError::ShuttingDown);
            }
            if sessions.contains_key(handle.call_id()) {
                return Err(BridgeError::DuplicateCallId(handle.call_id().clone()));
            }
            sessions.insert(handle.call_id().clone(), handle);
            sessions.len()
        };
        metrics::update_active_sessions(count);
        Ok(())
    }

    async fn open_agent(&self, call_id: &CallId) -> Result<Transport> {
        let mut agent = self.connector.connect(call_id).await?;
        if let Err(e) = agent.sink.send_message(self.settings.to_message()).await {
            let _ = agent.sink.close().await;
            return Err(BridgeError::AgentConnect(format!(
                "settings not delivered: {}",
                e
            )));
        }
        Ok(agent)
    }
}

/// Read the telephony stream up to its start event
async fn read_start(
    source: &mut dyn FrameSource,
    decoder: &mut TelephonyDecoder,
) -> Result<CallStart> {
    loop {
        let message = match source.next_message().await {
            None => {
                return Err(BridgeError::Handshake(
                    "stream closed before start event".to_string(),
                ))
            }
            Some(Err(e)) => return Err(e),
            Some(Ok(message)) => message,
        };

        match decoder.decode(message)? {
            None => continue,
            Some(RelayUnit::Control(ControlEvent::CallStarted(start))) => return Ok(start),
            Some(RelayUnit::Audio(_)) => {
                return Err(BridgeError::Handshake("audio before start event".to_string()))
            }
            Some(RelayUnit::Control(event)) => {
                return Err(BridgeError::Handshake(format!(
                    "{} before start event",
                    event.tag()
                )))
            }
        }
    }
}

/// Report `error` on the telephony side and close it
async fn reject(sink: &mut dyn FrameSink, stream_sid: Option<&str>, error: BridgeError) -> BridgeError {
    error!("Rejecting media stream: {}", error);
    metrics::record_session_failure(error.kind());

    if let Some(stream_sid) = stream_sid {
        let event = RelayUnit::Control(ControlEvent::Error {
            message: error.to_string(),
        });
        if let Some(message) = TelephonyEncoder::new(stream_sid).encode(&event) {
            if let Err(e) = sink.send_message(message).await {
                warn!("Could not deliver error event: {}", e);
            }
        }
    }
    if let Err(e) = sink.close().await {
        warn!("Could not close media stream: {}", e);
    }
    error
}
