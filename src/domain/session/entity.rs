//! Call session entity

use super::state::SessionState;
use crate::domain::event::{FunctionCallRequest, FunctionCallResponse, MediaFormat};
use crate::domain::shared::{BridgeError, CallId, DispatchError, InvocationId, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Metadata kept for a function call awaiting its response
#[derive(Debug, Clone)]
pub struct PendingInvocation {
    pub invocation_id: InvocationId,
    pub function_name: String,
    pub started_at: Instant,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    pending: HashMap<InvocationId, PendingInvocation>,
    last_activity: Instant,
    last_activity_at: DateTime<Utc>,
}

/// One bridged phone call.
///
/// Shared between the relay pumps and the dispatch tasks of a single call.
/// The inner lock is only ever held for short, non-suspending sections.
#[derive(Debug)]
pub struct CallSession {
    call_id: CallId,
    stream_sid: String,
    media_format: MediaFormat,
    created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

impl CallSession {
    pub fn new(call_id: CallId, stream_sid: impl Into<String>, media_format: MediaFormat) -> Self {
        let now = Utc::now();
        Self {
            call_id,
            stream_sid: stream_sid.into(),
            media_format,
            created_at: now,
            inner: Mutex::new(SessionInner {
                state: SessionState::Connecting,
                pending: HashMap::new(),
                last_activity: Instant::now(),
                last_activity_at: now,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    pub fn media_format(&self) -> &MediaFormat {
        &self.media_format
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Move to `next`, rejecting transitions the state machine forbids
    pub fn transition(&self, next: SessionState) -> Result<()> {
        let mut inner = self.lock();
        if !inner.state.can_transition_to(next) {
            return Err(BridgeError::InvalidStateTransition(format!(
                "{} -> {} for call {}",
                inner.state, next, self.call_id
            )));
        }
        inner.state = next;
        Ok(())
    }

    pub fn activate(&self) -> Result<()> {
        self.transition(SessionState::Active)
    }

    /// Enter CLOSING. Returns false if the session was already closing or closed.
    pub fn begin_closing(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = SessionState::Closing;
        true
    }

    pub fn mark_closed(&self) {
        let mut inner = self.lock();
        inner.state = SessionState::Closed;
    }

    /// Record traffic on either transport
    pub fn touch(&self) {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        inner.last_activity_at = Utc::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.lock().last_activity_at
    }

    /// Track a new invocation. Only an ACTIVE session accepts invocations.
    pub fn register_invocation(
        &self,
        request: &FunctionCallRequest,
    ) -> std::result::Result<(), DispatchError> {
        let mut inner = self.lock();
        if inner.state != SessionState::Active {
            return Err(DispatchError::Cancelled);
        }
        if inner.pending.contains_key(&request.invocation_id) {
            return Err(DispatchError::DuplicateInvocation(
                request.invocation_id.to_string(),
            ));
        }
        inner.pending.insert(
            request.invocation_id.clone(),
            PendingInvocation {
                invocation_id: request.invocation_id.clone(),
                function_name: request.function_name.clone(),
                started_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Claim the pending entry for an invocation whose response was written.
    ///
    /// Returns `None` when the invocation was already resolved, including by
    /// cancellation.
    pub fn resolve_invocation(&self, invocation_id: &InvocationId) -> Option<PendingInvocation> {
        self.lock().pending.remove(invocation_id)
    }

    /// Resolve every pending invocation as cancelled
    pub fn cancel_pending(&self) -> Vec<FunctionCallResponse> {
        let mut inner = self.lock();
        inner
            .pending
            .drain()
            .map(|(id, pending)| {
                FunctionCallResponse::failure(id, pending.function_name, DispatchError::Cancelled)
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether a result for `invocation_id` may still be sent to the agent
    pub fn awaits_result(&self, invocation_id: &InvocationId) -> bool {
        let inner = self.lock();
        inner.state == SessionState::Active && inner.pending.contains_key(invocation_id)
    }
}
