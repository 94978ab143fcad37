//! Call session bounded context

pub mod entity;
pub mod state;

pub use entity::{CallSession, PendingInvocation};
pub use state::{CloseReason, SessionState};
