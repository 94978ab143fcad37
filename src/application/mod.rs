//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases:
//! - Session lifecycle (creation, registration, teardown)
//! - Relaying audio and control events between the two transports
//! - Dispatching agent function calls to domain handlers

pub mod dispatch;
pub mod relay;
pub mod session_manager;

pub use dispatch::DispatchEngine;
pub use relay::{DuplexRelay, RelayConfig, SessionOutcome};
pub use session_manager::{SessionConfig, SessionHandle, SessionManager};
