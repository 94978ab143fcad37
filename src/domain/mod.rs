//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - The call session entity and its state machine
//! - The internal event model (audio frames, control events, function calls)
//! - The handler registry and argument schemas
//! - The consultancy and pharmacy functions the voice agent can invoke

pub mod consultancy;
pub mod event;
pub mod handler;
pub mod pharmacy;
pub mod session;
pub mod shared;

// Re-export commonly used types
pub use shared::{BridgeError, DispatchError, Result};
